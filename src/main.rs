use std::{fs::File, io::BufWriter, path::PathBuf};

use clap::Parser;
use dualgrad::{dual, Dual, Node};

#[derive(Parser, Debug)]
#[command(about = "Forward and reverse mode derivatives of small expressions")]
struct Args {
    /// First input of f(x1, x2) = ln(x1) + x1 * x2 - sin(x2)
    #[arg(long, default_value_t = 2.)]
    x1: f64,
    /// Second input of f(x1, x2)
    #[arg(long, default_value_t = 5.)]
    x2: f64,
    /// Write the graph of f in graphviz dot format after backpropagation
    #[arg(long)]
    dot: Option<PathBuf>,
}

/// Formats with 4 significant digits the way C's `%.4g` does: fixed notation for exponents
/// in `-4..4`, scientific otherwise, trailing zeros dropped.
fn sig4(v: f64) -> String {
    if v == 0. || !v.is_finite() {
        return v.to_string();
    }
    fn trim(s: &str) -> &str {
        if s.contains('.') {
            s.trim_end_matches('0').trim_end_matches('.')
        } else {
            s
        }
    }
    // Rounding to 4 digits may carry into the next power of ten, so take the exponent after it.
    let sci = format!("{v:.3e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or_default();
    if (-4..4).contains(&exp) {
        let decimals = (3 - exp) as usize;
        trim(&format!("{v:.decimals$}")).to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim(mantissa), sign, exp.abs())
    }
}

fn dual_demo(x1: f64, x2: f64) {
    println!("Dual numbers:");
    for (name, y) in [
        ("x1 + x2", Dual::variable(x1) + x2),
        ("x1 - x2", Dual::variable(x1) - x2),
        ("x1 * x2", Dual::variable(x1) * x2),
        ("ln(x1)", dual::ln(Dual::variable(x1))),
        ("sin(x1)", dual::sin(Dual::variable(x1))),
    ] {
        println!("y = {name} = {}, dy/dx1 = {}", sig4(y.real), sig4(y.derivative));
    }

    let f = |[x1, x2]: [Dual; 2]| dual::ln(x1) + x1 * x2 - dual::sin(x2);
    let (out, grad) = dual::gradient(f, [x1, x2]);
    println!("out = {}", sig4(out));
    println!("dout/dx1 = {}, dout/dx2 = {}", sig4(grad[0]), sig4(grad[1]));
    println!();
}

fn graph_demo(x1: f64, x2: f64) -> dualgrad::Result<Node> {
    println!("Computational graph:");
    let a = Node::new("x1", x1);
    let b = Node::new("x2", x2);
    let v1 = a.ln();
    let v2 = &a * &b;
    let v3 = b.sin();
    let v4 = &v1 + &v2;
    let v5 = &v4 - &v3;

    let y = v5.try_forward()?;
    println!("y = {}", sig4(y));

    let order = v5.topological_order();
    v5.seed_and_backward(&order, 1.)?;
    println!("dy/dx1 = {}, dy/dx2 = {}", sig4(a.grad()), sig4(b.grad()));
    Ok(v5)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    dual_demo(args.x1, args.x2);
    let root = graph_demo(args.x1, args.x2)?;
    if let Some(path) = args.dot {
        let mut file = BufWriter::new(File::create(&path)?);
        root.dot(&mut file)?;
        println!("graph written to {}", path.display());
    }
    Ok(())
}

#[test]
fn test_sig4() {
    assert_eq!(sig4(11.652071), "11.65");
    assert_eq!(sig4(5.5), "5.5");
    assert_eq!(sig4(1.7163378), "1.716");
    assert_eq!(sig4(6.), "6");
    assert_eq!(sig4(-0.41616), "-0.4162");
    assert_eq!(sig4(0.000123456), "0.0001235");
    assert_eq!(sig4(12345.6), "1.235e+04");
    assert_eq!(sig4(9999.6), "1e+04");
    assert_eq!(sig4(0.0000123456), "1.235e-05");
    assert_eq!(sig4(0.), "0");
}

#[test]
fn test_graph_demo() {
    let root = graph_demo(2., 5.).unwrap();
    assert_eq!(sig4(root.data().unwrap()), "11.65");
    assert!(matches!(graph_demo(-1., 5.), Err(dualgrad::Error::Domain(_))));
}

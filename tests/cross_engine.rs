//! Forward mode on dual numbers and reverse mode on the graph must agree on every expression.

use dualgrad::{dual, Dual, Node};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Expr {
    X1,
    X2,
    Const(f64),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Ln(Box<Expr>),
    Sin(Box<Expr>),
}

fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        Just(Expr::X1),
        Just(Expr::X2),
        (-3.0..3.0f64).prop_map(Expr::Const),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::Add(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::Sub(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::Mul(Box::new(l), Box::new(r))),
            inner.clone().prop_map(|e| Expr::Ln(Box::new(e))),
            inner.prop_map(|e| Expr::Sin(Box::new(e))),
        ]
    })
}

/// Evaluates with dual numbers, tracking the largest magnitude met on the way to bound the
/// rounding error of both engines.
fn eval_dual(e: &Expr, x1: Dual, x2: Dual, scale: &mut f64) -> Dual {
    let res = match e {
        Expr::X1 => x1,
        Expr::X2 => x2,
        Expr::Const(c) => Dual::constant(*c),
        Expr::Add(l, r) => eval_dual(l, x1, x2, scale) + eval_dual(r, x1, x2, scale),
        Expr::Sub(l, r) => eval_dual(l, x1, x2, scale) - eval_dual(r, x1, x2, scale),
        Expr::Mul(l, r) => eval_dual(l, x1, x2, scale) * eval_dual(r, x1, x2, scale),
        Expr::Ln(a) => {
            let a = eval_dual(a, x1, x2, scale);
            *scale = scale.max(a.real.recip().abs());
            dual::ln(a)
        }
        Expr::Sin(a) => dual::sin(eval_dual(a, x1, x2, scale)),
    };
    *scale = scale.max(res.real.abs()).max(res.derivative.abs());
    res
}

fn build(e: &Expr, x1: &Node, x2: &Node) -> Node {
    match e {
        Expr::X1 => x1.clone(),
        Expr::X2 => x2.clone(),
        Expr::Const(c) => Node::constant(*c),
        Expr::Add(l, r) => &build(l, x1, x2) + &build(r, x1, x2),
        Expr::Sub(l, r) => &build(l, x1, x2) - &build(r, x1, x2),
        Expr::Mul(l, r) => &build(l, x1, x2) * &build(r, x1, x2),
        Expr::Ln(a) => build(a, x1, x2).ln(),
        Expr::Sin(a) => build(a, x1, x2).sin(),
    }
}

proptest! {
    #[test]
    fn seeded_add_and_mul(a in -1e6..1e6f64, b in -1e6..1e6f64) {
        prop_assert_eq!(dual::add(Dual::new(a, 1.), Dual::new(b, 0.)).derivative, 1.);
        prop_assert_eq!(dual::mul(Dual::new(a, 1.), Dual::new(b, 0.)).derivative, b);
    }

    #[test]
    fn engines_agree(e in expr(), a in -3.0..3.0f64, b in -3.0..3.0f64) {
        let mut scale = 1f64;
        let d1 = eval_dual(&e, Dual::variable(a), Dual::constant(b), &mut scale);
        let d2 = eval_dual(&e, Dual::constant(a), Dual::variable(b), &mut scale);
        prop_assume!(d1.real.is_finite() && scale < 1e8);

        let x1 = Node::new("x1", a);
        let x2 = Node::new("x2", b);
        let root = build(&e, &x1, &x2);
        let value = root.forward();
        root.backprop().unwrap();

        let tol = 1e-7 * scale;
        let (g1, g2) = (x1.grad(), x2.grad());
        prop_assert!((value - d1.real).abs() <= tol, "value {} vs {}", value, d1.real);
        prop_assert!((g1 - d1.derivative).abs() <= tol, "d/dx1 {} vs {}", g1, d1.derivative);
        prop_assert!((g2 - d2.derivative).abs() <= tol, "d/dx2 {} vs {}", g2, d2.derivative);
    }
}

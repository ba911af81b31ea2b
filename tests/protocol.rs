use dualgrad::{DomainError, Node, StateError};

fn composite() -> (Node, Node, Node) {
    let x1 = Node::new("x1", 2.);
    let x2 = Node::new("x2", 5.);
    let y = &(&x1.ln() + &(&x1 * &x2)) - &x2.sin();
    (x1, x2, y)
}

#[test]
fn backward_before_forward() {
    let (x1, _, y) = composite();
    let order = y.topological_order();
    assert!(matches!(
        y.seed_and_backward(&order, 1.),
        Err(StateError::NotEvaluated { .. })
    ));
    // The failed attempt leaves nothing behind, so a retry after `forward` succeeds.
    assert!(order.iter().all(|node| node.grad() == 0.));
    y.forward();
    y.seed_and_backward(&order, 1.).unwrap();
    assert_eq!(x1.grad(), 5.5);
}

#[test]
fn reversed_order_is_rejected() {
    let (_, _, y) = composite();
    y.forward();
    let mut order = y.topological_order();
    order.reverse();
    assert_eq!(y.seed_and_backward(&order, 1.), Err(StateError::RootNotLast));

    // Root is last, but a consumer precedes its operand.
    let mut order = y.topological_order();
    order.swap(0, 2);
    assert!(matches!(
        y.seed_and_backward(&order, 1.),
        Err(StateError::OutOfOrder { .. })
    ));
}

#[test]
fn incomplete_order_is_rejected() {
    let (_, _, y) = composite();
    y.forward();
    let mut order = y.topological_order();
    order.remove(0);
    assert!(matches!(
        y.seed_and_backward(&order, 1.),
        Err(StateError::MissingOperand { .. })
    ));
}

#[test]
fn manual_steps_out_of_order() {
    let a = Node::new("a", 2.);
    let b = Node::new("b", 3.);
    let ab = &a * &b;
    let z = &ab + &a;
    z.forward();
    z.seed(1.);
    z.backward().unwrap();
    a.backward().unwrap();
    // `ab` still owes `a` a contribution.
    let err = StateError::OutOfOrder { node: "a".into() };
    assert_eq!(ab.backward(), Err(err));
}

#[test]
fn second_pass_needs_reset() {
    let (x1, _, y) = composite();
    y.forward();
    let order = y.topological_order();
    y.seed_and_backward(&order, 1.).unwrap();
    let first = x1.grad();

    assert!(matches!(
        y.seed_and_backward(&order, 1.),
        Err(StateError::StaleGradient { .. })
    ));

    y.zero_grad();
    assert_eq!(x1.grad(), 0.);
    y.seed_and_backward(&order, 1.).unwrap();
    assert_eq!(x1.grad(), first);

    // backprop resets on its own.
    y.backprop().unwrap();
    assert_eq!(x1.grad(), first);
}

#[test]
fn seed_scales_gradients() {
    let (x1, x2, y) = composite();
    y.forward();
    y.backprop().unwrap();
    let (g1, g2) = (x1.grad(), x2.grad());

    y.zero_grad();
    y.seed_and_backward(&y.topological_order(), 2.).unwrap();
    assert_eq!(x1.grad(), 2. * g1);
    assert_eq!(x2.grad(), 2. * g2);
}

#[test]
fn ln_domain() {
    let x = Node::new("x", -1.);
    let y = &x.ln() + 1f64;
    assert!(y.forward().is_nan());
    assert_eq!(y.try_forward(), Err(DomainError::Ln { input: -1. }));

    x.set(0.).unwrap();
    assert!(y.forward().is_nan());
    assert_eq!(y.try_forward(), Err(DomainError::Ln { input: 0. }));

    x.set(1.).unwrap();
    assert_eq!(y.try_forward(), Ok(1.));
}

#[test]
fn ln_domain_gradient() {
    for input in [-1., 0.] {
        let x = Node::new("x", input);
        let y = &x.ln() + 1f64;
        y.forward();
        y.backprop().unwrap();
        assert!(x.grad().is_nan(), "d/dx ln(x) at {input} is {}", x.grad());
    }
}

#[test]
fn set_on_operator_node() {
    let (_, _, y) = composite();
    assert_eq!(y.set(1.), Err(StateError::NotALeaf));
}

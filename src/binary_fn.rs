/// A trait that represents a binary operation on a value.
/// It needs to implement a transformation of the values and the local partial
/// derivatives with respect to each operand.
pub trait BinaryFn {
    fn name(&self) -> &'static str;
    fn f(&self, lhs: f64, rhs: f64) -> f64;
    /// Partial derivatives `(df/dlhs, df/drhs)` at `(lhs, rhs)`.
    fn grad(&self, lhs: f64, rhs: f64) -> (f64, f64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
        }
    }
}

impl BinaryFn for BinaryOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
        }
    }

    fn f(&self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => lhs + rhs,
            Self::Sub => lhs - rhs,
            Self::Mul => lhs * rhs,
        }
    }

    fn grad(&self, lhs: f64, rhs: f64) -> (f64, f64) {
        match self {
            Self::Add => (1., 1.),
            Self::Sub => (1., -1.),
            // Each side sees the other operand's value.
            Self::Mul => (rhs, lhs),
        }
    }
}

#[test]
fn test_binary_rules() {
    assert_eq!(BinaryOp::Add.f(2., 3.), 5.);
    assert_eq!(BinaryOp::Sub.f(2., 3.), -1.);
    assert_eq!(BinaryOp::Mul.f(2., 3.), 6.);
    assert_eq!(BinaryOp::Add.grad(2., 3.), (1., 1.));
    assert_eq!(BinaryOp::Sub.grad(2., 3.), (1., -1.));
    assert_eq!(BinaryOp::Mul.grad(2., 3.), (3., 2.));
}

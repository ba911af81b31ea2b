use crate::error::DomainError;

/// A trait that represents an unary operation on a value.
/// It needs to implement a transformation of the value and its local derivative.
/// Both engines go through this trait, so a rule is written only once.
pub trait UnaryFn {
    fn name(&self) -> &'static str;
    fn f(&self, data: f64) -> f64;
    /// Derivative of `f` at `data`.
    fn grad(&self, data: f64) -> f64;

    /// Checks that `data` lies in the domain of `f`. Defaults to the whole real line.
    fn check(&self, _data: f64) -> Result<(), DomainError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Ln,
    Sin,
}

impl UnaryFn for UnaryOp {
    fn name(&self) -> &'static str {
        match self {
            Self::Ln => "ln",
            Self::Sin => "sin",
        }
    }

    fn f(&self, data: f64) -> f64 {
        match self {
            // f64::ln returns -inf at 0, which would leave the derivative as inf.
            Self::Ln if data <= 0. => f64::NAN,
            Self::Ln => data.ln(),
            Self::Sin => data.sin(),
        }
    }

    fn grad(&self, data: f64) -> f64 {
        match self {
            Self::Ln if data <= 0. => f64::NAN,
            Self::Ln => 1. / data,
            Self::Sin => data.cos(),
        }
    }

    fn check(&self, data: f64) -> Result<(), DomainError> {
        match self {
            Self::Ln if data <= 0. || data.is_nan() => Err(DomainError::Ln { input: data }),
            _ => Ok(()),
        }
    }
}

#[test]
fn test_unary_rules() {
    assert_eq!(UnaryOp::Ln.f(1.), 0.);
    assert_eq!(UnaryOp::Ln.grad(4.), 0.25);
    assert_eq!(UnaryOp::Sin.f(0.), 0.);
    assert_eq!(UnaryOp::Sin.grad(0.), 1.);
    assert!(UnaryOp::Ln.f(0.).is_nan());
    assert!(UnaryOp::Ln.grad(-1.).is_nan());
    assert_eq!(UnaryOp::Ln.check(-2.), Err(DomainError::Ln { input: -2. }));
    assert!(UnaryOp::Ln.check(f64::NAN).is_err());
    assert_eq!(UnaryOp::Sin.check(-2.), Ok(()));
}

//! Forward-mode differentiation with first order dual numbers.
//!
//! A dual number `a + b ε` with `ε² = 0` carries a value and its derivative along one seeded
//! input. Products of two derivative coefficients vanish, so the algebra is exact to first
//! order only.

use std::{
    fmt::Display,
    ops::{Add, Mul, Neg, Sub},
};

use crate::{
    binary_fn::{BinaryFn, BinaryOp},
    error::DomainError,
    unary_fn::{UnaryFn, UnaryOp},
};

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Dual {
    pub real: f64,
    pub derivative: f64,
}

impl Dual {
    pub fn new(real: f64, derivative: f64) -> Self {
        Self { real, derivative }
    }

    /// The input we differentiate with respect to.
    pub fn variable(real: f64) -> Self {
        Self::new(real, 1.)
    }

    pub fn constant(real: f64) -> Self {
        Self::new(real, 0.)
    }

    pub fn is_real(&self) -> bool {
        self.derivative == 0.
    }

    pub fn ln(self) -> Self {
        self.apply(UnaryOp::Ln)
    }

    pub fn sin(self) -> Self {
        self.apply(UnaryOp::Sin)
    }

    /// Like [`Dual::ln`], but reports a non-positive input instead of returning NaN.
    pub fn try_ln(self) -> Result<Self, DomainError> {
        UnaryOp::Ln.check(self.real)?;
        Ok(self.ln())
    }

    /// Chain rule: `f(a + b ε) = f(a) + f'(a) b ε`.
    pub fn apply(self, op: impl UnaryFn) -> Self {
        Self {
            real: op.f(self.real),
            derivative: op.grad(self.real) * self.derivative,
        }
    }

    fn binary(self, op: BinaryOp, rhs: Self) -> Self {
        let (dlhs, drhs) = op.grad(self.real, rhs.real);
        Self {
            real: op.f(self.real, rhs.real),
            derivative: dlhs * self.derivative + drhs * rhs.derivative,
        }
    }
}

impl From<f64> for Dual {
    fn from(real: f64) -> Self {
        Self::constant(real)
    }
}

impl Display for Dual {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dual({}, {})", self.real, self.derivative)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Dual {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Dual {
                self.binary($op, rhs)
            }
        }

        impl $trait<f64> for Dual {
            type Output = Dual;
            fn $method(self, rhs: f64) -> Dual {
                self.binary($op, Dual::from(rhs))
            }
        }

        impl $trait<Dual> for f64 {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Dual {
                Dual::from(self).binary($op, rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, BinaryOp::Add);
impl_binary_op!(Sub, sub, BinaryOp::Sub);
impl_binary_op!(Mul, mul, BinaryOp::Mul);

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self::new(-self.real, -self.derivative)
    }
}

pub fn add(lhs: impl Into<Dual>, rhs: impl Into<Dual>) -> Dual {
    lhs.into() + rhs.into()
}

pub fn sub(lhs: impl Into<Dual>, rhs: impl Into<Dual>) -> Dual {
    lhs.into() - rhs.into()
}

pub fn mul(lhs: impl Into<Dual>, rhs: impl Into<Dual>) -> Dual {
    lhs.into() * rhs.into()
}

/// Natural logarithm. Both components are NaN when the real part is not positive.
pub fn ln(x: impl Into<Dual>) -> Dual {
    x.into().ln()
}

pub fn sin(x: impl Into<Dual>) -> Dual {
    x.into().sin()
}

/// Evaluates `f` once with input `wrt` seeded, returning the value and `∂f/∂x_wrt`.
///
/// # Panics
///
/// Panics if `wrt` is out of bounds of `inputs`.
pub fn partial<const N: usize>(
    f: impl Fn([Dual; N]) -> Dual,
    inputs: [f64; N],
    wrt: usize,
) -> (f64, f64) {
    assert!(wrt < N, "seeded input {wrt} is out of {N} inputs");
    let mut args = inputs.map(Dual::constant);
    args[wrt] = Dual::variable(inputs[wrt]);
    let res = f(args);
    (res.real, res.derivative)
}

/// Full gradient by forward mode: one seeded evaluation of `f` per input.
pub fn gradient<const N: usize>(
    f: impl Fn([Dual; N]) -> Dual,
    inputs: [f64; N],
) -> (f64, [f64; N]) {
    let mut value = 0.;
    let mut grad = [0.; N];
    for (i, g) in grad.iter_mut().enumerate() {
        let (v, d) = partial(&f, inputs, i);
        value = v;
        *g = d;
    }
    log::debug!("forward-mode gradient: {N} seeded evaluations");
    (value, grad)
}

#[test]
fn test_dual() {
    let d1 = Dual::new(1., 2.);
    let d2 = Dual::new(3., 4.);
    assert_eq!(d1 + d2, Dual::new(4., 6.));
    assert_eq!(d1 - d2, Dual::new(-2., -2.));
    assert_eq!(-d1, Dual::new(-1., -2.));

    let d4 = Dual::new(1., 2.);
    let d5 = Dual::new(20., -10.);
    assert_eq!(d4 * d5, Dual::new(20., 30.));
    assert_eq!(d4 * d5, d5 * d4);
    assert!(!d4.is_real());
    assert!(Dual::constant(3.).is_real());
}

#[test]
fn test_scalar_coercion() {
    let x = Dual::variable(2.);
    assert_eq!(x + 5f64, Dual::new(7., 1.));
    assert_eq!(5f64 - x, Dual::new(3., -1.));
    assert_eq!(3f64 * x, Dual::new(6., 3.));
    assert_eq!(add(2f64, 5f64), Dual::new(7., 0.));
    assert_eq!(mul(x, 5f64), Dual::new(10., 5.));
    assert_eq!(sub(5f64, x), Dual::new(3., -1.));
}

#[test]
fn test_functions() {
    let y = ln(Dual::variable(2.));
    approx::assert_relative_eq!(y.real, 2f64.ln());
    approx::assert_relative_eq!(y.derivative, 0.5);

    let y = sin(Dual::variable(2.));
    approx::assert_relative_eq!(y.real, 2f64.sin());
    approx::assert_relative_eq!(y.derivative, 2f64.cos());

    // A plain scalar is a constant.
    assert_eq!(sin(0f64).derivative, 0.);
}

#[test]
fn test_ln_domain() {
    let y = ln(Dual::variable(-1.));
    assert!(y.real.is_nan());
    assert!(y.derivative.is_nan());
    let y = ln(Dual::variable(0.));
    assert!(y.real.is_nan());
    assert!(y.derivative.is_nan());
    assert_eq!(Dual::variable(0.).try_ln(), Err(DomainError::Ln { input: 0. }));
    assert_eq!(Dual::variable(1.).try_ln(), Ok(Dual::new(0., 1.)));
}

#[test]
fn test_composite() {
    let f = |[x1, x2]: [Dual; 2]| ln(x1) + x1 * x2 - sin(x2);
    let (y, dx1) = partial(f, [2., 5.], 0);
    approx::assert_relative_eq!(y, 11.652, epsilon = 1e-3);
    approx::assert_relative_eq!(dx1, 5.5);
    let (_, grad) = gradient(f, [2., 5.]);
    approx::assert_relative_eq!(grad[0], 5.5);
    approx::assert_relative_eq!(grad[1], 2. - 5f64.cos());
}

#[test]
fn test_display() {
    assert_eq!(Dual::new(1.5, 2.).to_string(), "Dual(1.5, 2)");
}

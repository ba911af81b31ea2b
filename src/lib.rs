//! Derivatives of scalar expressions by two independent engines:
//!
//! - [`Dual`] numbers for forward mode, one seeded evaluation per partial derivative.
//! - [`Node`] graphs for reverse mode, one forward and one backward pass for all partials.
//!
//! ```
//! use dualgrad::{dual, Dual, Node};
//!
//! // f(x1, x2) = ln(x1) + x1 * x2 - sin(x2) at (2, 5)
//! let y = dual::ln(Dual::variable(2.)) + Dual::variable(2.) * 5f64 - dual::sin(5f64);
//! assert!((y.derivative - 5.5).abs() < 1e-12);
//!
//! let x1 = Node::new("x1", 2.);
//! let x2 = Node::new("x2", 5.);
//! let y = &(&x1.ln() + &(&x1 * &x2)) - &x2.sin();
//! y.forward();
//! y.backprop().unwrap();
//! assert!((x1.grad() - 5.5).abs() < 1e-12);
//! assert!((x2.grad() - (2. - 5f64.cos())).abs() < 1e-12);
//! ```

mod binary_fn;
pub mod dual;
pub mod error;
pub mod node;
mod unary_fn;

pub use binary_fn::{BinaryFn, BinaryOp};
pub use dual::Dual;
pub use error::{DomainError, Error, Result, StateError};
pub use node::Node;
pub use unary_fn::{UnaryFn, UnaryOp};

use thiserror::Error;

/// An elementary function was evaluated outside of its domain.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum DomainError {
    #[error("ln is undefined for non-positive input {input}")]
    Ln { input: f64 },
}

/// The graph was driven in a way that breaks the forward/backward protocol.
///
/// These are programmer errors. They are reported instead of silently producing wrong
/// gradients, but there is nothing to retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("value of `{node}` is not defined in the forward pass. Call `forward()` before `backward()`.")]
    NotEvaluated { node: String },
    #[error("`{node}` received a gradient after its own backward step; the order is not a reverse topological order")]
    OutOfOrder { node: String },
    #[error("the root must be the last node of the topological order")]
    RootNotLast,
    #[error("operand `{node}` is missing from the topological order")]
    MissingOperand { node: String },
    #[error("`{node}` still holds gradient from an earlier pass. Call `zero_grad()` first.")]
    StaleGradient { node: String },
    #[error("cannot set value to non-leaf nodes")]
    NotALeaf,
}

/// Any failure of the crate, for callers that run both checked evaluation and
/// backpropagation and propagate either with `?`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    State(#[from] StateError),
}

/// Result alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[test]
fn test_error_conversion() {
    fn domain() -> Result<()> {
        Err(DomainError::Ln { input: -1. })?
    }
    fn state() -> Result<()> {
        Err(StateError::RootNotLast)?
    }
    assert_eq!(domain(), Err(Error::Domain(DomainError::Ln { input: -1. })));
    let msg = domain().unwrap_err().to_string();
    assert_eq!(msg, "ln is undefined for non-positive input -1");
    assert_eq!(state(), Err(Error::State(StateError::RootNotLast)));
    assert_eq!(
        StateError::NotEvaluated { node: "mul".into() }.to_string(),
        "value of `mul` is not defined in the forward pass. Call `forward()` before `backward()`."
    );
}

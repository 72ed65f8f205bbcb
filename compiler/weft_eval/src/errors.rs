//! Evaluation errors.

use thiserror::Error;

/// Failure while running a program.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A `RuntimeError` statement executed.
    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("read of undefined variable `{0}`")]
    UndefinedVariable(String),

    #[error("{0}")]
    TypeError(String),

    #[error("no field {field} on type `{ty}`")]
    NoSuchField { ty: String, field: String },

    #[error("function table slot {0} is empty")]
    EmptySlot(i64),

    #[error("goto target `{0}` not found in any enclosing block")]
    MissingLabel(String),

    #[error("`yield` executed outside an iterator frame")]
    YieldOutsideIterator,

    #[error("unsupported during evaluation: {0}")]
    Unsupported(String),

    #[error("step limit of {0} exceeded")]
    StepLimit(u64),

    #[error("call depth limit of {0} exceeded")]
    DepthLimit(usize),
}

pub type EvalResult<T> = Result<T, EvalError>;

#[cold]
pub fn type_error(expected: &str, found: &crate::Value) -> EvalError {
    EvalError::TypeError(format!("expected {expected}, found {found:?}"))
}

#[cold]
pub fn unsupported(what: impl Into<String>) -> EvalError {
    EvalError::Unsupported(what.into())
}

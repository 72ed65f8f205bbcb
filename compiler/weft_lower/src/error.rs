//! Errors raised by iterator lowering.

use thiserror::Error;
use weft_diagnostic::{Diagnostic, ErrorCode, ErrorGuaranteed};
use weft_ir::{IrError, Span};

/// Failure of the lowering pass.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerError {
    /// A shape the pass cannot handle. Always a bug upstream or here.
    #[error("internal error: {message}")]
    Internal { message: String, span: Span },

    /// User errors were reported to the diagnostic queue.
    #[error("iterator lowering stopped: {0}")]
    Stopped(ErrorGuaranteed),
}

impl LowerError {
    /// Diagnostic form of an internal error. `Stopped` was already reported.
    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        match self {
            LowerError::Internal { message, span } => Some(
                Diagnostic::error(ErrorCode::E9001)
                    .with_message(message.clone())
                    .with_label(*span, "while lowering this"),
            ),
            LowerError::Stopped(_) => None,
        }
    }
}

impl From<IrError> for LowerError {
    fn from(err: IrError) -> Self {
        LowerError::Internal {
            message: err.to_string(),
            span: Span::DUMMY,
        }
    }
}

pub type LowerResult<T> = Result<T, LowerError>;

#[cold]
pub(crate) fn internal(message: impl Into<String>, span: Span) -> LowerError {
    LowerError::Internal {
        message: message.into(),
        span,
    }
}

//! Diagnostic system for middle-end passes.
//!
//! Every user-facing report carries:
//! - an error code for searchability
//! - a message saying what went wrong
//! - a primary span saying where
//! - optional notes with context
//!
//! # Error Guarantees
//!
//! [`ErrorGuaranteed`] is type-level proof that at least one error was
//! reported. Passes that stop after collecting user errors return it, so a
//! failure can never be silent.
//!
//! ```text
//! let guarantee = queue.emit_error(diagnostic);
//! fn check(..) -> Result<(), ErrorGuaranteed> { ... }
//! ```

mod diagnostic;
mod error_code;
mod guarantee;
pub mod queue;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use guarantee::ErrorGuaranteed;
pub use queue::{DiagnosticConfig, DiagnosticQueue};

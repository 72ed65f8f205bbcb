//! Weft Eval - reference interpreter for the Weft middle-end IR.
//!
//! Runs a [`weft_ir::Program`] directly over its statement trees. For-loops
//! that have not been lowered execute naively by resuming the iterator
//! body on every `yield`, so the same program can be run before and after
//! iterator lowering and the observable output compared.
//!
//! Observable output is whatever the program passes to the `trace` extern.

pub mod errors;
mod interp;
mod value;

pub use errors::{EvalError, EvalResult};
pub use interp::{EvalConfig, Evaluator};
pub use value::{ObjId, Place, Value};

//! Hand-off to the state-machine lowerer.

use weft_ir::{FnId, Program};

use crate::LowerResult;

/// Turns an iterator body that no strategy could consume into a resumable
/// function.
///
/// Invoked once per iterator function that still carries `ITERATOR_FN`
/// after every for-loop site has been lowered.
pub trait StateMachineLowerer {
    fn lower_iterator(&mut self, program: &mut Program, iterator: FnId) -> LowerResult<()>;
}

impl<F> StateMachineLowerer for F
where
    F: FnMut(&mut Program, FnId) -> LowerResult<()>,
{
    fn lower_iterator(&mut self, program: &mut Program, iterator: FnId) -> LowerResult<()> {
        self(program, iterator)
    }
}

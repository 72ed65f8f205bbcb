use crate::FnId;

/// Append-only table of functions reachable through indirect calls.
///
/// A slot number is stable once handed out: emitted code embeds it as an
/// integer constant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FunctionTable {
    slots: Vec<FnId>,
}

impl FunctionTable {
    /// Register `func` in the next free slot.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot count is bounded well below u32::MAX"
    )]
    pub fn register(&mut self, func: FnId) -> u32 {
        self.slots.push(func);
        (self.slots.len() - 1) as u32
    }

    pub fn get(&self, slot: u32) -> Option<FnId> {
        self.slots.get(slot as usize).copied()
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "slot count is bounded well below u32::MAX"
    )]
    pub fn slot_of(&self, func: FnId) -> Option<u32> {
        self.slots.iter().position(|&f| f == func).map(|i| i as u32)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

//! Symbols: local variables, formals, and labels.

use bitflags::bitflags;

use crate::{FnId, Name, Span, TypeId};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SymKind {
    /// Local variable, declared by a `Def` statement.
    Var,
    /// Formal parameter of its owning function.
    Arg,
    /// Jump target, placed by a `Def` statement and targeted by `Goto`.
    Label,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct SymFlags: u8 {
        /// Compiler temporary.
        const TEMP = 1 << 0;
        /// Trailing out-parameter carrying a function's result.
        const RET_ARG = 1 << 1;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: Name,
    pub kind: SymKind,
    pub ty: TypeId,
    /// Function whose frame holds this symbol. `None` until the symbol is
    /// attached to a function.
    pub owner: Option<FnId>,
    pub flags: SymFlags,
    pub span: Span,
}

impl Symbol {
    #[inline]
    pub fn is_label(&self) -> bool {
        self.kind == SymKind::Label
    }

    #[inline]
    pub fn is_arg(&self) -> bool {
        self.kind == SymKind::Arg
    }
}

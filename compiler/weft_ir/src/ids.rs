//! ID newtypes for the program arenas.
//!
//! Every arena in [`Program`](crate::Program) is addressed by its own
//! 32-bit index type, so a statement handle can never be used to look up a
//! symbol. Handles stay valid for the lifetime of the program: statements
//! and functions are detached, never freed.

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw arena index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the arena index.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[expect(
                clippy::cast_possible_truncation,
                reason = "arenas are bounded well below u32::MAX entries"
            )]
            pub(crate) fn from_len(len: usize) -> Self {
                Self(len as u32)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Handle to a statement in the statement arena.
    StmtId,
    "s"
);

define_id!(
    /// Handle to a symbol (variable, formal, or label).
    SymId,
    "%"
);

define_id!(
    /// Handle to a function definition.
    FnId,
    "fn"
);

define_id!(
    /// Handle to a type definition.
    TypeId,
    "ty"
);

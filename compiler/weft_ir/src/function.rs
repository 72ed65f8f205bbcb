//! Function definitions and iterator protocol metadata.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::{FnId, Name, Span, StmtId, SymId, TypeId};

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct FnFlags: u16 {
        /// Body contains yield points; calling it builds an instance record.
        const ITERATOR_FN = 1 << 0;
        /// Marked by an earlier pass for unconditional inlining at loops.
        const INLINE_ITERATOR = 1 << 1;
        /// Leader-side parallel dispatch helper.
        const TO_LEADER = 1 << 2;
        /// Follower-side parallel dispatch helper.
        const TO_FOLLOWER = 1 << 3;
        /// Copy routine for values of its single formal's type.
        const AUTO_COPY = 1 << 4;
        /// Destroy routine for values of its single formal's type.
        const AUTO_DESTROY = 1 << 5;
        /// Provided by the runtime; no body is lowered.
        const EXTERN = 1 << 6;
        /// Synthesized by iterator lowering.
        const GENERATED = 1 << 7;
    }
}

/// Protocol operations emitted by generic lowering.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProtocolOp {
    Zip1,
    Zip2,
    Zip3,
    Zip4,
    HasMore,
    GetValue,
}

impl ProtocolOp {
    pub const ALL: [ProtocolOp; 6] = [
        ProtocolOp::Zip1,
        ProtocolOp::Zip2,
        ProtocolOp::Zip3,
        ProtocolOp::Zip4,
        ProtocolOp::HasMore,
        ProtocolOp::GetValue,
    ];
}

/// Everything the lowering needs to drive an iterator through its
/// advance/test/fetch protocol.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IteratorInfo {
    pub irecord: TypeId,
    pub iclass: TypeId,
    pub get_iterator: FnId,
    pub zip1: FnId,
    pub zip2: FnId,
    pub zip3: FnId,
    pub zip4: FnId,
    pub has_more: FnId,
    pub get_value: FnId,
}

impl IteratorInfo {
    pub fn protocol_fn(&self, op: ProtocolOp) -> FnId {
        match op {
            ProtocolOp::Zip1 => self.zip1,
            ProtocolOp::Zip2 => self.zip2,
            ProtocolOp::Zip3 => self.zip3,
            ProtocolOp::Zip4 => self.zip4,
            ProtocolOp::HasMore => self.has_more,
            ProtocolOp::GetValue => self.get_value,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FnDef {
    pub name: Name,
    pub formals: SmallVec<[SymId; 4]>,
    pub ret_type: TypeId,
    /// Symbol holding the value returned at the end of the body.
    pub ret_sym: Option<SymId>,
    /// Root `Block` statement.
    pub body: StmtId,
    pub flags: FnFlags,
    pub iterator_info: Option<IteratorInfo>,
    /// Receiver formal of a method.
    pub this: Option<SymId>,
    pub span: Span,
}

impl FnDef {
    #[inline]
    pub fn is_iterator(&self) -> bool {
        self.flags.contains(FnFlags::ITERATOR_FN)
    }

    #[inline]
    pub fn formal(&self, ordinal: usize) -> Option<SymId> {
        self.formals.get(ordinal).copied()
    }
}

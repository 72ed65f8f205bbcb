//! Type definitions.
//!
//! Only the shape the middle end needs survives to this point: scalar
//! kinds, records and classes with ordered fields, reference types, and the
//! metadata that links iterator record/class types back to their iterator
//! function.

use bitflags::bitflags;
use smallvec::SmallVec;

use crate::{FnId, Name, TypeId};

/// Structural kind of a type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Void,
    Bool,
    Int,
    Str,
    /// Value aggregate. Fields are positional.
    Record,
    /// Heap object with a runtime class identity.
    Class,
    /// Reference to a value of the wrapped type.
    Ref(TypeId),
    /// First-class function value (function-table slot).
    FnRef,
}

bitflags! {
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
    pub struct TypeFlags: u16 {
        /// Anonymous positional aggregate used for zippered iteration.
        const TUPLE = 1 << 0;
        /// Instance record produced by calling an iterator function.
        const ITERATOR_RECORD = 1 << 1;
        /// Instance class holding the resumable state of one iteration.
        const ITERATOR_CLASS = 1 << 2;
        /// Synthesized record carrying the captures of an extracted loop body.
        const ARG_BUNDLE = 1 << 3;
        /// Reference type of an argument bundle.
        const REF_ARG_BUNDLE = 1 << 4;
        /// The root class every class implicitly derives from.
        const OBJECT = 1 << 5;
    }
}

/// Boundedness of a range receiver type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RangeBoundedness {
    Bounded,
    BoundedLow,
    BoundedHigh,
    Unbounded,
}

/// One named, typed field of a record or class.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDef {
    pub name: Name,
    pub ty: TypeId,
}

/// A type definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDef {
    pub name: Name,
    pub kind: TypeKind,
    pub flags: TypeFlags,
    pub fields: Vec<FieldDef>,
    /// Leading fields that do not correspond to iterator formals
    /// (the `super` link of an iterator class). Ordinal field `n` maps to
    /// field index `header_fields + n - 1`.
    pub header_fields: u32,
    /// Runtime subtypes, in declaration order.
    pub dispatch_children: SmallVec<[TypeId; 4]>,
    /// Iterator function this record/class type was synthesized for.
    pub iterator_fn: Option<FnId>,
    /// Set on range receiver types.
    pub range: Option<RangeBoundedness>,
    /// Interned reference type, created on demand by `Program::ref_of`.
    pub ref_type: Option<TypeId>,
}

impl TypeDef {
    pub fn new(name: Name, kind: TypeKind) -> Self {
        TypeDef {
            name,
            kind,
            flags: TypeFlags::empty(),
            fields: Vec::new(),
            header_fields: 0,
            dispatch_children: SmallVec::new(),
            iterator_fn: None,
            range: None,
            ref_type: None,
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: TypeFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldDef>) -> Self {
        self.fields.extend(fields);
        self
    }

    #[inline]
    pub fn is_aggregate(&self) -> bool {
        matches!(self.kind, TypeKind::Record | TypeKind::Class)
    }

    #[inline]
    pub fn is_tuple(&self) -> bool {
        self.flags.contains(TypeFlags::TUPLE)
    }

    /// Field index of the 1-based formal ordinal `n`.
    #[inline]
    pub fn ordinal_field(&self, n: u32) -> Option<u32> {
        let index = self.header_fields + n.checked_sub(1)?;
        ((index as usize) < self.fields.len()).then_some(index)
    }

    /// Field index of a field by name.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "field count is bounded well below u32::MAX"
    )]
    pub fn field_named(&self, name: Name) -> Option<u32> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .map(|i| i as u32)
    }

    pub fn field(&self, index: u32) -> Option<&FieldDef> {
        self.fields.get(index as usize)
    }
}

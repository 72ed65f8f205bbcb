//! Runtime values and the object heap.

use weft_ir::{Name, SymId, TypeId};

/// Handle to a heap object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjId(u32);

/// Storage location a reference points at.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Place {
    /// Local of the frame at the given depth.
    Local { frame: usize, sym: SymId },
    Field { obj: ObjId, index: u32 },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Void,
    /// Unset aggregate or reference.
    Nil,
    Int(i64),
    Bool(bool),
    Str(Name),
    Obj(ObjId),
    Ref(Place),
}

impl Value {
    pub fn as_int(self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(v),
            Value::Bool(b) => Some(i64::from(b)),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(b),
            Value::Int(v) => Some(v != 0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Object {
    pub(crate) ty: TypeId,
    pub(crate) fields: Vec<Value>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "test programs allocate far fewer than u32::MAX objects"
    )]
    pub(crate) fn alloc(&mut self, ty: TypeId, fields: Vec<Value>) -> ObjId {
        self.objects.push(Object { ty, fields });
        ObjId((self.objects.len() - 1) as u32)
    }

    pub(crate) fn get(&self, id: ObjId) -> &Object {
        &self.objects[id.0 as usize]
    }

    pub(crate) fn get_mut(&mut self, id: ObjId) -> &mut Object {
        &mut self.objects[id.0 as usize]
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }
}

//! Whole-program arenas and the structural mutation API.
//!
//! # Design
//!
//! A [`Program`] owns four arenas (types, symbols, statements, functions)
//! plus the function table that indirect calls index. Statements form trees
//! through `Block` bodies and `Cond` branches; each statement records its
//! parent so the lowering pass can insert before/after, detach, and replace
//! any statement given only its handle.
//!
//! Detached statements are never freed. A handle that was removed simply
//! has no parent and is unreachable from any function body.

mod ftable;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

pub use ftable::FunctionTable;

use crate::{
    BlockInfo, FnDef, FnFlags, FnId, Name, Span, Stmt, StmtId, StmtKind, StringInterner, SymFlags,
    SymId, SymKind, Symbol, TypeDef, TypeFlags, TypeId, TypeKind,
};

// ── Errors ──────────────────────────────────────────────────────────

/// Misuse of the structural mutation API.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IrError {
    /// The anchor statement has no enclosing block.
    Detached(StmtId),
    /// The statement is not a `Block`.
    NotABlock(StmtId),
    /// The statement is a conditional branch and cannot be unlinked.
    BranchRemoval(StmtId),
}

impl fmt::Display for IrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrError::Detached(id) => write!(f, "statement {id:?} is not inside a block"),
            IrError::NotABlock(id) => write!(f, "statement {id:?} is not a block"),
            IrError::BranchRemoval(id) => {
                write!(f, "statement {id:?} is a conditional branch and cannot be removed")
            }
        }
    }
}

impl std::error::Error for IrError {}

// ── Builtin types ───────────────────────────────────────────────────

impl TypeId {
    pub const VOID: TypeId = TypeId::new(0);
    pub const BOOL: TypeId = TypeId::new(1);
    pub const INT: TypeId = TypeId::new(2);
    pub const STR: TypeId = TypeId::new(3);
    /// Root class.
    pub const OBJECT: TypeId = TypeId::new(4);
}

// ── Program ─────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Program {
    pub interner: StringInterner,
    types: Vec<TypeDef>,
    syms: Vec<Symbol>,
    stmts: Vec<Stmt>,
    fns: Vec<FnDef>,
    body_owner: FxHashMap<StmtId, FnId>,
    /// Slots addressed by indirect calls.
    pub ftable: FunctionTable,
    /// Registered copy routine per type.
    pub auto_copy: FxHashMap<TypeId, FnId>,
    /// Registered destroy routine per type.
    pub auto_destroy: FxHashMap<TypeId, FnId>,
}

impl Program {
    pub fn new() -> Self {
        let mut program = Program {
            interner: StringInterner::new(),
            types: Vec::new(),
            syms: Vec::new(),
            stmts: Vec::new(),
            fns: Vec::new(),
            body_owner: FxHashMap::default(),
            ftable: FunctionTable::default(),
            auto_copy: FxHashMap::default(),
            auto_destroy: FxHashMap::default(),
        };
        for (name, kind) in [
            ("void", TypeKind::Void),
            ("bool", TypeKind::Bool),
            ("int", TypeKind::Int),
            ("string", TypeKind::Str),
        ] {
            let name = program.intern(name);
            program.add_type(TypeDef::new(name, kind));
        }
        let object = program.intern("object");
        program.add_type(TypeDef::new(object, TypeKind::Class).with_flags(TypeFlags::OBJECT));
        program
    }

    #[inline]
    pub fn intern(&mut self, s: &str) -> Name {
        self.interner.intern(s)
    }

    #[inline]
    pub fn name_str(&self, name: Name) -> &str {
        self.interner.lookup(name)
    }

    // Types

    pub fn add_type(&mut self, def: TypeDef) -> TypeId {
        let id = TypeId::from_len(self.types.len());
        self.types.push(def);
        id
    }

    #[inline]
    pub fn ty(&self, id: TypeId) -> &TypeDef {
        &self.types[id.index()]
    }

    #[inline]
    pub fn ty_mut(&mut self, id: TypeId) -> &mut TypeDef {
        &mut self.types[id.index()]
    }

    /// Reference type of `ty`, created and cached on first request.
    pub fn ref_of(&mut self, ty: TypeId) -> TypeId {
        if let Some(existing) = self.ty(ty).ref_type {
            return existing;
        }
        let name = format!("_ref_{}", self.name_str(self.ty(ty).name));
        let name = self.intern(&name);
        let mut def = TypeDef::new(name, TypeKind::Ref(ty));
        if self.ty(ty).flags.contains(TypeFlags::ARG_BUNDLE) {
            def.flags |= TypeFlags::REF_ARG_BUNDLE;
        }
        let id = self.add_type(def);
        self.ty_mut(ty).ref_type = Some(id);
        id
    }

    /// Strip one level of reference.
    pub fn value_type(&self, ty: TypeId) -> TypeId {
        match self.ty(ty).kind {
            TypeKind::Ref(inner) => inner,
            _ => ty,
        }
    }

    #[inline]
    pub fn is_ref(&self, ty: TypeId) -> bool {
        matches!(self.ty(ty).kind, TypeKind::Ref(_))
    }

    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId::from_len)
    }

    // Symbols

    pub fn new_sym(&mut self, name: &str, kind: SymKind, ty: TypeId) -> SymId {
        let name = self.intern(name);
        let id = SymId::from_len(self.syms.len());
        self.syms.push(Symbol {
            name,
            kind,
            ty,
            owner: None,
            flags: SymFlags::empty(),
            span: Span::DUMMY,
        });
        id
    }

    /// Fresh compiler temporary.
    pub fn new_temp(&mut self, name: &str, ty: TypeId) -> SymId {
        let id = self.new_sym(name, SymKind::Var, ty);
        self.sym_mut(id).flags |= SymFlags::TEMP;
        id
    }

    /// Fresh local owned by `owner`.
    pub fn new_local(&mut self, owner: FnId, name: &str, ty: TypeId) -> SymId {
        let id = self.new_temp(name, ty);
        self.sym_mut(id).owner = Some(owner);
        id
    }

    pub(crate) fn clone_sym(&mut self, sym: SymId) -> SymId {
        let mut copy = self.sym(sym).clone();
        copy.owner = None;
        let id = SymId::from_len(self.syms.len());
        self.syms.push(copy);
        id
    }

    #[inline]
    pub fn sym(&self, id: SymId) -> &Symbol {
        &self.syms[id.index()]
    }

    #[inline]
    pub fn sym_mut(&mut self, id: SymId) -> &mut Symbol {
        &mut self.syms[id.index()]
    }

    #[inline]
    pub fn sym_ty(&self, id: SymId) -> TypeId {
        self.sym(id).ty
    }

    #[inline]
    pub fn sym_name(&self, id: SymId) -> &str {
        self.name_str(self.sym(id).name)
    }

    // Functions

    /// Register a function. Formals are claimed by the new function.
    pub fn add_fn(&mut self, def: FnDef) -> FnId {
        let id = FnId::from_len(self.fns.len());
        self.body_owner.insert(def.body, id);
        for &formal in &def.formals {
            self.sym_mut(formal).owner = Some(id);
        }
        if let Some(ret) = def.ret_sym {
            self.sym_mut(ret).owner = Some(id);
        }
        self.fns.push(def);
        id
    }

    /// Create a function with an empty body and no formals.
    pub fn new_fn(&mut self, name: &str, ret_type: TypeId, span: Span) -> FnId {
        let name = self.intern(name);
        let body = self.new_stmt(StmtKind::block(Vec::new()), span);
        self.add_fn(FnDef {
            name,
            formals: SmallVec::new(),
            ret_type,
            ret_sym: None,
            body,
            flags: FnFlags::empty(),
            iterator_info: None,
            this: None,
            span,
        })
    }

    /// Append a formal to `func`.
    pub fn add_formal(&mut self, func: FnId, name: &str, ty: TypeId) -> SymId {
        let sym = self.new_sym(name, SymKind::Arg, ty);
        self.sym_mut(sym).owner = Some(func);
        self.func_mut(func).formals.push(sym);
        sym
    }

    #[inline]
    pub fn func(&self, id: FnId) -> &FnDef {
        &self.fns[id.index()]
    }

    #[inline]
    pub fn func_mut(&mut self, id: FnId) -> &mut FnDef {
        &mut self.fns[id.index()]
    }

    #[inline]
    pub fn fn_name(&self, id: FnId) -> &str {
        self.name_str(self.func(id).name)
    }

    pub fn fn_ids(&self) -> impl Iterator<Item = FnId> {
        (0..self.fns.len()).map(FnId::from_len)
    }

    pub fn fn_count(&self) -> usize {
        self.fns.len()
    }

    pub fn find_fn(&self, name: &str) -> Option<FnId> {
        let name = self.interner.get(name)?;
        self.fn_ids().find(|&id| self.func(id).name == name)
    }

    /// Iterator function behind an iterator record/class type, looking
    /// through references.
    pub fn iterator_fn_of(&self, ty: TypeId) -> Option<FnId> {
        self.ty(self.value_type(ty)).iterator_fn
    }

    // Statements

    /// Allocate a detached statement, adopting any child statements.
    pub fn new_stmt(&mut self, kind: StmtKind, span: Span) -> StmtId {
        let id = StmtId::from_len(self.stmts.len());
        let children = kind.children();
        self.stmts.push(Stmt {
            kind,
            parent: None,
            span,
        });
        for child in children {
            self.stmts[child.index()].parent = Some(id);
        }
        id
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn kind(&self, id: StmtId) -> &StmtKind {
        &self.stmts[id.index()].kind
    }

    /// Mutable access for in-place operand rewrites. Structural changes to
    /// block bodies and branches go through the insertion API so parent
    /// links stay consistent.
    #[inline]
    pub fn kind_mut(&mut self, id: StmtId) -> &mut StmtKind {
        &mut self.stmts[id.index()].kind
    }

    #[inline]
    pub fn span(&self, id: StmtId) -> Span {
        self.stmts[id.index()].span
    }

    #[inline]
    pub fn parent(&self, id: StmtId) -> Option<StmtId> {
        self.stmts[id.index()].parent
    }

    /// Function whose body contains `id`.
    pub fn enclosing_fn(&self, id: StmtId) -> Option<FnId> {
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        self.body_owner.get(&current).copied()
    }

    /// Nearest strict ancestor that is a `Block`.
    pub fn enclosing_block(&self, id: StmtId) -> Option<StmtId> {
        let mut current = self.parent(id)?;
        loop {
            if matches!(self.kind(current), StmtKind::Block { .. }) {
                return Some(current);
            }
            current = self.parent(current)?;
        }
    }

    /// True when `ancestor` is `id` or one of its ancestors.
    pub fn is_within(&self, id: StmtId, ancestor: StmtId) -> bool {
        let mut current = Some(id);
        while let Some(stmt) = current {
            if stmt == ancestor {
                return true;
            }
            current = self.parent(stmt);
        }
        false
    }

    /// Body of a `Block` statement; empty for anything else.
    pub fn block_body(&self, block: StmtId) -> &[StmtId] {
        match self.kind(block) {
            StmtKind::Block { body, .. } => body,
            _ => &[],
        }
    }

    pub fn set_block_info(&mut self, block: StmtId, new_info: Option<BlockInfo>) {
        if let StmtKind::Block { info, .. } = self.kind_mut(block) {
            *info = new_info;
        }
    }

    /// Preorder walk of the subtree rooted at `root`, root included.
    pub fn walk(&self, root: StmtId) -> Vec<StmtId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            out.push(id);
            let children = self.kind(id).children();
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Every statement of a function body in preorder.
    pub fn fn_stmts(&self, func: FnId) -> Vec<StmtId> {
        self.walk(self.func(func).body)
    }

    fn position_in_parent(&self, id: StmtId) -> Result<(StmtId, usize), IrError> {
        let parent = self.parent(id).ok_or(IrError::Detached(id))?;
        match self.kind(parent) {
            StmtKind::Block { body, .. } => body
                .iter()
                .position(|&s| s == id)
                .map(|pos| (parent, pos))
                .ok_or(IrError::Detached(id)),
            _ => Err(IrError::BranchRemoval(id)),
        }
    }

    pub fn next_sibling(&self, id: StmtId) -> Option<StmtId> {
        let (parent, pos) = self.position_in_parent(id).ok()?;
        self.block_body(parent).get(pos + 1).copied()
    }

    pub fn prev_sibling(&self, id: StmtId) -> Option<StmtId> {
        let (parent, pos) = self.position_in_parent(id).ok()?;
        pos.checked_sub(1)
            .and_then(|p| self.block_body(parent).get(p).copied())
    }

    fn body_mut(&mut self, block: StmtId) -> Result<&mut Vec<StmtId>, IrError> {
        match self.kind_mut(block) {
            StmtKind::Block { body, .. } => Ok(body),
            _ => Err(IrError::NotABlock(block)),
        }
    }

    fn insert_at(&mut self, block: StmtId, pos: usize, new: StmtId) -> Result<(), IrError> {
        self.detach(new)?;
        self.body_mut(block)?.insert(pos, new);
        self.stmts[new.index()].parent = Some(block);
        Ok(())
    }

    /// Unlink from the current parent if there is one.
    fn detach(&mut self, id: StmtId) -> Result<(), IrError> {
        if self.parent(id).is_none() {
            return Ok(());
        }
        let (parent, pos) = self.position_in_parent(id)?;
        self.body_mut(parent)?.remove(pos);
        self.stmts[id.index()].parent = None;
        Ok(())
    }

    /// Insert `new` immediately before `anchor`, moving it if attached.
    pub fn insert_before(&mut self, anchor: StmtId, new: StmtId) -> Result<(), IrError> {
        self.detach(new)?;
        let (parent, pos) = self.position_in_parent(anchor)?;
        self.insert_at(parent, pos, new)
    }

    /// Insert `new` immediately after `anchor`, moving it if attached.
    pub fn insert_after(&mut self, anchor: StmtId, new: StmtId) -> Result<(), IrError> {
        self.detach(new)?;
        let (parent, pos) = self.position_in_parent(anchor)?;
        self.insert_at(parent, pos + 1, new)
    }

    pub fn insert_at_head(&mut self, block: StmtId, new: StmtId) -> Result<(), IrError> {
        self.detach(new)?;
        self.insert_at(block, 0, new)
    }

    pub fn insert_at_tail(&mut self, block: StmtId, new: StmtId) -> Result<(), IrError> {
        self.detach(new)?;
        let len = self.block_body(block).len();
        self.insert_at(block, len, new)
    }

    /// Allocate and append in one step.
    pub fn push(&mut self, block: StmtId, kind: StmtKind, span: Span) -> Result<StmtId, IrError> {
        let id = self.new_stmt(kind, span);
        self.insert_at_tail(block, id)?;
        Ok(id)
    }

    /// Detach `id` from its enclosing block.
    pub fn remove(&mut self, id: StmtId) -> Result<(), IrError> {
        let (parent, pos) = self.position_in_parent(id)?;
        self.body_mut(parent)?.remove(pos);
        self.stmts[id.index()].parent = None;
        Ok(())
    }

    /// Put `new` where `old` is. Works for block members, conditional
    /// branches, and function bodies.
    pub fn replace(&mut self, old: StmtId, new: StmtId) -> Result<(), IrError> {
        self.detach(new)?;
        match self.parent(old) {
            Some(parent) => {
                match self.kind_mut(parent) {
                    StmtKind::Block { body, .. } => {
                        let slot = body
                            .iter_mut()
                            .find(|s| **s == old)
                            .ok_or(IrError::Detached(old))?;
                        *slot = new;
                    }
                    StmtKind::Cond {
                        then_block,
                        else_block,
                        ..
                    } => {
                        if *then_block == old {
                            *then_block = new;
                        } else if *else_block == Some(old) {
                            *else_block = Some(new);
                        } else {
                            return Err(IrError::Detached(old));
                        }
                    }
                    _ => return Err(IrError::Detached(old)),
                }
                self.stmts[new.index()].parent = Some(parent);
                self.stmts[old.index()].parent = None;
            }
            None => {
                let func = self.body_owner.remove(&old).ok_or(IrError::Detached(old))?;
                self.body_owner.insert(new, func);
                self.func_mut(func).body = new;
            }
        }
        Ok(())
    }

    /// Detach and return every statement of a block body.
    pub fn take_body(&mut self, block: StmtId) -> Result<Vec<StmtId>, IrError> {
        let body = std::mem::take(self.body_mut(block)?);
        for &stmt in &body {
            self.stmts[stmt.index()].parent = None;
        }
        Ok(body)
    }

    pub(crate) fn set_parent(&mut self, id: StmtId, parent: Option<StmtId>) {
        self.stmts[id.index()].parent = parent;
    }

    /// Move the body of `scratch` in front of `anchor`, keeping order.
    pub fn splice_before(&mut self, anchor: StmtId, scratch: StmtId) -> Result<(), IrError> {
        for stmt in self.take_body(scratch)? {
            self.insert_before(anchor, stmt)?;
        }
        Ok(())
    }

    /// Move the body of `scratch` right after `anchor`, keeping order.
    pub fn splice_after(&mut self, anchor: StmtId, scratch: StmtId) -> Result<(), IrError> {
        let mut at = anchor;
        for stmt in self.take_body(scratch)? {
            self.insert_after(at, stmt)?;
            at = stmt;
        }
        Ok(())
    }

    /// Move the body of `scratch` to the head of `block`, keeping order.
    pub fn splice_at_head(&mut self, block: StmtId, scratch: StmtId) -> Result<(), IrError> {
        for (pos, stmt) in self.take_body(scratch)?.into_iter().enumerate() {
            self.insert_at(block, pos, stmt)?;
        }
        Ok(())
    }

    /// Move the body of `scratch` to the tail of `block`, keeping order.
    pub fn splice_at_tail(&mut self, block: StmtId, scratch: StmtId) -> Result<(), IrError> {
        for stmt in self.take_body(scratch)? {
            self.insert_at_tail(block, stmt)?;
        }
        Ok(())
    }

    /// Set the owner of every symbol defined inside `root` to `func`.
    pub fn claim_locals(&mut self, func: FnId, root: StmtId) {
        for id in self.walk(root) {
            if let StmtKind::Def(sym) = *self.kind(id) {
                self.syms[sym.index()].owner = Some(func);
            }
        }
    }

    /// `Def` statement of `sym` inside `root`.
    pub fn find_def(&self, root: StmtId, sym: SymId) -> Option<StmtId> {
        self.walk(root)
            .into_iter()
            .find(|&id| matches!(self.kind(id), StmtKind::Def(s) if *s == sym))
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}

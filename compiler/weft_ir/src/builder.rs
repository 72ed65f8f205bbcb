//! Cursor-based statement builder.
//!
//! Appends statements to the tail of the block it is positioned at.
//! Nested blocks and conditionals are emitted empty; the caller then
//! repositions into them. Lowering code fills a detached scratch block and
//! splices it into place; fixtures build whole functions.

use crate::{
    BlockInfo, Expr, FieldRef, FnFlags, FnId, Operand, Program, Span, StmtId, StmtKind, SymId,
    SymKind, TypeId,
};

pub struct IrBuilder<'p> {
    program: &'p mut Program,
    func: FnId,
    current: StmtId,
    span: Span,
}

impl<'p> IrBuilder<'p> {
    /// Create a new function and position at its body.
    pub fn new_fn(program: &'p mut Program, name: &str, ret_type: TypeId) -> Self {
        let func = program.new_fn(name, ret_type, Span::DUMMY);
        Self::for_fn(program, func)
    }

    /// Position at the tail of an existing function body.
    pub fn for_fn(program: &'p mut Program, func: FnId) -> Self {
        let current = program.func(func).body;
        IrBuilder {
            program,
            func,
            current,
            span: Span::DUMMY,
        }
    }

    /// Position at `block`; new locals are owned by `func`.
    pub fn at_block(program: &'p mut Program, func: FnId, block: StmtId) -> Self {
        IrBuilder {
            program,
            func,
            current: block,
            span: Span::DUMMY,
        }
    }

    /// Span stamped on every emitted statement.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    #[inline]
    pub fn program(&mut self) -> &mut Program {
        self.program
    }

    #[inline]
    pub fn func(&self) -> FnId {
        self.func
    }

    #[inline]
    pub fn body(&self) -> StmtId {
        self.program.func(self.func).body
    }

    #[inline]
    pub fn current_block(&self) -> StmtId {
        self.current
    }

    pub fn position_at(&mut self, block: StmtId) {
        self.current = block;
    }

    pub fn set_flags(&mut self, flags: FnFlags) {
        self.program.func_mut(self.func).flags |= flags;
    }

    pub fn add_formal(&mut self, name: &str, ty: TypeId) -> SymId {
        self.program.add_formal(self.func, name, ty)
    }

    /// New local plus its `Def` at the cursor.
    pub fn fresh_var(&mut self, name: &str, ty: TypeId) -> SymId {
        let sym = self.program.new_local(self.func, name, ty);
        self.emit_def(sym);
        sym
    }

    /// New label symbol; place it with [`Self::emit_label`].
    pub fn new_label(&mut self, name: &str) -> SymId {
        let sym = self.program.new_sym(name, SymKind::Label, TypeId::VOID);
        self.program.sym_mut(sym).owner = Some(self.func);
        sym
    }

    pub fn emit(&mut self, kind: StmtKind) -> StmtId {
        let id = self.program.new_stmt(kind, self.span);
        self.program.append_unchecked(self.current, id);
        id
    }

    pub fn emit_def(&mut self, sym: SymId) -> StmtId {
        self.emit(StmtKind::Def(sym))
    }

    pub fn emit_label(&mut self, label: SymId) -> StmtId {
        self.emit(StmtKind::Def(label))
    }

    pub fn emit_assign(&mut self, dst: SymId, value: Expr) -> StmtId {
        self.emit(StmtKind::Assign { dst, value })
    }

    pub fn emit_eval(&mut self, value: Expr) -> StmtId {
        self.emit(StmtKind::Eval(value))
    }

    pub fn emit_call(&mut self, callee: FnId, args: impl IntoIterator<Item = Operand>) -> StmtId {
        self.emit_eval(Expr::call(callee, args))
    }

    pub fn emit_store(&mut self, ptr: SymId, value: Operand) -> StmtId {
        self.emit(StmtKind::Store { ptr, value })
    }

    pub fn emit_set_member(&mut self, base: SymId, field: FieldRef, value: Operand) -> StmtId {
        self.emit(StmtKind::SetMember { base, field, value })
    }

    pub fn emit_yield(&mut self, value: Operand) -> StmtId {
        self.emit(StmtKind::Yield(value))
    }

    pub fn emit_return(&mut self, value: Operand) -> StmtId {
        self.emit(StmtKind::Return(value))
    }

    pub fn emit_goto(&mut self, label: SymId) -> StmtId {
        self.emit(StmtKind::Goto(label))
    }

    pub fn emit_runtime_error(&mut self, message: &str) -> StmtId {
        let message = self.program.intern(message);
        self.emit(StmtKind::RuntimeError(message))
    }

    /// Emit an empty block; reposition into it to fill it.
    pub fn emit_block(&mut self, info: Option<BlockInfo>) -> StmtId {
        self.emit(StmtKind::Block {
            info,
            body: Vec::new(),
        })
    }

    pub fn emit_for_loop(&mut self, index: SymId, iterator: SymId) -> StmtId {
        self.emit_block(Some(BlockInfo::for_loop(index, iterator)))
    }

    /// Emit a conditional with empty branches; returns `(then, else)`.
    pub fn emit_cond(&mut self, cond: Operand, with_else: bool) -> (StmtId, Option<StmtId>) {
        let span = self.span;
        let then_block = self.program.new_stmt(StmtKind::block(Vec::new()), span);
        let else_block = with_else.then(|| self.program.new_stmt(StmtKind::block(Vec::new()), span));
        self.emit(StmtKind::Cond {
            cond,
            then_block,
            else_block,
        });
        (then_block, else_block)
    }

    pub fn finish(self) -> FnId {
        self.func
    }
}

impl Program {
    /// Append to a block known to be a `Block`; no-op otherwise.
    pub(crate) fn append_unchecked(&mut self, block: StmtId, stmt: StmtId) {
        let appended = if let StmtKind::Block { body, .. } = self.kind_mut(block) {
            body.push(stmt);
            true
        } else {
            false
        };
        if appended {
            self.set_parent(stmt, Some(block));
        }
    }

    /// Detached empty block.
    pub fn new_scratch_block(&mut self) -> StmtId {
        self.new_stmt(StmtKind::block(Vec::new()), Span::DUMMY)
    }
}

//! Statements, expressions, and operands.
//!
//! Statements live in the [`Program`](crate::Program) arena and link to
//! their parent, so any statement can be detached, re-inserted, or replaced
//! in place. Expressions are owned inline by their statement: every
//! expression is a single operation over operands, which keeps bodies in the
//! flat three-address shape the lowering pass rewrites.

use smallvec::SmallVec;

use crate::{FnId, Name, Span, StmtId, SymId, TypeId};

/// Literal constant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Lit {
    Int(i64),
    Bool(bool),
    Str(Name),
    Void,
}

/// Leaf value: a symbol or a constant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Sym(SymId),
    Const(Lit),
}

impl Operand {
    pub const VOID: Operand = Operand::Const(Lit::Void);
    pub const TRUE: Operand = Operand::Const(Lit::Bool(true));
    pub const FALSE: Operand = Operand::Const(Lit::Bool(false));

    #[inline]
    pub fn int(value: i64) -> Operand {
        Operand::Const(Lit::Int(value))
    }

    #[inline]
    pub fn as_sym(self) -> Option<SymId> {
        match self {
            Operand::Sym(sym) => Some(sym),
            Operand::Const(_) => None,
        }
    }
}

impl From<SymId> for Operand {
    fn from(sym: SymId) -> Self {
        Operand::Sym(sym)
    }
}

/// Field selector of a member access.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldRef {
    /// 1-based ordinal among the fields that follow the type's header
    /// fields. Produced while the concrete layout is still pending and
    /// resolved to [`FieldRef::Index`] by the field-access fixup.
    Ordinal(u32),
    /// Absolute index into the type's field list.
    Index(u32),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PrimOp {
    Add,
    Sub,
    Mul,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
    Not,
}

impl PrimOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            PrimOp::Lt | PrimOp::Le | PrimOp::Gt | PrimOp::Ge | PrimOp::Eq | PrimOp::Ne
        )
    }
}

/// Right-hand side of an assignment or the payload of an expression
/// statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Use(Operand),
    Prim {
        op: PrimOp,
        args: SmallVec<[Operand; 2]>,
    },
    /// Direct call.
    Call {
        callee: FnId,
        args: SmallVec<[Operand; 4]>,
    },
    /// Indirect call through a function-table slot.
    FtableCall {
        slot: Operand,
        args: SmallVec<[Operand; 4]>,
    },
    /// Address of a field.
    GetMember { base: SymId, field: FieldRef },
    /// Value of a field.
    GetMemberValue { base: SymId, field: FieldRef },
    Cast { ty: TypeId, value: Operand },
    /// True when the runtime class of `value` is exactly `class`.
    GetCid { value: SymId, class: TypeId },
    /// Address of a local.
    AddrOf(SymId),
    /// Value behind a reference.
    Deref(SymId),
}

impl Expr {
    #[inline]
    pub fn sym(sym: SymId) -> Expr {
        Expr::Use(Operand::Sym(sym))
    }

    pub fn call(callee: FnId, args: impl IntoIterator<Item = Operand>) -> Expr {
        Expr::Call {
            callee,
            args: args.into_iter().collect(),
        }
    }

    pub fn prim(op: PrimOp, args: impl IntoIterator<Item = Operand>) -> Expr {
        Expr::Prim {
            op,
            args: args.into_iter().collect(),
        }
    }

    /// Expressions whose evaluation has no observable effect.
    pub fn is_pure(&self) -> bool {
        !matches!(self, Expr::Call { .. } | Expr::FtableCall { .. } | Expr::Deref(_))
    }
}

/// Parallel block flavors. They only matter to the serial-iterator check.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParallelKind {
    Begin,
    Cobegin,
    Coforall,
}

/// Marker that turns a plain block into a loop or a restricted region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockInfo {
    /// `for index in iterator`. Well-formed headers carry exactly two
    /// symbol operands: the index and the iterator instance.
    ForLoop(SmallVec<[Operand; 2]>),
    /// Runs the body while `cond` is true, testing before each iteration.
    CondLoop { cond: Operand },
    /// Restricted-execution region that must not span a suspension point.
    Local,
    Parallel(ParallelKind),
    On { non_blocking: bool },
}

impl BlockInfo {
    pub fn for_loop(index: SymId, iterator: SymId) -> BlockInfo {
        BlockInfo::ForLoop(SmallVec::from_buf([
            Operand::Sym(index),
            Operand::Sym(iterator),
        ]))
    }

    /// `(index, iterator)` of a well-formed for-loop header.
    pub fn for_loop_header(&self) -> Option<(SymId, SymId)> {
        match self {
            BlockInfo::ForLoop(ops) => match ops.as_slice() {
                [Operand::Sym(index), Operand::Sym(iterator)] => Some((*index, *iterator)),
                _ => None,
            },
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StmtKind {
    /// Declares a local or places a label.
    Def(SymId),
    Assign {
        dst: SymId,
        value: Expr,
    },
    /// Write through a reference.
    Store {
        ptr: SymId,
        value: Operand,
    },
    SetMember {
        base: SymId,
        field: FieldRef,
        value: Operand,
    },
    /// Expression evaluated for its effect.
    Eval(Expr),
    Yield(Operand),
    Return(Operand),
    Goto(SymId),
    /// Both branches are `Block` statements owned by the conditional.
    Cond {
        cond: Operand,
        then_block: StmtId,
        else_block: Option<StmtId>,
    },
    Block {
        info: Option<BlockInfo>,
        body: Vec<StmtId>,
    },
    /// Aborts execution with a fixed message.
    RuntimeError(Name),
    Noop,
}

impl StmtKind {
    pub fn block(body: Vec<StmtId>) -> StmtKind {
        StmtKind::Block { info: None, body }
    }

    /// Direct child statements, in execution order.
    pub fn children(&self) -> SmallVec<[StmtId; 4]> {
        match self {
            StmtKind::Block { body, .. } => body.iter().copied().collect(),
            StmtKind::Cond {
                then_block,
                else_block,
                ..
            } => {
                let mut out = SmallVec::new();
                out.push(*then_block);
                out.extend(*else_block);
                out
            }
            _ => SmallVec::new(),
        }
    }

    #[inline]
    pub fn is_yield(&self) -> bool {
        matches!(self, StmtKind::Yield(_))
    }

    #[inline]
    pub fn is_return(&self) -> bool {
        matches!(self, StmtKind::Return(_))
    }

    pub fn block_info(&self) -> Option<&BlockInfo> {
        match self {
            StmtKind::Block { info, .. } => info.as_ref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// Enclosing block or conditional. `None` for function bodies and
    /// detached statements.
    pub parent: Option<StmtId>,
    pub span: Span,
}

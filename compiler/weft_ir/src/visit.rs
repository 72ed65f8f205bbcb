//! Symbol reference visitors.
//!
//! Statement-level visitors only look at a statement's own operands, not at
//! nested statements. Use [`Program::walk`] to cover a subtree.

use rustc_hash::FxHashSet;

use crate::{BlockInfo, Expr, Operand, Program, StmtId, StmtKind, SymId};

fn visit_operand(op: &Operand, f: &mut impl FnMut(SymId)) {
    if let Operand::Sym(sym) = op {
        f(*sym);
    }
}

fn rewrite_operand(op: &mut Operand, f: &mut impl FnMut(SymId) -> SymId) {
    if let Operand::Sym(sym) = op {
        *sym = f(*sym);
    }
}

impl Expr {
    /// Every symbol the expression mentions.
    pub fn for_each_sym(&self, f: &mut impl FnMut(SymId)) {
        match self {
            Expr::Use(op) | Expr::Cast { value: op, .. } => visit_operand(op, f),
            Expr::Prim { args, .. } => args.iter().for_each(|a| visit_operand(a, f)),
            Expr::Call { args, .. } => args.iter().for_each(|a| visit_operand(a, f)),
            Expr::FtableCall { slot, args } => {
                visit_operand(slot, f);
                args.iter().for_each(|a| visit_operand(a, f));
            }
            Expr::GetMember { base, .. } | Expr::GetMemberValue { base, .. } => f(*base),
            Expr::GetCid { value, .. } => f(*value),
            Expr::AddrOf(sym) | Expr::Deref(sym) => f(*sym),
        }
    }

    pub fn rewrite_syms(&mut self, f: &mut impl FnMut(SymId) -> SymId) {
        match self {
            Expr::Use(op) | Expr::Cast { value: op, .. } => rewrite_operand(op, f),
            Expr::Prim { args, .. } => args.iter_mut().for_each(|a| rewrite_operand(a, f)),
            Expr::Call { args, .. } => args.iter_mut().for_each(|a| rewrite_operand(a, f)),
            Expr::FtableCall { slot, args } => {
                rewrite_operand(slot, f);
                args.iter_mut().for_each(|a| rewrite_operand(a, f));
            }
            Expr::GetMember { base, .. } | Expr::GetMemberValue { base, .. } => *base = f(*base),
            Expr::GetCid { value, .. } => *value = f(*value),
            Expr::AddrOf(sym) | Expr::Deref(sym) => *sym = f(*sym),
        }
    }
}

impl StmtKind {
    /// Symbols this statement reads, including block-header operands.
    pub fn for_each_read(&self, f: &mut impl FnMut(SymId)) {
        match self {
            StmtKind::Def(_) | StmtKind::Goto(_) | StmtKind::RuntimeError(_) | StmtKind::Noop => {}
            StmtKind::Assign { value, .. } | StmtKind::Eval(value) => value.for_each_sym(f),
            StmtKind::Store { ptr, value } => {
                f(*ptr);
                visit_operand(value, f);
            }
            StmtKind::SetMember { base, value, .. } => {
                f(*base);
                visit_operand(value, f);
            }
            StmtKind::Yield(op) | StmtKind::Return(op) | StmtKind::Cond { cond: op, .. } => {
                visit_operand(op, f);
            }
            StmtKind::Block { info, .. } => match info {
                Some(BlockInfo::ForLoop(ops)) => ops.iter().for_each(|o| visit_operand(o, f)),
                Some(BlockInfo::CondLoop { cond }) => visit_operand(cond, f),
                _ => {}
            },
        }
    }

    /// Local overwritten by this statement, if any.
    pub fn written(&self) -> Option<SymId> {
        match self {
            StmtKind::Assign { dst, .. } => Some(*dst),
            _ => None,
        }
    }

    /// Every symbol mentioned by this statement's own operands.
    pub fn for_each_sym(&self, f: &mut impl FnMut(SymId)) {
        match self {
            StmtKind::Def(sym) | StmtKind::Goto(sym) => f(*sym),
            StmtKind::Assign { dst, .. } => f(*dst),
            _ => {}
        }
        self.for_each_read(f);
    }

    pub fn rewrite_syms(&mut self, f: &mut impl FnMut(SymId) -> SymId) {
        match self {
            StmtKind::Def(sym) | StmtKind::Goto(sym) => *sym = f(*sym),
            StmtKind::Assign { dst, value } => {
                *dst = f(*dst);
                value.rewrite_syms(f);
            }
            StmtKind::Eval(value) => value.rewrite_syms(f),
            StmtKind::Store { ptr, value } => {
                *ptr = f(*ptr);
                rewrite_operand(value, f);
            }
            StmtKind::SetMember { base, value, .. } => {
                *base = f(*base);
                rewrite_operand(value, f);
            }
            StmtKind::Yield(op) | StmtKind::Return(op) | StmtKind::Cond { cond: op, .. } => {
                rewrite_operand(op, f);
            }
            StmtKind::Block { info, .. } => match info {
                Some(BlockInfo::ForLoop(ops)) => {
                    ops.iter_mut().for_each(|o| rewrite_operand(o, f));
                }
                Some(BlockInfo::CondLoop { cond }) => rewrite_operand(cond, f),
                _ => {}
            },
            StmtKind::RuntimeError(_) | StmtKind::Noop => {}
        }
    }

    /// True when the statement's own operands mention `sym`.
    pub fn mentions(&self, sym: SymId) -> bool {
        let mut found = false;
        self.for_each_sym(&mut |s| found |= s == sym);
        found
    }
}

impl Program {
    /// Rewrite every symbol reference inside the subtree.
    pub fn rewrite_syms_in(&mut self, root: StmtId, f: &mut impl FnMut(SymId) -> SymId) {
        for id in self.walk(root) {
            self.kind_mut(id).rewrite_syms(f);
        }
    }

    /// Replace `from` with `to` throughout the subtree.
    pub fn substitute(&mut self, root: StmtId, from: SymId, to: SymId) {
        self.rewrite_syms_in(root, &mut |s| if s == from { to } else { s });
    }

    /// Statements inside `root` whose own operands mention `sym`.
    pub fn stmts_mentioning(&self, root: StmtId, sym: SymId) -> Vec<StmtId> {
        self.walk(root)
            .into_iter()
            .filter(|&id| self.kind(id).mentions(sym))
            .collect()
    }

    /// Symbols defined by `Def` statements inside the subtree.
    pub fn defined_syms(&self, root: StmtId) -> FxHashSet<SymId> {
        self.walk(root)
            .into_iter()
            .filter_map(|id| match self.kind(id) {
                StmtKind::Def(sym) => Some(*sym),
                _ => None,
            })
            .collect()
    }

    /// Yield statements inside the subtree.
    pub fn yields_in(&self, root: StmtId) -> Vec<StmtId> {
        self.walk(root)
            .into_iter()
            .filter(|&id| self.kind(id).is_yield())
            .collect()
    }
}

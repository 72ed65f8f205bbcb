//! Human-readable dump of functions, for trace logs and test failures.

use std::fmt::Write;

use crate::{BlockInfo, Expr, FieldRef, FnId, Lit, Operand, ParallelKind, Program, StmtId, StmtKind};

impl Program {
    /// Render a function as indented pseudo-code.
    pub fn dump_fn(&self, func: FnId) -> String {
        let def = self.func(func);
        let mut out = String::new();
        let formals: Vec<String> = def
            .formals
            .iter()
            .map(|&f| {
                format!(
                    "{}: {}",
                    self.sym_name(f),
                    self.name_str(self.ty(self.sym_ty(f)).name)
                )
            })
            .collect();
        let _ = writeln!(
            out,
            "fn {}({}) -> {}",
            self.fn_name(func),
            formals.join(", "),
            self.name_str(self.ty(def.ret_type).name)
        );
        self.dump_stmt(def.body, 0, &mut out);
        out
    }

    fn dump_stmt(&self, id: StmtId, depth: usize, out: &mut String) {
        let pad = "  ".repeat(depth);
        match self.kind(id) {
            StmtKind::Block { info, body } => {
                let header = match info {
                    None => String::new(),
                    Some(BlockInfo::ForLoop(ops)) => {
                        let ops: Vec<String> = ops.iter().map(|o| self.operand_str(*o)).collect();
                        format!("for ({}) ", ops.join(", "))
                    }
                    Some(BlockInfo::CondLoop { cond }) => {
                        format!("while {} ", self.operand_str(*cond))
                    }
                    Some(BlockInfo::Local) => "local ".to_owned(),
                    Some(BlockInfo::Parallel(kind)) => match kind {
                        ParallelKind::Begin => "begin ".to_owned(),
                        ParallelKind::Cobegin => "cobegin ".to_owned(),
                        ParallelKind::Coforall => "coforall ".to_owned(),
                    },
                    Some(BlockInfo::On { non_blocking }) => {
                        if *non_blocking {
                            "on_nb ".to_owned()
                        } else {
                            "on ".to_owned()
                        }
                    }
                };
                let _ = writeln!(out, "{pad}{header}{{");
                for &stmt in body {
                    self.dump_stmt(stmt, depth + 1, out);
                }
                let _ = writeln!(out, "{pad}}}");
            }
            StmtKind::Cond {
                cond,
                then_block,
                else_block,
            } => {
                let _ = writeln!(out, "{pad}if {}", self.operand_str(*cond));
                self.dump_stmt(*then_block, depth, out);
                if let Some(else_block) = else_block {
                    let _ = writeln!(out, "{pad}else");
                    self.dump_stmt(*else_block, depth, out);
                }
            }
            kind => {
                let _ = writeln!(out, "{pad}{}", self.simple_stmt_str(kind));
            }
        }
    }

    fn simple_stmt_str(&self, kind: &StmtKind) -> String {
        match kind {
            StmtKind::Def(sym) => {
                if self.sym(*sym).is_label() {
                    format!("{}:", self.sym_name(*sym))
                } else {
                    format!(
                        "def {}: {}",
                        self.sym_name(*sym),
                        self.name_str(self.ty(self.sym_ty(*sym)).name)
                    )
                }
            }
            StmtKind::Assign { dst, value } => {
                format!("{} = {}", self.sym_name(*dst), self.expr_str(value))
            }
            StmtKind::Store { ptr, value } => {
                format!("*{} = {}", self.sym_name(*ptr), self.operand_str(*value))
            }
            StmtKind::SetMember { base, field, value } => format!(
                "{}.{} = {}",
                self.sym_name(*base),
                field_str(*field),
                self.operand_str(*value)
            ),
            StmtKind::Eval(expr) => self.expr_str(expr),
            StmtKind::Yield(op) => format!("yield {}", self.operand_str(*op)),
            StmtKind::Return(op) => format!("return {}", self.operand_str(*op)),
            StmtKind::Goto(label) => format!("goto {}", self.sym_name(*label)),
            StmtKind::RuntimeError(msg) => format!("runtime_error {:?}", self.name_str(*msg)),
            StmtKind::Noop => "noop".to_owned(),
            StmtKind::Block { .. } | StmtKind::Cond { .. } => String::new(),
        }
    }

    fn operand_str(&self, op: Operand) -> String {
        match op {
            Operand::Sym(sym) => self.sym_name(sym).to_owned(),
            Operand::Const(Lit::Int(v)) => v.to_string(),
            Operand::Const(Lit::Bool(b)) => b.to_string(),
            Operand::Const(Lit::Str(s)) => format!("{:?}", self.name_str(s)),
            Operand::Const(Lit::Void) => "void".to_owned(),
        }
    }

    fn expr_str(&self, expr: &Expr) -> String {
        let list = |ops: &[Operand]| -> String {
            ops.iter()
                .map(|o| self.operand_str(*o))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match expr {
            Expr::Use(op) => self.operand_str(*op),
            Expr::Prim { op, args } => format!("{op:?}({})", list(args)),
            Expr::Call { callee, args } => format!("{}({})", self.fn_name(*callee), list(args)),
            Expr::FtableCall { slot, args } => {
                format!("ftable[{}]({})", self.operand_str(*slot), list(args))
            }
            Expr::GetMember { base, field } => {
                format!("&{}.{}", self.sym_name(*base), field_str(*field))
            }
            Expr::GetMemberValue { base, field } => {
                format!("{}.{}", self.sym_name(*base), field_str(*field))
            }
            Expr::Cast { ty, value } => format!(
                "cast<{}>({})",
                self.name_str(self.ty(*ty).name),
                self.operand_str(*value)
            ),
            Expr::GetCid { value, class } => format!(
                "is<{}>({})",
                self.name_str(self.ty(*class).name),
                self.sym_name(*value)
            ),
            Expr::AddrOf(sym) => format!("&{}", self.sym_name(*sym)),
            Expr::Deref(sym) => format!("*{}", self.sym_name(*sym)),
        }
    }
}

fn field_str(field: FieldRef) -> String {
    match field {
        FieldRef::Ordinal(n) => format!("#{n}"),
        FieldRef::Index(i) => format!("{i}"),
    }
}

//! Ordinal field accesses become concrete field accesses.
//!
//! Formals of an inlined iterator are read from the instance by ordinal.
//! Once lowering is done every ordinal is resolved against the instance
//! type, and an address read whose destination holds the field by value is
//! narrowed to a value read.

use weft_ir::{Expr, FieldRef, Program, Span, StmtId, StmtKind, SymId, TypeId};

use crate::error::internal;
use crate::LowerResult;

/// Rewrite every ordinal access in the program. Returns the count.
pub fn normalize_field_accesses(program: &mut Program) -> LowerResult<usize> {
    let mut count = 0;
    let stmts: Vec<StmtId> = program.fn_ids().flat_map(|f| program.fn_stmts(f)).collect();
    for stmt in stmts {
        let span = program.span(stmt);
        let rewritten = match program.kind(stmt) {
            StmtKind::Assign {
                dst,
                value:
                    Expr::GetMember {
                        base,
                        field: FieldRef::Ordinal(n),
                    },
            } => Some(narrow(program, *dst, *base, *n, span)?),
            StmtKind::Assign {
                dst,
                value:
                    Expr::GetMemberValue {
                        base,
                        field: FieldRef::Ordinal(n),
                    },
            } => {
                let (dst, base) = (*dst, *base);
                let (index, _) = resolve(program, base, *n, span)?;
                Some(StmtKind::Assign {
                    dst,
                    value: Expr::GetMemberValue {
                        base,
                        field: FieldRef::Index(index),
                    },
                })
            }
            StmtKind::SetMember {
                base,
                field: FieldRef::Ordinal(n),
                value,
            } => {
                let (base, value) = (*base, *value);
                let (index, _) = resolve(program, base, *n, span)?;
                Some(StmtKind::SetMember {
                    base,
                    field: FieldRef::Index(index),
                    value,
                })
            }
            StmtKind::Eval(Expr::GetMember {
                field: FieldRef::Ordinal(_),
                ..
            }) => return Err(internal("ordinal field address outside an assignment", span)),
            _ => None,
        };
        if let Some(kind) = rewritten {
            *program.kind_mut(stmt) = kind;
            count += 1;
        }
    }
    Ok(count)
}

/// Field index and type of ordinal `n` of `base`'s type.
fn resolve(program: &Program, base: SymId, n: u32, span: Span) -> LowerResult<(u32, TypeId)> {
    let ty = program.ty(program.value_type(program.sym_ty(base)));
    ty.ordinal_field(n)
        .and_then(|index| ty.field(index).map(|f| (index, f.ty)))
        .ok_or_else(|| {
            internal(
                format!(
                    "type `{}` has no field for ordinal {n}",
                    program.name_str(ty.name)
                ),
                span,
            )
        })
}

/// `dst = &base.<n>` as a value read when `dst` holds the field type, or
/// an address read when it holds a reference to it.
fn narrow(program: &Program, dst: SymId, base: SymId, n: u32, span: Span) -> LowerResult<StmtKind> {
    let (index, field_ty) = resolve(program, base, n, span)?;
    let field = FieldRef::Index(index);
    let dst_ty = program.sym_ty(dst);
    let value = if dst_ty == field_ty {
        Expr::GetMemberValue { base, field }
    } else if program.ty(field_ty).ref_type == Some(dst_ty) {
        Expr::GetMember { base, field }
    } else {
        return Err(internal("unexpected case", span));
    };
    Ok(StmtKind::Assign { dst, value })
}

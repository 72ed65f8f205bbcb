//! Argument rewrite inside leader/follower dispatch helpers.
//!
//! After lowering, a helper may still call an iterator with formals that
//! belong to the iterator it was cloned from. Those values live in the
//! helper's own iterator parameter, one field per formal after the header.

use weft_ir::{
    Expr, FieldRef, FnFlags, FnId, Operand, Program, StmtId, StmtKind, SymFlags, SymId, SymKind,
    TypeFlags, TypeId,
};

use crate::call_graph::direct_callee;
use crate::error::internal;
use crate::LowerResult;

/// Callee returns an iterator record directly or through a trailing
/// out-parameter.
fn returns_iterator_record(program: &Program, callee: FnId) -> bool {
    let def = program.func(callee);
    let is_record = |ty: TypeId| {
        program
            .ty(program.value_type(ty))
            .flags
            .contains(TypeFlags::ITERATOR_RECORD)
    };
    is_record(def.ret_type)
        || def.formals.last().is_some_and(|&last| {
            program.sym(last).flags.contains(SymFlags::RET_ARG) && is_record(program.sym_ty(last))
        })
}

/// Rewrite foreign formals in every dispatch helper. Returns the number of
/// replaced actuals.
pub fn rewrite_dispatch_helper_args(program: &mut Program) -> LowerResult<usize> {
    let helpers: Vec<FnId> = program
        .fn_ids()
        .filter(|&f| {
            program
                .func(f)
                .flags
                .intersects(FnFlags::TO_LEADER | FnFlags::TO_FOLLOWER)
        })
        .collect();
    let mut count = 0;
    for helper in helpers {
        let Some(iterator) = program.func(helper).formal(0) else {
            continue;
        };
        let calls: Vec<StmtId> = program
            .fn_stmts(helper)
            .into_iter()
            .filter(|&s| {
                direct_callee(program.kind(s)).is_some_and(|c| returns_iterator_record(program, c))
            })
            .collect();
        for call in calls {
            count += rewrite_call(program, helper, iterator, call)?;
        }
    }
    Ok(count)
}

fn rewrite_call(
    program: &mut Program,
    helper: FnId,
    iterator: SymId,
    call: StmtId,
) -> LowerResult<usize> {
    let span = program.span(call);
    let args = match program.kind(call) {
        StmtKind::Assign {
            value: Expr::Call { args, .. },
            ..
        }
        | StmtKind::Eval(Expr::Call { args, .. }) => args.clone(),
        _ => return Ok(0),
    };
    let iterator_ty = program.value_type(program.sym_ty(iterator));
    let mut next_field = program.ty(iterator_ty).header_fields;
    let mut replaced = Vec::new();
    for (pos, actual) in args.iter().enumerate() {
        let Some(sym) = actual.as_sym() else {
            continue;
        };
        let foreign = program.sym(sym).kind == SymKind::Arg && program.sym(sym).owner != Some(helper);
        if !foreign {
            continue;
        }
        let field = program
            .ty(iterator_ty)
            .field(next_field)
            .copied()
            .ok_or_else(|| internal("dispatch helper iterator has too few fields", span))?;
        let actual_ty = program.sym_ty(sym);
        let index = FieldRef::Index(next_field);
        let (tmp, value) = if field.ty == actual_ty {
            let tmp = program.new_local(helper, "_field", field.ty);
            (tmp, Expr::GetMemberValue { base: iterator, field: index })
        } else if program.ty(field.ty).ref_type == Some(actual_ty) {
            let tmp = program.new_local(helper, "_field", actual_ty);
            (tmp, Expr::GetMember { base: iterator, field: index })
        } else {
            return Err(internal(
                format!(
                    "formal `{}` does not match its iterator field",
                    program.sym_name(sym)
                ),
                span,
            ));
        };
        let def = program.new_stmt(StmtKind::Def(tmp), span);
        program.insert_before(call, def)?;
        let read = program.new_stmt(StmtKind::Assign { dst: tmp, value }, span);
        program.insert_before(call, read)?;
        replaced.push((pos, tmp));
        next_field += 1;
    }
    if let StmtKind::Assign {
        value: Expr::Call { args, .. },
        ..
    }
    | StmtKind::Eval(Expr::Call { args, .. }) = program.kind_mut(call)
    {
        for &(pos, tmp) in &replaced {
            args[pos] = Operand::Sym(tmp);
        }
    }
    Ok(replaced.len())
}

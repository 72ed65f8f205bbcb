//! Direct inline expansion of single-path iterators.
//!
//! The loop is replaced by a copy of the iterator body in which every
//! yield is replaced by a copy of the loop body:
//!
//! ```text
//! for x in ic { use(x); }            { var lo = ic.lo; var i = lo;
//!                              =>      while .. { var _y = i; use(_y); .. } }
//! ```
//!
//! Recursive iterators cannot be copied into themselves without bound, so
//! they are routed to CPS lowering, or left alone when the loop itself sits
//! inside a recursive iterator.

use weft_ir::{
    Expr, FieldRef, FnId, Operand, Program, StmtId, StmtKind, SymId, SymKind, SymbolMap,
};

use crate::dispatch::{loop_header, LoweringStrategy};
use crate::error::internal;
use crate::{cps, LowerCtx, LowerResult};

/// Which inline-family strategy applies to `loop_block`.
pub(crate) fn inline_strategy(
    program: &Program,
    ctx: &LowerCtx,
    loop_block: StmtId,
) -> LowerResult<LoweringStrategy> {
    let (_, ic) = loop_header(program, loop_block)?;
    let span = program.span(loop_block);
    let iter_fn = program
        .iterator_fn_of(program.sym_ty(ic))
        .ok_or_else(|| internal("inlined loop does not iterate an iterator instance", span))?;
    let caller = program
        .enclosing_fn(loop_block)
        .ok_or_else(|| internal("for-loop outside any function", span))?;
    Ok(if !ctx.is_recursive(iter_fn) {
        LoweringStrategy::DirectInline
    } else if ctx.is_recursive(caller) {
        LoweringStrategy::Skip
    } else {
        LoweringStrategy::RecursiveCps
    })
}

/// Inline the iterator of `loop_block` at the loop, or hand it to CPS
/// lowering when the iterator is recursive. Returns what was done.
pub fn expand_iterator_inline(
    program: &mut Program,
    ctx: &mut LowerCtx,
    loop_block: StmtId,
) -> LowerResult<LoweringStrategy> {
    let strategy = inline_strategy(program, ctx, loop_block)?;
    match strategy {
        LoweringStrategy::DirectInline => inline_direct(program, loop_block)?,
        LoweringStrategy::RecursiveCps => cps::lower_recursive_loop(program, ctx, loop_block)?,
        LoweringStrategy::Skip => {
            tracing::debug!(?loop_block, "loop over recursive iterator left in recursive iterator");
        }
        LoweringStrategy::ZipFusion | LoweringStrategy::Protocol => {}
    }
    Ok(strategy)
}

fn inline_direct(program: &mut Program, loop_block: StmtId) -> LowerResult<()> {
    let (index, ic) = loop_header(program, loop_block)?;
    let span = program.span(loop_block);
    let iter_fn = program
        .iterator_fn_of(program.sym_ty(ic))
        .ok_or_else(|| internal("inlined loop does not iterate an iterator instance", span))?;
    let caller = program
        .enclosing_fn(loop_block)
        .ok_or_else(|| internal("for-loop outside any function", span))?;

    program.set_block_info(loop_block, None);
    let mut map = SymbolMap::new();
    let ibody = program.copy_tree(program.func(iter_fn).body, &mut map);
    program.replace(loop_block, ibody)?;

    let returns: Vec<StmtId> = program
        .walk(ibody)
        .into_iter()
        .filter(|&s| program.kind(s).is_return())
        .collect();
    let index_ty = program.sym_ty(index);
    for yield_stmt in program.yields_in(ibody) {
        let StmtKind::Yield(op) = *program.kind(yield_stmt) else {
            continue;
        };
        let yielded = program.new_local(caller, "_yieldedIndex", index_ty);
        let mut body_map = SymbolMap::new();
        body_map.insert(index, yielded);
        let copy = program.copy_tree(loop_block, &mut body_map);
        let def = program.new_stmt(StmtKind::Def(yielded), span);
        match reusable_move(program, ibody, yield_stmt, op) {
            Some(assign) => {
                if let StmtKind::Assign { dst, .. } = program.kind_mut(assign) {
                    *dst = yielded;
                }
                program.insert_before(assign, def)?;
            }
            None => {
                let mv = program.new_stmt(
                    StmtKind::Assign {
                        dst: yielded,
                        value: Expr::Use(op),
                    },
                    span,
                );
                program.insert_at_head(copy, mv)?;
                program.insert_at_head(copy, def)?;
            }
        }
        program.replace(yield_stmt, copy)?;
    }
    for ret in returns {
        program.remove(ret)?;
    }

    rebind_formals(program, ibody, iter_fn, ic, caller)?;
    program.claim_locals(caller, ibody);
    tracing::debug!(
        iterator = program.fn_name(iter_fn),
        caller = program.fn_name(caller),
        "inlined iterator"
    );
    Ok(())
}

/// The assignment right before a yield that computes the yielded local,
/// when nothing else touches that local.
fn reusable_move(program: &Program, root: StmtId, yield_stmt: StmtId, op: Operand) -> Option<StmtId> {
    let sym = op.as_sym()?;
    if program.sym(sym).kind != SymKind::Var {
        return None;
    }
    let prev = program.prev_sibling(yield_stmt)?;
    if program.kind(prev).written() != Some(sym) {
        return None;
    }
    let only_move_and_yield = program.stmts_mentioning(root, sym).into_iter().all(|s| {
        s == prev || s == yield_stmt || matches!(program.kind(s), StmtKind::Def(d) if *d == sym)
    });
    only_move_and_yield.then_some(prev)
}

/// Replace every formal of `iter_fn` mentioned under `root` with a local of
/// `owner` read from the matching ordinal field of `instance`. The reads are
/// placed at the head of `root`.
pub(crate) fn rebind_formals(
    program: &mut Program,
    root: StmtId,
    iter_fn: FnId,
    instance: SymId,
    owner: FnId,
) -> LowerResult<()> {
    let formals = program.func(iter_fn).formals.clone();
    let span = program.span(root);
    let scratch = program.new_scratch_block();
    for (ordinal, formal) in (1u32..).zip(formals) {
        if program.stmts_mentioning(root, formal).is_empty() {
            continue;
        }
        let name = program.sym_name(formal).to_owned();
        let local = program.new_local(owner, &name, program.sym_ty(formal));
        program.substitute(root, formal, local);
        program.push(scratch, StmtKind::Def(local), span)?;
        program.push(
            scratch,
            StmtKind::Assign {
                dst: local,
                value: Expr::GetMember {
                    base: instance,
                    field: FieldRef::Ordinal(ordinal),
                },
            },
            span,
        )?;
    }
    program.splice_at_head(root, scratch)?;
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

//! Local-scope fragmentation.
//!
//! A `Local` block must not span a suspension point or a transfer of
//! control, because later splicing moves code across exactly those
//! boundaries. Each local block that contains a yield, return, goto, or
//! label (at any depth) is replaced by a run of smaller local blocks that
//! each hold only straight-line statements:
//!
//! ```text
//! local {              var t;
//!   var t;             local { a(); b(); }
//!   a(); b();    =>    yield x;
//!   yield x;           local { c(); }
//!   c();
//! }
//! ```
//!
//! Declarations are hoisted in front of the new block they would have
//! started in. Nested blocks and conditional branches are fragmented the
//! same way. The original local markers are dropped at the end.

use rustc_hash::FxHashSet;
use weft_ir::{BlockInfo, Program, StmtId, StmtKind};

use crate::LowerResult;

/// Fragment every local block that contains an escaping construct.
/// Returns how many local blocks were rewritten.
pub fn fragment_local_blocks(program: &mut Program) -> LowerResult<usize> {
    let locals: Vec<StmtId> = program
        .fn_ids()
        .flat_map(|func| program.fn_stmts(func))
        .filter(|&stmt| matches!(program.kind(stmt).block_info(), Some(BlockInfo::Local)))
        .filter(|&stmt| !leave_unfragmented(program, stmt))
        .collect();

    let mut queue = locals.clone();
    let mut visited = FxHashSet::default();
    let mut next = 0;
    while let Some(&block) = queue.get(next) {
        next += 1;
        if visited.insert(block) {
            fragment_body(program, block, &mut queue)?;
        }
    }

    for &block in &locals {
        program.set_block_info(block, None);
    }
    tracing::debug!(count = locals.len(), "fragmented local blocks");
    Ok(locals.len())
}

/// No yield, return, goto, or label anywhere inside.
fn leave_unfragmented(program: &Program, block: StmtId) -> bool {
    !program.walk(block).into_iter().any(|stmt| match program.kind(stmt) {
        StmtKind::Yield(_) | StmtKind::Return(_) | StmtKind::Goto(_) => true,
        StmtKind::Def(sym) => program.sym(*sym).is_label(),
        _ => false,
    })
}

fn is_boundary(program: &Program, stmt: StmtId) -> bool {
    match program.kind(stmt) {
        StmtKind::Yield(_)
        | StmtKind::Return(_)
        | StmtKind::Goto(_)
        | StmtKind::Cond { .. }
        | StmtKind::Block { .. } => true,
        StmtKind::Def(sym) => program.sym(*sym).is_label(),
        _ => false,
    }
}

fn fragment_body(program: &mut Program, block: StmtId, queue: &mut Vec<StmtId>) -> LowerResult<()> {
    let body = program.block_body(block).to_vec();
    let mut hoisted = Vec::new();
    let mut pending = Vec::new();
    for (pos, &stmt) in body.iter().enumerate() {
        let boundary = is_boundary(program, stmt);
        if boundary {
            match program.kind(stmt) {
                StmtKind::Block { .. } => queue.push(stmt),
                StmtKind::Cond {
                    then_block,
                    else_block,
                    ..
                } => {
                    queue.push(*then_block);
                    queue.extend(*else_block);
                }
                _ => {}
            }
        } else if matches!(program.kind(stmt), StmtKind::Def(_)) {
            hoisted.push(stmt);
        } else {
            pending.push(stmt);
        }

        let at_end = pos + 1 == body.len();
        if (boundary || at_end) && !(hoisted.is_empty() && pending.is_empty()) {
            let span = program.span(stmt);
            let fragment = program.new_stmt(
                StmtKind::Block {
                    info: Some(BlockInfo::Local),
                    body: Vec::new(),
                },
                span,
            );
            program.insert_before(stmt, fragment)?;
            for decl in hoisted.drain(..) {
                program.insert_before(fragment, decl)?;
            }
            for moved in pending.drain(..) {
                program.insert_at_tail(fragment, moved)?;
            }
            tracing::trace!(?fragment, "new local fragment");
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

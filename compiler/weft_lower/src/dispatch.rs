//! Strategy selection for for-loop sites.

use std::fmt;

use rustc_hash::FxHashSet;
use weft_ir::{BlockInfo, FnFlags, Program, StmtId, SymId, TypeId};

use crate::error::internal;
use crate::inline::{expand_iterator_inline, inline_strategy};
use crate::protocol::lower_protocol;
use crate::zip::{can_fuse, fuse, setup_simultaneous_iterators};
use crate::{LowerCtx, LowerResult};

/// How one for-loop site is lowered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LoweringStrategy {
    /// Copy the iterator body in place of the loop.
    DirectInline,
    /// Run every single-yield component once, without protocol calls.
    ZipFusion,
    /// Drive the iterator through its protocol functions.
    Protocol,
    /// Pass the loop body to a generated copy of a recursive iterator.
    RecursiveCps,
    /// Loop over a recursive iterator inside a recursive iterator; left for
    /// the state-machine lowerer.
    Skip,
}

impl fmt::Display for LoweringStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoweringStrategy::DirectInline => "direct inline",
            LoweringStrategy::ZipFusion => "zip fusion",
            LoweringStrategy::Protocol => "protocol",
            LoweringStrategy::RecursiveCps => "recursive cps",
            LoweringStrategy::Skip => "skip",
        })
    }
}

/// `(index, iterator)` of a for-loop block.
pub(crate) fn loop_header(program: &Program, block: StmtId) -> LowerResult<(SymId, SymId)> {
    program
        .kind(block)
        .block_info()
        .and_then(BlockInfo::for_loop_header)
        .ok_or_else(|| internal("malformed for-loop header", program.span(block)))
}

/// Cheapest strategy that applies to `block`.
pub fn classify(program: &Program, ctx: &LowerCtx, block: StmtId) -> LowerResult<LoweringStrategy> {
    let (_, iterator) = loop_header(program, block)?;
    let iterator_ty = program.sym_ty(iterator);
    if !ctx.config.inline_iterators {
        return Ok(LoweringStrategy::Protocol);
    }
    let single_path = program.iterator_fn_of(iterator_ty).is_some_and(|f| {
        let def = program.func(f);
        def.iterator_info.is_some()
            && program.yields_in(def.body).len() == 1
            && matches!(
                program.ty(program.value_type(iterator_ty)).dispatch_children.as_slice(),
                [] | [TypeId::OBJECT]
            )
    });
    if single_path {
        return inline_strategy(program, ctx, block);
    }
    if can_fuse(program, iterator_ty) {
        return Ok(LoweringStrategy::ZipFusion);
    }
    Ok(LoweringStrategy::Protocol)
}

fn for_loops(program: &Program) -> Vec<StmtId> {
    program
        .fn_ids()
        .flat_map(|f| program.fn_stmts(f))
        .filter(|&s| matches!(program.kind(s).block_info(), Some(BlockInfo::ForLoop(_))))
        .collect()
}

/// A loop found earlier that an expansion since then has not moved away.
fn still_pending(program: &Program, block: StmtId) -> bool {
    program.enclosing_fn(block).is_some()
        && matches!(program.kind(block).block_info(), Some(BlockInfo::ForLoop(_)))
}

/// Inline every loop over an iterator marked for unconditional inlining.
#[tracing::instrument(level = "debug", skip_all)]
pub fn inline_marked_iterators(program: &mut Program, ctx: &mut LowerCtx) -> LowerResult<()> {
    let mut skipped = FxHashSet::default();
    loop {
        let marked: Vec<StmtId> = for_loops(program)
            .into_iter()
            .filter(|&block| !skipped.contains(&block))
            .filter(|&block| {
                loop_header(program, block)
                    .ok()
                    .and_then(|(_, it)| program.iterator_fn_of(program.sym_ty(it)))
                    .is_some_and(|f| program.func(f).flags.contains(FnFlags::INLINE_ITERATOR))
            })
            .collect();
        if marked.is_empty() {
            return Ok(());
        }
        for block in marked {
            if !still_pending(program, block) {
                continue;
            }
            match expand_iterator_inline(program, ctx, block)? {
                LoweringStrategy::DirectInline => ctx.summary.inlined += 1,
                LoweringStrategy::RecursiveCps => ctx.summary.recursive_cps += 1,
                _ => {
                    skipped.insert(block);
                }
            }
        }
    }
}

/// Lower every for-loop left in the program.
#[tracing::instrument(level = "debug", skip_all)]
pub fn lower_remaining_loops(program: &mut Program, ctx: &mut LowerCtx) -> LowerResult<()> {
    let mut skipped = FxHashSet::default();
    loop {
        let pending: Vec<StmtId> = for_loops(program)
            .into_iter()
            .filter(|block| !skipped.contains(block))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        for block in pending {
            if !still_pending(program, block) {
                continue;
            }
            let strategy = classify(program, ctx, block)?;
            let owner = program.enclosing_fn(block);
            tracing::debug!(?block, %strategy, "lowering for-loop");
            match strategy {
                LoweringStrategy::DirectInline | LoweringStrategy::RecursiveCps => {
                    match expand_iterator_inline(program, ctx, block)? {
                        LoweringStrategy::DirectInline => ctx.summary.inlined += 1,
                        LoweringStrategy::RecursiveCps => ctx.summary.recursive_cps += 1,
                        _ => {}
                    }
                }
                LoweringStrategy::ZipFusion => {
                    let (index, iterator) = loop_header(program, block)?;
                    let span = program.span(block);
                    let owner = program
                        .enclosing_fn(block)
                        .ok_or_else(|| internal("for-loop outside any function", span))?;
                    let setup = setup_simultaneous_iterators(program, block, index, iterator, owner)?;
                    fuse(program, block, &setup, owner)?;
                    ctx.summary.zip_fused += 1;
                }
                LoweringStrategy::Protocol => {
                    lower_protocol(program, &ctx.config, block)?;
                    ctx.summary.protocol += 1;
                }
                LoweringStrategy::Skip => {
                    skipped.insert(block);
                    ctx.summary.left_for_state_machine += 1;
                    continue;
                }
            }
            if let Some(owner) = owner {
                tracing::trace!(%strategy, body = %program.dump_fn(owner), "lowered for-loop");
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

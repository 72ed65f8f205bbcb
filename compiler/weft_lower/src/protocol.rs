//! Generic lowering through the iterator protocol.
//!
//! Works for any iterator, including ones with runtime subtypes and any
//! number of zippered components:
//!
//! ```text
//! zip1(a); zip1(b); more = hasMore(a) && hasMore(b);
//! while more {
//!     zip2(a); x = getValue(a);
//!     zip2(b); y = getValue(b);
//!     <loop body>
//!     zip3(a); zip3(b); more = hasMore(a) && hasMore(b);
//! }
//! zip4(a); zip4(b);
//! ```
//!
//! With bounds checks on, each time the flags are computed every bounded
//! component after the first is compared with the first bounded one, and a
//! mismatch is a runtime error.
//!
//! Every protocol call dispatches on the runtime class of the instance
//! first, trying each declared subtype before the base operation.

use rustc_hash::FxHashSet;
use weft_ir::{
    BlockInfo, Expr, FieldRef, FnId, IrBuilder, Operand, PrimOp, Program, ProtocolOp,
    RangeBoundedness, StmtId, StmtKind, SymId, TypeId,
};

use crate::dispatch::loop_header;
use crate::error::internal;
use crate::zip::setup_simultaneous_iterators;
use crate::{LowerConfig, LowerResult};

const NON_EQUAL_LENGTHS: &str = "zippered iterations have non-equal lengths";

/// Runtime subtypes of `ty`, depth first, without the root class and
/// without duplicates.
pub fn iterator_children(program: &Program, ty: TypeId) -> Vec<TypeId> {
    fn visit(program: &Program, ty: TypeId, seen: &mut FxHashSet<TypeId>, out: &mut Vec<TypeId>) {
        for &child in &program.ty(ty).dispatch_children {
            if child == TypeId::OBJECT || !seen.insert(child) {
                continue;
            }
            out.push(child);
            visit(program, child, seen, out);
        }
    }
    let mut seen = FxHashSet::default();
    let mut out = Vec::new();
    visit(program, program.value_type(ty), &mut seen, &mut out);
    out
}

/// False only for iterators over ranges that are not bounded on both ends.
pub fn is_bounded_iterator(program: &Program, iter_fn: FnId) -> bool {
    let Some(this) = program.func(iter_fn).this else {
        return true;
    };
    let receiver = program.value_type(program.sym_ty(this));
    program
        .ty(receiver)
        .range
        .map_or(true, |r| r == RangeBoundedness::Bounded)
}

fn protocol_fn_for(program: &Program, ty: TypeId, op: ProtocolOp, owner: FnId) -> LowerResult<FnId> {
    program
        .iterator_fn_of(ty)
        .and_then(|f| program.func(f).iterator_info.as_ref())
        .map(|info| info.protocol_fn(op))
        .ok_or_else(|| {
            internal(
                format!(
                    "type `{}` has no iterator protocol",
                    program.name_str(program.ty(ty).name)
                ),
                program.func(owner).span,
            )
        })
}

/// `op(it)` as a detached block dispatching on the runtime class of `it`,
/// storing the result into `ret` when given.
pub fn build_iterator_call(
    program: &mut Program,
    owner: FnId,
    op: ProtocolOp,
    it: SymId,
    ret: Option<SymId>,
) -> LowerResult<StmtId> {
    let base_ty = program.value_type(program.sym_ty(it));
    let children = iterator_children(program, base_ty);
    let mut targets = Vec::with_capacity(children.len());
    for &child in &children {
        targets.push((child, protocol_fn_for(program, child, op, owner)?));
    }
    let base_fn = protocol_fn_for(program, base_ty, op, owner)?;

    let block = program.new_scratch_block();
    let mut b = IrBuilder::at_block(program, owner, block);
    for (child, callee) in targets {
        let cid = b.fresh_var("_cid", TypeId::BOOL);
        b.emit_assign(cid, Expr::GetCid { value: it, class: child });
        let (then_block, else_block) = b.emit_cond(cid.into(), true);
        b.position_at(then_block);
        let child_it = b.fresh_var("_child_it", child);
        b.emit_assign(
            child_it,
            Expr::Cast {
                ty: child,
                value: it.into(),
            },
        );
        emit_protocol_call(&mut b, callee, child_it, ret);
        if let Some(else_block) = else_block {
            b.position_at(else_block);
        }
    }
    emit_protocol_call(&mut b, base_fn, it, ret);
    Ok(block)
}

fn emit_protocol_call(b: &mut IrBuilder<'_>, callee: FnId, arg: SymId, ret: Option<SymId>) {
    let call = Expr::call(callee, [arg.into()]);
    let Some(ret) = ret else {
        b.emit_eval(call);
        return;
    };
    let ret_ty = b.program().sym_ty(ret);
    let callee_ty = b.program().func(callee).ret_type;
    if callee_ty == ret_ty {
        b.emit_assign(ret, call);
    } else {
        let tmp = b.fresh_var("_ret", callee_ty);
        b.emit_assign(tmp, call);
        b.emit_assign(
            ret,
            Expr::Cast {
                ty: ret_ty,
                value: tmp.into(),
            },
        );
    }
}

/// Lower `loop_block` to protocol calls around a condition-driven loop.
pub fn lower_protocol(program: &mut Program, config: &LowerConfig, loop_block: StmtId) -> LowerResult<()> {
    let (index, iterator) = loop_header(program, loop_block)?;
    let span = program.span(loop_block);
    let owner = program
        .enclosing_fn(loop_block)
        .ok_or_else(|| internal("for-loop outside any function", span))?;
    let setup = setup_simultaneous_iterators(program, loop_block, index, iterator, owner)?;
    if setup.components.is_empty() {
        return Err(internal("zippered loop without components", span));
    }

    let bounded: Vec<bool> = setup
        .components
        .iter()
        .map(|&(it, _)| {
            program
                .iterator_fn_of(program.sym_ty(it))
                .map_or(true, |f| is_bounded_iterator(program, f))
        })
        .collect();
    let reference = bounded.iter().position(|&b| b).unwrap_or(0);
    let checked: Vec<bool> = bounded
        .iter()
        .enumerate()
        .map(|(i, &b)| config.bounds_checks && b && i != reference)
        .collect();

    // zip1, initial hasMore
    let pre = program.new_scratch_block();
    let mut conds = Vec::with_capacity(setup.components.len());
    for &(it, _) in &setup.components {
        let zip1 = build_iterator_call(program, owner, ProtocolOp::Zip1, it, None)?;
        program.insert_at_tail(pre, zip1)?;
        let cond = program.new_local(owner, "_hasMore", TypeId::BOOL);
        program.push(pre, StmtKind::Def(cond), span)?;
        let has_more = build_iterator_call(program, owner, ProtocolOp::HasMore, it, Some(cond))?;
        program.insert_at_tail(pre, has_more)?;
        conds.push(cond);
    }
    let more = program.new_local(owner, "_more", TypeId::BOOL);
    program.push(pre, StmtKind::Def(more), span)?;
    combine_flags(program, owner, pre, &conds, &checked, reference, more);
    program.splice_before(loop_block, pre)?;

    // loop head: index declarations, zip2, getValue
    let head = program.new_scratch_block();
    let owner_body = program.func(owner).body;
    if let Some(def) = program.find_def(owner_body, index) {
        program.insert_at_tail(head, def)?;
    }
    for &def in &setup.index_defs {
        program.push(head, StmtKind::Def(def), span)?;
    }
    for &(it, idx) in &setup.components {
        let zip2 = build_iterator_call(program, owner, ProtocolOp::Zip2, it, None)?;
        program.insert_at_tail(head, zip2)?;
        let value = build_iterator_call(program, owner, ProtocolOp::GetValue, it, Some(idx))?;
        program.insert_at_tail(head, value)?;
    }
    for &(tuple, field, value) in &setup.index_stores {
        program.push(
            head,
            StmtKind::SetMember {
                base: tuple,
                field: FieldRef::Index(field),
                value: value.into(),
            },
            span,
        )?;
    }
    program.splice_at_head(loop_block, head)?;

    // loop tail: zip3, hasMore
    let tail = program.new_scratch_block();
    for (&(it, _), &cond) in setup.components.iter().zip(&conds) {
        let zip3 = build_iterator_call(program, owner, ProtocolOp::Zip3, it, None)?;
        program.insert_at_tail(tail, zip3)?;
        let has_more = build_iterator_call(program, owner, ProtocolOp::HasMore, it, Some(cond))?;
        program.insert_at_tail(tail, has_more)?;
    }
    combine_flags(program, owner, tail, &conds, &checked, reference, more);
    program.splice_at_tail(loop_block, tail)?;
    program.set_block_info(
        loop_block,
        Some(BlockInfo::CondLoop {
            cond: Operand::Sym(more),
        }),
    );

    // after the loop: zip4
    let post = program.new_scratch_block();
    for &(it, _) in &setup.components {
        let zip4 = build_iterator_call(program, owner, ProtocolOp::Zip4, it, None)?;
        program.insert_at_tail(post, zip4)?;
    }
    program.splice_after(loop_block, post)?;

    tracing::debug!(
        components = setup.components.len(),
        reference,
        checks = checked.iter().filter(|&&c| c).count(),
        caller = program.fn_name(owner),
        "lowered loop through iterator protocol"
    );
    Ok(())
}

/// Check bounded components against `conds[reference]`, then set `more`
/// to the conjunction of every flag.
fn combine_flags(
    program: &mut Program,
    owner: FnId,
    block: StmtId,
    conds: &[SymId],
    checked: &[bool],
    reference: usize,
    more: SymId,
) {
    let span = program.span(block);
    let mut b = IrBuilder::at_block(program, owner, block).with_span(span);
    for (&cond, _) in conds.iter().zip(checked).filter(|&(_, &c)| c) {
        let mismatch = b.fresh_var("_mismatch", TypeId::BOOL);
        b.emit_assign(
            mismatch,
            Expr::prim(PrimOp::Ne, [cond.into(), conds[reference].into()]),
        );
        let (then_block, _) = b.emit_cond(mismatch.into(), false);
        b.position_at(then_block);
        b.emit_runtime_error(NON_EQUAL_LENGTHS);
        b.position_at(block);
    }
    b.emit_assign(more, Expr::sym(conds[0]));
    for &cond in &conds[1..] {
        b.emit_assign(more, Expr::prim(PrimOp::And, [more.into(), cond.into()]));
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

//! Zippered-loop decomposition and zip fusion.
//!
//! `for (a, (b, c)) in (p, (q, r))` is flattened into one `(iterator,
//! index)` pair per leaf. The tuple components are read into temporaries
//! before the loop; per-leaf index temporaries are declared at the loop
//! head and stored back into the index tuple once they hold a value.
//!
//! When every leaf iterator has a single yield at the top level of its body,
//! each produces exactly one element and the loop fuses into a block that
//! runs once:
//!
//! ```text
//! { <p before yield> <q before yield>
//!   a = <p yield>; b = <q yield>; (a, b) -> idx
//!   <loop body>
//!   <p after yield> <q after yield> }
//! ```

use weft_ir::{
    Expr, FieldRef, FnId, Operand, Program, Span, StmtId, StmtKind, SymId, SymbolMap, TypeId,
};

use crate::error::internal;
use crate::inline::rebind_formals;
use crate::LowerResult;

/// A zippered loop header flattened to its leaves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimultaneousIterators {
    /// `(iterator, index)` per leaf, left to right.
    pub components: Vec<(SymId, SymId)>,
    /// Index temporaries to declare at the loop head.
    pub index_defs: Vec<SymId>,
    /// `tuple.field = value` stores rebuilding the index, innermost first.
    pub index_stores: Vec<(SymId, u32, SymId)>,
}

/// Flatten the header of `loop_block`, emitting the tuple component reads
/// before the loop. A non-tuple header yields a single component.
pub fn setup_simultaneous_iterators(
    program: &mut Program,
    loop_block: StmtId,
    index: SymId,
    iterator: SymId,
    owner: FnId,
) -> LowerResult<SimultaneousIterators> {
    let mut out = SimultaneousIterators::default();
    decompose(program, loop_block, owner, index, iterator, &mut out)?;
    Ok(out)
}

fn decompose(
    program: &mut Program,
    loop_block: StmtId,
    owner: FnId,
    index: SymId,
    iterator: SymId,
    out: &mut SimultaneousIterators,
) -> LowerResult<()> {
    let iter_ty = program.value_type(program.sym_ty(iterator));
    if !program.ty(iter_ty).is_tuple() {
        out.components.push((iterator, index));
        return Ok(());
    }
    let span = program.span(loop_block);
    let index_ty = program.value_type(program.sym_ty(index));
    let iter_fields: Vec<TypeId> = program.ty(iter_ty).fields.iter().map(|f| f.ty).collect();
    let index_fields: Vec<TypeId> = program.ty(index_ty).fields.iter().map(|f| f.ty).collect();
    if !program.ty(index_ty).is_tuple() || iter_fields.len() != index_fields.len() {
        return Err(internal(
            format!(
                "zippered loop binds {} iterators to an index of arity {}",
                iter_fields.len(),
                index_fields.len()
            ),
            span,
        ));
    }
    for ((field, iter_field), index_field) in (0u32..).zip(iter_fields).zip(index_fields) {
        let component = program.new_local(owner, "_iterator", iter_field);
        let def = program.new_stmt(StmtKind::Def(component), span);
        program.insert_before(loop_block, def)?;
        let read = program.new_stmt(
            StmtKind::Assign {
                dst: component,
                value: Expr::GetMemberValue {
                    base: iterator,
                    field: FieldRef::Index(field),
                },
            },
            span,
        );
        program.insert_before(loop_block, read)?;

        let component_index = program.new_local(owner, "_index", index_field);
        out.index_defs.push(component_index);
        decompose(program, loop_block, owner, component_index, component, out)?;
        out.index_stores.push((index, field, component_index));
    }
    Ok(())
}

/// Leaf iterator types of a possibly nested iterator tuple type.
pub(crate) fn leaf_iterator_types(program: &Program, ty: TypeId) -> Vec<TypeId> {
    let ty = program.value_type(ty);
    let def = program.ty(ty);
    if def.is_tuple() {
        def.fields
            .iter()
            .flat_map(|f| leaf_iterator_types(program, f.ty))
            .collect()
    } else {
        vec![ty]
    }
}

/// Exactly one yield, directly in the top-level body.
pub(crate) fn has_single_top_level_yield(program: &Program, iter_fn: FnId) -> bool {
    let body = program.func(iter_fn).body;
    match program.yields_in(body).as_slice() {
        [only] => program.parent(*only) == Some(body),
        _ => false,
    }
}

/// Every leaf of the header type is fusable.
pub fn can_fuse(program: &Program, iterator_ty: TypeId) -> bool {
    leaf_iterator_types(program, iterator_ty).into_iter().all(|ty| {
        program
            .iterator_fn_of(ty)
            .is_some_and(|f| has_single_top_level_yield(program, f))
    })
}

/// Replace `loop_block` by its fused single-pass form.
pub fn fuse(
    program: &mut Program,
    loop_block: StmtId,
    setup: &SimultaneousIterators,
    owner: FnId,
) -> LowerResult<()> {
    let span = program.span(loop_block);
    program.set_block_info(loop_block, None);
    let split = program.new_stmt(StmtKind::Noop, span);
    program.insert_at_head(loop_block, split)?;

    let mut moves = Vec::new();
    let mut tails = Vec::new();
    for &(iterator, index) in &setup.components {
        let iter_fn = program
            .iterator_fn_of(program.sym_ty(iterator))
            .ok_or_else(|| internal("zippered component is not an iterator instance", span))?;
        let mut map = SymbolMap::new();
        let body = program.copy_tree(program.func(iter_fn).body, &mut map);
        rebind_formals(program, body, iter_fn, iterator, owner)?;
        let mut after_yield = false;
        for stmt in program.take_body(body)? {
            match *program.kind(stmt) {
                StmtKind::Yield(op) => {
                    after_yield = true;
                    moves.push(assign(program, index, op, span));
                }
                StmtKind::Return(_) => {}
                _ if after_yield => tails.push(stmt),
                _ => program.insert_before(split, stmt)?,
            }
        }
    }

    let mut at = split;
    for mv in moves {
        program.insert_after(at, mv)?;
        at = mv;
    }
    for &(tuple, field, value) in &setup.index_stores {
        let store = program.new_stmt(
            StmtKind::SetMember {
                base: tuple,
                field: FieldRef::Index(field),
                value: value.into(),
            },
            span,
        );
        program.insert_after(at, store)?;
        at = store;
    }
    for stmt in tails {
        program.insert_at_tail(loop_block, stmt)?;
    }
    for &def in setup.index_defs.iter().rev() {
        let def = program.new_stmt(StmtKind::Def(def), span);
        program.insert_at_head(loop_block, def)?;
    }
    program.remove(split)?;
    program.claim_locals(owner, loop_block);
    tracing::debug!(
        components = setup.components.len(),
        caller = program.fn_name(owner),
        "fused zippered loop"
    );
    Ok(())
}

fn assign(program: &mut Program, dst: SymId, op: Operand, span: Span) -> StmtId {
    program.new_stmt(
        StmtKind::Assign {
            dst,
            value: Expr::Use(op),
        },
        span,
    )
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

//! Turning an extracted loop body into a closed function.
//!
//! Every symbol the body mentions but neither declares nor receives as a
//! formal is captured by a new formal. Captures the body writes (or takes
//! the address of) travel by reference: the body works on a local copy
//! loaded at entry and stored back at exit.

use rustc_hash::FxHashSet;
use weft_ir::{Expr, FnId, Program, StmtKind, SymId};

use crate::error::internal;
use crate::LowerResult;

/// One free symbol of a flattened body.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Capture {
    pub sym: SymId,
    pub by_ref: bool,
}

/// Free symbols of `func`'s body in order of first appearance.
///
/// A `return`, or a `goto` to a label the body does not place, would leave
/// the extracted body and has nowhere to go.
pub(crate) fn free_captures(program: &Program, func: FnId) -> LowerResult<Vec<Capture>> {
    let body = program.func(func).body;
    let defined = program.defined_syms(body);
    let formals: FxHashSet<SymId> = program.func(func).formals.iter().copied().collect();
    let stmts = program.walk(body);

    let mut order = Vec::new();
    let mut seen = FxHashSet::default();
    let mut written = FxHashSet::default();
    for &stmt in &stmts {
        let kind = program.kind(stmt);
        match kind {
            StmtKind::Return(_) => {
                return Err(internal(
                    "return inside the body of a loop over a recursive iterator",
                    program.span(stmt),
                ));
            }
            StmtKind::Goto(label) if !defined.contains(label) => {
                return Err(internal(
                    "goto leaves the body of a loop over a recursive iterator",
                    program.span(stmt),
                ));
            }
            StmtKind::Assign { dst, value } => {
                written.insert(*dst);
                if let Expr::AddrOf(sym) = value {
                    written.insert(*sym);
                }
            }
            StmtKind::Eval(Expr::AddrOf(sym)) => {
                written.insert(*sym);
            }
            _ => {}
        }
        kind.for_each_sym(&mut |sym| {
            let free = !defined.contains(&sym)
                && !formals.contains(&sym)
                && !program.sym(sym).is_label();
            if free && seen.insert(sym) {
                order.push(sym);
            }
        });
    }
    Ok(order
        .into_iter()
        .map(|sym| Capture {
            sym,
            by_ref: written.contains(&sym),
        })
        .collect())
}

/// Add a formal per capture to `func` and rewrite its body to use them.
/// Returns the captures in formal order.
pub(crate) fn flatten_loop_body(program: &mut Program, func: FnId) -> LowerResult<Vec<Capture>> {
    let captures = free_captures(program, func)?;
    let body = program.func(func).body;
    let span = program.span(body);
    let head = program.new_scratch_block();
    let tail = program.new_scratch_block();
    for capture in &captures {
        let name = program.sym_name(capture.sym).to_owned();
        let ty = program.sym_ty(capture.sym);
        if capture.by_ref {
            let ref_ty = program.ref_of(ty);
            let formal = program.add_formal(func, &name, ref_ty);
            let local = program.new_local(func, &name, ty);
            program.substitute(body, capture.sym, local);
            program.push(head, StmtKind::Def(local), span)?;
            program.push(
                head,
                StmtKind::Assign {
                    dst: local,
                    value: Expr::Deref(formal),
                },
                span,
            )?;
            program.push(
                tail,
                StmtKind::Store {
                    ptr: formal,
                    value: local.into(),
                },
                span,
            )?;
        } else {
            let formal = program.add_formal(func, &name, ty);
            program.substitute(body, capture.sym, formal);
        }
    }
    program.splice_at_head(body, head)?;
    program.splice_at_tail(body, tail)?;
    tracing::trace!(
        func = program.fn_name(func),
        captures = captures.len(),
        by_ref = captures.iter().filter(|c| c.by_ref).count(),
        "flattened loop body"
    );
    Ok(captures)
}

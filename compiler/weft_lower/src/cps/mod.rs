//! Continuation-passing lowering of loops over recursive iterators.
//!
//! A recursive iterator cannot be inlined, so the loop body is passed to it
//! instead. The loop body becomes a function, a fixed-signature wrapper for
//! it is registered in the function table, and a generated copy of the
//! iterator calls the wrapper at every yield:
//!
//! ```text
//! for x in walk(t) { s += x; }
//!
//! fn _rec_iter_loop_main(_index, s: &int) { var x = _index; s += x; }
//! fn _rec_iter_loop_wrapper_main(_index, fn_args) {
//!     _rec_iter_loop_main(_index, fn_args._arg1);
//! }
//! fn _rec_iter_fn_walk(_ic, _loopBodyFn, _loopBodyFnArgs) {
//!     .. _rec_iter_fn_walk(child, _loopBodyFn, _loopBodyFnArgs) ..
//!     .. ftable[_loopBodyFn](value, _loopBodyFnArgs) ..
//! }
//!
//! var fn_args = _fn_arg_bundle(&s);
//! _rec_iter_fn_walk(ic, <wrapper slot>, fn_args);
//! ```
//!
//! Generated iterator functions are cached per iterator and reused by any
//! later site whose loop-body function has an equivalent signature.

mod flatten;

use weft_ir::{
    Expr, FieldDef, FieldRef, FnFlags, FnId, Operand, Program, Span, StmtId, StmtKind, SymId,
    SymbolMap, TypeDef, TypeFlags, TypeId, TypeKind,
};

use crate::dispatch::loop_header;
use crate::error::internal;
use crate::inline::rebind_formals;
use crate::{LowerCtx, LowerResult};

use flatten::{flatten_loop_body, Capture};

/// Lower `loop_block`, a loop over a recursive iterator, into a call to the
/// generated iterator function.
pub fn lower_recursive_loop(
    program: &mut Program,
    ctx: &mut LowerCtx,
    loop_block: StmtId,
) -> LowerResult<()> {
    let (index, ic) = loop_header(program, loop_block)?;
    let span = program.span(loop_block);
    let caller = program
        .enclosing_fn(loop_block)
        .ok_or_else(|| internal("for-loop outside any function", span))?;
    let iter_fn = program
        .iterator_fn_of(program.sym_ty(ic))
        .ok_or_else(|| internal("recursive loop does not iterate an iterator instance", span))?;
    let anchor = program.new_stmt(StmtKind::Noop, span);
    program.insert_before(loop_block, anchor)?;

    let (body_fn, captures) = extract_loop_body(program, caller, loop_block, index)?;
    let bundle = bundle_type(program, body_fn);
    let wrapper = build_wrapper(program, caller, body_fn, bundle, span)?;
    let slot = program.ftable.register(wrapper);

    let site = program.new_scratch_block();
    let actuals = emit_captures(program, caller, site, &captures, span)?;
    let fn_args = program.new_local(caller, "_fn_args", bundle);
    program.push(site, StmtKind::Def(fn_args), span)?;
    for (field, actual) in (0u32..).zip(actuals) {
        program.push(
            site,
            StmtKind::SetMember {
                base: fn_args,
                field: FieldRef::Index(field),
                value: actual.into(),
            },
            span,
        )?;
    }

    let (generated, bundle_arg) = match ctx.cache.lookup(program, iter_fn, body_fn) {
        Some(generated) => {
            let expected = program
                .func(generated)
                .formal(2)
                .map(|f| program.sym_ty(f))
                .ok_or_else(|| internal("generated recursive iterator lost its bundle formal", span))?;
            let cast = program.new_local(caller, "_fn_args_cast", expected);
            program.push(site, StmtKind::Def(cast), span)?;
            program.push(
                site,
                StmtKind::Assign {
                    dst: cast,
                    value: Expr::Cast {
                        ty: expected,
                        value: fn_args.into(),
                    },
                },
                span,
            )?;
            tracing::debug!(
                iterator = program.fn_name(iter_fn),
                generated = program.fn_name(generated),
                "reused recursive iterator function"
            );
            (generated, cast)
        }
        None => {
            let generated = build_recursive_fn(program, iter_fn, bundle, span)?;
            ctx.cache.insert(iter_fn, generated, body_fn);
            ctx.summary.generated_fns += 1;
            (generated, fn_args)
        }
    };
    program.push(
        site,
        StmtKind::Eval(Expr::call(
            generated,
            [ic.into(), Operand::int(i64::from(slot)), bundle_arg.into()],
        )),
        span,
    )?;
    program.splice_before(anchor, site)?;
    program.remove(anchor)?;
    tracing::debug!(
        iterator = program.fn_name(iter_fn),
        caller = program.fn_name(caller),
        captures = captures.len(),
        slot,
        "lowered loop over recursive iterator"
    );
    Ok(())
}

/// Move the loop body into `_rec_iter_loop_<caller>(_index, captures..)`.
fn extract_loop_body(
    program: &mut Program,
    caller: FnId,
    loop_block: StmtId,
    index: SymId,
) -> LowerResult<(FnId, Vec<Capture>)> {
    let span = program.span(loop_block);
    let name = format!("_rec_iter_loop_{}", program.fn_name(caller));
    let body_fn = program.new_fn(&name, TypeId::VOID, span);
    program.func_mut(body_fn).flags |= FnFlags::GENERATED;
    let index_formal = program.add_formal(body_fn, "_index", program.sym_ty(index));

    if let Some(def) = program.find_def(program.func(caller).body, index) {
        program.remove(def)?;
    }
    let body = program.func(body_fn).body;
    program.push(body, StmtKind::Def(index), span)?;
    program.push(
        body,
        StmtKind::Assign {
            dst: index,
            value: Expr::sym(index_formal),
        },
        span,
    )?;
    program.set_block_info(loop_block, None);
    program.insert_at_tail(body, loop_block)?;

    let captures = flatten_loop_body(program, body_fn)?;
    program.push(body, StmtKind::Return(Operand::VOID), span)?;
    program.claim_locals(body_fn, body);
    Ok((body_fn, captures))
}

/// Record type with one field per capture formal of `body_fn`.
fn bundle_type(program: &mut Program, body_fn: FnId) -> TypeId {
    let captured: Vec<TypeId> = program.func(body_fn).formals[1..]
        .iter()
        .map(|&f| program.sym_ty(f))
        .collect();
    let fields: Vec<FieldDef> = (1..)
        .zip(captured)
        .map(|(i, ty)| FieldDef {
            name: program.intern(&format!("_arg{i}")),
            ty,
        })
        .collect();
    let name = program.intern("_fn_arg_bundle");
    program.add_type(
        TypeDef::new(name, TypeKind::Record)
            .with_flags(TypeFlags::ARG_BUNDLE)
            .with_fields(fields),
    )
}

/// `_rec_iter_loop_wrapper_<caller>(_index, fn_args)`: unpack the bundle and
/// forward to the loop body.
fn build_wrapper(
    program: &mut Program,
    caller: FnId,
    body_fn: FnId,
    bundle: TypeId,
    span: Span,
) -> LowerResult<FnId> {
    let name = format!("_rec_iter_loop_wrapper_{}", program.fn_name(caller));
    let wrapper = program.new_fn(&name, TypeId::VOID, span);
    program.func_mut(wrapper).flags |= FnFlags::GENERATED;
    let index_ty = program
        .func(body_fn)
        .formal(0)
        .map(|f| program.sym_ty(f))
        .ok_or_else(|| internal("loop body function without an index formal", span))?;
    let index = program.add_formal(wrapper, "_index", index_ty);
    let bundle_ref = program.ref_of(bundle);
    let fn_args = program.add_formal(wrapper, "fn_args", bundle_ref);

    let body = program.func(wrapper).body;
    let unpacked = program.new_local(wrapper, "fn_args_tmp", bundle);
    program.push(body, StmtKind::Def(unpacked), span)?;
    program.push(
        body,
        StmtKind::Assign {
            dst: unpacked,
            value: Expr::Cast {
                ty: bundle,
                value: fn_args.into(),
            },
        },
        span,
    )?;
    let field_types: Vec<TypeId> = program.ty(bundle).fields.iter().map(|f| f.ty).collect();
    let mut args = vec![Operand::Sym(index)];
    for (field, ty) in (0u32..).zip(field_types) {
        let tmp = program.new_local(wrapper, "_arg", ty);
        program.push(body, StmtKind::Def(tmp), span)?;
        program.push(
            body,
            StmtKind::Assign {
                dst: tmp,
                value: Expr::GetMemberValue {
                    base: unpacked,
                    field: FieldRef::Index(field),
                },
            },
            span,
        )?;
        args.push(tmp.into());
    }
    program.push(body, StmtKind::Eval(Expr::call(body_fn, args)), span)?;
    program.push(body, StmtKind::Return(Operand::VOID), span)?;
    tracing::debug!(wrapper = program.fn_name(wrapper), "built loop body wrapper");
    Ok(wrapper)
}

/// Actual per capture: the symbol itself, or its address for captures the
/// body writes.
fn emit_captures(
    program: &mut Program,
    caller: FnId,
    site: StmtId,
    captures: &[Capture],
    span: Span,
) -> LowerResult<Vec<SymId>> {
    let mut actuals = Vec::with_capacity(captures.len());
    for capture in captures {
        if !capture.by_ref {
            actuals.push(capture.sym);
            continue;
        }
        let ref_ty = program.ref_of(program.sym_ty(capture.sym));
        let addr = program.new_local(caller, "_ref", ref_ty);
        program.push(site, StmtKind::Def(addr), span)?;
        program.push(
            site,
            StmtKind::Assign {
                dst: addr,
                value: Expr::AddrOf(capture.sym),
            },
            span,
        )?;
        actuals.push(addr);
    }
    Ok(actuals)
}

/// `_rec_iter_fn_<iterator>(_ic, _loopBodyFn, _loopBodyFnArgs)`: the
/// iterator body with every yield turned into a callback.
pub(crate) fn build_recursive_fn(
    program: &mut Program,
    iter_fn: FnId,
    bundle: TypeId,
    span: Span,
) -> LowerResult<FnId> {
    let iclass = program
        .func(iter_fn)
        .iterator_info
        .as_ref()
        .map(|info| info.iclass)
        .ok_or_else(|| internal("recursive iterator has no instance class", span))?;
    let name = format!("_rec_iter_fn_{}", program.fn_name(iter_fn));
    let generated = program.new_fn(&name, TypeId::VOID, span);
    program.func_mut(generated).flags |= FnFlags::GENERATED;
    let ic = program.add_formal(generated, "_ic", iclass);
    let callback = program.add_formal(generated, "_loopBodyFn", TypeId::INT);
    let args = program.add_formal(generated, "_loopBodyFnArgs", bundle);

    let mut map = SymbolMap::new();
    let body = program.copy_tree(program.func(iter_fn).body, &mut map);
    let empty = program.func(generated).body;
    program.replace(empty, body)?;

    let forwarded = forward_recursive_loops(program, generated, iter_fn, callback, args)?;
    rebind_formals(program, body, iter_fn, ic, generated)?;
    let localized = match program.func(iter_fn).ret_sym {
        Some(ret) => localize_ret_sym(program, generated, body, map.resolve(ret))?,
        None => 0,
    };

    let value_ty = program.func(iter_fn).ret_type;
    let yields = program.yields_in(body);
    for &yield_stmt in &yields {
        let StmtKind::Yield(op) = *program.kind(yield_stmt) else {
            continue;
        };
        let yield_span = program.span(yield_stmt);
        let yielded = program.new_local(generated, "_yieldedIndex", value_ty);
        let scratch = program.new_scratch_block();
        program.push(scratch, StmtKind::Def(yielded), yield_span)?;
        program.push(
            scratch,
            StmtKind::Assign {
                dst: yielded,
                value: Expr::Use(op),
            },
            yield_span,
        )?;
        program.push(
            scratch,
            StmtKind::Eval(Expr::FtableCall {
                slot: callback.into(),
                args: [yielded.into(), args.into()].into_iter().collect(),
            }),
            yield_span,
        )?;
        program.splice_before(yield_stmt, scratch)?;
        program.remove(yield_stmt)?;
    }
    for stmt in program.walk(body) {
        if program.kind(stmt).is_return() {
            program.remove(stmt)?;
        }
    }
    program.push(body, StmtKind::Return(Operand::VOID), span)?;
    program.claim_locals(generated, body);
    tracing::debug!(
        iterator = program.fn_name(iter_fn),
        generated = program.fn_name(generated),
        yields = yields.len(),
        forwarded,
        localized,
        "built recursive iterator function"
    );
    tracing::trace!(body = %program.dump_fn(generated), "generated recursive iterator body");
    Ok(generated)
}

/// Turn `for x in <iter_fn instance> { yield x; }` into a direct call of
/// the generated function with the same callback and bundle.
fn forward_recursive_loops(
    program: &mut Program,
    generated: FnId,
    iter_fn: FnId,
    callback: SymId,
    args: SymId,
) -> LowerResult<usize> {
    let ic_ty = program
        .func(generated)
        .formal(0)
        .map_or(TypeId::VOID, |f| program.sym_ty(f));
    let mut count = 0;
    for stmt in program.fn_stmts(generated) {
        let Some((index, inner)) = program.kind(stmt).block_info().and_then(|i| i.for_loop_header())
        else {
            continue;
        };
        let reyields = matches!(
            program.block_body(stmt),
            [only] if matches!(program.kind(*only), StmtKind::Yield(Operand::Sym(y)) if *y == index)
        );
        if !reyields || program.iterator_fn_of(program.sym_ty(inner)) != Some(iter_fn) {
            continue;
        }
        let span = program.span(stmt);
        let scratch = program.new_scratch_block();
        let instance = if program.value_type(program.sym_ty(inner)) == ic_ty {
            inner
        } else {
            let cast = program.new_local(generated, "_ic", ic_ty);
            program.push(scratch, StmtKind::Def(cast), span)?;
            program.push(
                scratch,
                StmtKind::Assign {
                    dst: cast,
                    value: Expr::Cast {
                        ty: ic_ty,
                        value: inner.into(),
                    },
                },
                span,
            )?;
            cast
        };
        program.push(
            scratch,
            StmtKind::Eval(Expr::call(
                generated,
                [instance.into(), callback.into(), args.into()],
            )),
            span,
        )?;
        program.splice_before(stmt, scratch)?;
        program.remove(stmt)?;
        count += 1;
    }
    Ok(count)
}

/// Give every block that uses the return symbol, other than the one
/// declaring it, its own copy seeded from the shared one.
fn localize_ret_sym(program: &mut Program, owner: FnId, root: StmtId, ret: SymId) -> LowerResult<usize> {
    let home = program
        .find_def(root, ret)
        .and_then(|def| program.enclosing_block(def));
    let ty = program.sym_ty(ret);
    let name = program.sym_name(ret).to_owned();
    let mut locals: Vec<(StmtId, SymId)> = Vec::new();
    for stmt in program.stmts_mentioning(root, ret) {
        let Some(block) = program.enclosing_block(stmt) else {
            continue;
        };
        if Some(block) == home {
            continue;
        }
        let local = match locals.iter().find(|(b, _)| *b == block) {
            Some(&(_, local)) => local,
            None => {
                let local = program.new_local(owner, &name, ty);
                let span = program.span(block);
                let seed = program.new_stmt(
                    StmtKind::Assign {
                        dst: local,
                        value: Expr::sym(ret),
                    },
                    span,
                );
                program.insert_at_head(block, seed)?;
                let def = program.new_stmt(StmtKind::Def(local), span);
                program.insert_at_head(block, def)?;
                locals.push((block, local));
                local
            }
        };
        program
            .kind_mut(stmt)
            .rewrite_syms(&mut |s| if s == ret { local } else { s });
    }
    Ok(locals.len())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

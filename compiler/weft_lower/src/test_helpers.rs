//! Fixture programs shared by the lowering tests.
//!
//! Every fixture iterator comes with its instance record, instance class,
//! `get_iterator`, and protocol functions, so the same program can be run
//! naively, lowered by any strategy, and compared.

use weft_diagnostic::DiagnosticQueue;
use weft_eval::{EvalError, Evaluator};
use weft_ir::{
    BlockInfo, Expr, FieldDef, FieldRef, FnFlags, FnId, IrBuilder, IteratorInfo, Operand, PrimOp,
    Program, Span, StmtKind, SymId, TypeDef, TypeFlags, TypeId, TypeKind,
};

use crate::{lower_iterators, LowerConfig, LowerResult, LowerSummary};

pub(crate) fn trace_fn(program: &mut Program) -> FnId {
    if let Some(trace) = program.find_fn("trace") {
        return trace;
    }
    let trace = program.new_fn("trace", TypeId::VOID, Span::DUMMY);
    program.func_mut(trace).flags |= FnFlags::EXTERN;
    program.add_formal(trace, "value", TypeId::INT);
    trace
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct IterFixture {
    pub iter: FnId,
    pub irecord: TypeId,
    pub iclass: TypeId,
    pub get_iterator: FnId,
}

impl IterFixture {
    /// `rec = iter(args); ic = get_iterator(rec)`; returns `ic`.
    pub(crate) fn instance(&self, b: &mut IrBuilder<'_>, args: &[Operand]) -> SymId {
        let rec = b.fresh_var("rec", self.irecord);
        b.emit_assign(rec, Expr::call(self.iter, args.iter().copied()));
        let ic = b.fresh_var("ic", self.iclass);
        b.emit_assign(ic, Expr::call(self.get_iterator, [rec.into()]));
        ic
    }
}

fn field(program: &mut Program, name: &str, ty: TypeId) -> FieldDef {
    FieldDef {
        name: program.intern(name),
        ty,
    }
}

/// Record `_ir_<name>` over the formals and class `_ic_<name>` with a
/// `super` header, the formals, then `extra` state fields.
fn instance_types(
    program: &mut Program,
    iter: FnId,
    formals: &[(&str, TypeId)],
    extra: &[(&str, TypeId)],
) -> (TypeId, TypeId) {
    let name = program.fn_name(iter).to_owned();
    let record_fields: Vec<FieldDef> = formals
        .iter()
        .map(|&(n, ty)| field(program, n, ty))
        .collect();
    let record_name = program.intern(&format!("_ir_{name}"));
    let mut irecord = TypeDef::new(record_name, TypeKind::Record)
        .with_flags(TypeFlags::ITERATOR_RECORD)
        .with_fields(record_fields.iter().copied());
    irecord.iterator_fn = Some(iter);
    let irecord = program.add_type(irecord);

    let header = field(program, "super", TypeId::OBJECT);
    let state: Vec<FieldDef> = extra.iter().map(|&(n, ty)| field(program, n, ty)).collect();
    let class_name = program.intern(&format!("_ic_{name}"));
    let mut iclass = TypeDef::new(class_name, TypeKind::Class)
        .with_flags(TypeFlags::ITERATOR_CLASS)
        .with_fields(std::iter::once(header).chain(record_fields).chain(state));
    iclass.header_fields = 1;
    iclass.iterator_fn = Some(iter);
    iclass.dispatch_children.push(TypeId::OBJECT);
    let iclass = program.add_type(iclass);
    (irecord, iclass)
}

/// Copies every record field into the class after its header.
fn build_get_iterator(program: &mut Program, iter: FnId, irecord: TypeId, iclass: TypeId) -> FnId {
    let name = format!("_get_iterator_{}", program.fn_name(iter));
    let fields: Vec<TypeId> = program.ty(irecord).fields.iter().map(|f| f.ty).collect();
    let mut b = IrBuilder::new_fn(program, &name, iclass);
    let rec = b.add_formal("rec", irecord);
    let ic = b.fresh_var("ic", iclass);
    for (i, ty) in (0u32..).zip(fields) {
        let t = b.fresh_var("t", ty);
        b.emit_assign(
            t,
            Expr::GetMemberValue {
                base: rec,
                field: FieldRef::Index(i),
            },
        );
        b.emit_set_member(ic, FieldRef::Index(i + 1), t.into());
    }
    b.emit_return(ic.into());
    b.finish()
}

fn protocol_fn(
    program: &mut Program,
    name: &str,
    iclass: TypeId,
    ret: TypeId,
    body: impl FnOnce(&mut IrBuilder<'_>, SymId),
) -> FnId {
    let mut b = IrBuilder::new_fn(program, name, ret);
    let ic = b.add_formal("ic", iclass);
    body(&mut b, ic);
    b.finish()
}

fn read_field(b: &mut IrBuilder<'_>, ic: SymId, index: u32, ty: TypeId) -> SymId {
    let t = b.fresh_var("t", ty);
    b.emit_assign(
        t,
        Expr::GetMemberValue {
            base: ic,
            field: FieldRef::Index(index),
        },
    );
    t
}

/// `iter <name>(lo, hi) { var i = lo; while i < hi { yield i * scale; i += 1; } }`
///
/// The class keeps `cur` after `lo` and `hi`; the protocol walks it.
pub(crate) fn range_iterator(program: &mut Program, name: &str, scale: i64) -> IterFixture {
    let iter = program.new_fn(name, TypeId::INT, Span::DUMMY);
    program.func_mut(iter).flags |= FnFlags::ITERATOR_FN;
    let lo = program.add_formal(iter, "lo", TypeId::INT);
    let hi = program.add_formal(iter, "hi", TypeId::INT);
    let (irecord, iclass) = instance_types(
        program,
        iter,
        &[("lo", TypeId::INT), ("hi", TypeId::INT)],
        &[("cur", TypeId::INT)],
    );
    let get_iterator = build_get_iterator(program, iter, irecord, iclass);

    let mut b = IrBuilder::for_fn(program, iter);
    let i = b.fresh_var("i", TypeId::INT);
    b.emit_assign(i, Expr::sym(lo));
    let c = b.fresh_var("c", TypeId::BOOL);
    b.emit_assign(c, Expr::prim(PrimOp::Lt, [i.into(), hi.into()]));
    let body = b.emit_block(Some(BlockInfo::CondLoop { cond: c.into() }));
    b.position_at(body);
    let v = b.fresh_var("v", TypeId::INT);
    b.emit_assign(v, Expr::prim(PrimOp::Mul, [i.into(), Operand::int(scale)]));
    b.emit_yield(v.into());
    b.emit_assign(i, Expr::prim(PrimOp::Add, [i.into(), Operand::int(1)]));
    b.emit_assign(c, Expr::prim(PrimOp::Lt, [i.into(), hi.into()]));

    let zip1 = protocol_fn(program, &format!("_{name}_zip1"), iclass, TypeId::VOID, |b, ic| {
        let t = read_field(b, ic, 1, TypeId::INT);
        b.emit_set_member(ic, FieldRef::Index(3), t.into());
    });
    let zip2 = protocol_fn(program, &format!("_{name}_zip2"), iclass, TypeId::VOID, |_, _| {});
    let zip3 = protocol_fn(program, &format!("_{name}_zip3"), iclass, TypeId::VOID, |b, ic| {
        let t = read_field(b, ic, 3, TypeId::INT);
        b.emit_assign(t, Expr::prim(PrimOp::Add, [t.into(), Operand::int(1)]));
        b.emit_set_member(ic, FieldRef::Index(3), t.into());
    });
    let zip4 = protocol_fn(program, &format!("_{name}_zip4"), iclass, TypeId::VOID, |_, _| {});
    let has_more = protocol_fn(program, &format!("_{name}_has_more"), iclass, TypeId::BOOL, |b, ic| {
        let cur = read_field(b, ic, 3, TypeId::INT);
        let hi = read_field(b, ic, 2, TypeId::INT);
        let r = b.fresh_var("r", TypeId::BOOL);
        b.emit_assign(r, Expr::prim(PrimOp::Lt, [cur.into(), hi.into()]));
        b.emit_return(r.into());
    });
    let get_value = protocol_fn(program, &format!("_{name}_get_value"), iclass, TypeId::INT, |b, ic| {
        let cur = read_field(b, ic, 3, TypeId::INT);
        let r = b.fresh_var("r", TypeId::INT);
        b.emit_assign(r, Expr::prim(PrimOp::Mul, [cur.into(), Operand::int(scale)]));
        b.emit_return(r.into());
    });

    program.func_mut(iter).iterator_info = Some(IteratorInfo {
        irecord,
        iclass,
        get_iterator,
        zip1,
        zip2,
        zip3,
        zip4,
        has_more,
        get_value,
    });
    IterFixture {
        iter,
        irecord,
        iclass,
        get_iterator,
    }
}

/// `iter once(v) { yield v; }`, one element with the yield at top level.
pub(crate) fn once_iterator(program: &mut Program) -> IterFixture {
    let iter = program.new_fn("once", TypeId::INT, Span::DUMMY);
    program.func_mut(iter).flags |= FnFlags::ITERATOR_FN;
    let v = program.add_formal(iter, "v", TypeId::INT);
    let (irecord, iclass) = instance_types(
        program,
        iter,
        &[("v", TypeId::INT)],
        &[("more", TypeId::BOOL)],
    );
    let get_iterator = build_get_iterator(program, iter, irecord, iclass);
    IrBuilder::for_fn(program, iter).emit_yield(v.into());

    let zip1 = protocol_fn(program, "_once_zip1", iclass, TypeId::VOID, |b, ic| {
        b.emit_set_member(ic, FieldRef::Index(2), Operand::TRUE);
    });
    let zip2 = protocol_fn(program, "_once_zip2", iclass, TypeId::VOID, |_, _| {});
    let zip3 = protocol_fn(program, "_once_zip3", iclass, TypeId::VOID, |b, ic| {
        b.emit_set_member(ic, FieldRef::Index(2), Operand::FALSE);
    });
    let zip4 = protocol_fn(program, "_once_zip4", iclass, TypeId::VOID, |_, _| {});
    let has_more = protocol_fn(program, "_once_has_more", iclass, TypeId::BOOL, |b, ic| {
        let more = read_field(b, ic, 2, TypeId::BOOL);
        b.emit_return(more.into());
    });
    let get_value = protocol_fn(program, "_once_get_value", iclass, TypeId::INT, |b, ic| {
        let value = read_field(b, ic, 1, TypeId::INT);
        b.emit_return(value.into());
    });

    program.func_mut(iter).iterator_info = Some(IteratorInfo {
        irecord,
        iclass,
        get_iterator,
        zip1,
        zip2,
        zip3,
        zip4,
        has_more,
        get_value,
    });
    IterFixture {
        iter,
        irecord,
        iclass,
        get_iterator,
    }
}

/// ```text
/// inline iter countdown(n) {
///   if n > 0 { for x in countdown(n - 1) { yield x; } }
///   yield n;
/// }
/// ```
///
/// Produces `0..=n`. Its protocol functions are runtime stubs: recursive
/// iterators are only ever consumed through CPS lowering.
pub(crate) fn countdown_iterator(program: &mut Program) -> IterFixture {
    let iter = program.new_fn("countdown", TypeId::INT, Span::DUMMY);
    program.func_mut(iter).flags |= FnFlags::ITERATOR_FN | FnFlags::INLINE_ITERATOR;
    let n = program.add_formal(iter, "n", TypeId::INT);
    let (irecord, iclass) = instance_types(program, iter, &[("n", TypeId::INT)], &[]);
    let get_iterator = build_get_iterator(program, iter, irecord, iclass);
    let fixture = IterFixture {
        iter,
        irecord,
        iclass,
        get_iterator,
    };

    let mut b = IrBuilder::for_fn(program, iter);
    let c = b.fresh_var("c", TypeId::BOOL);
    b.emit_assign(c, Expr::prim(PrimOp::Gt, [n.into(), Operand::int(0)]));
    let (then_block, _) = b.emit_cond(c.into(), false);
    b.position_at(then_block);
    let m = b.fresh_var("m", TypeId::INT);
    b.emit_assign(m, Expr::prim(PrimOp::Sub, [n.into(), Operand::int(1)]));
    let ic = fixture.instance(&mut b, &[m.into()]);
    let x = b.fresh_var("x", TypeId::INT);
    let inner = b.emit_for_loop(x, ic);
    b.position_at(inner);
    b.emit_yield(x.into());
    let body = b.body();
    b.position_at(body);
    b.emit_yield(n.into());

    let stub = |program: &mut Program, op: &str, ret: TypeId| {
        let f = program.new_fn(&format!("_countdown_{op}"), ret, Span::DUMMY);
        program.func_mut(f).flags |= FnFlags::EXTERN;
        program.add_formal(f, "ic", iclass);
        f
    };
    let info = IteratorInfo {
        irecord,
        iclass,
        get_iterator,
        zip1: stub(program, "zip1", TypeId::VOID),
        zip2: stub(program, "zip2", TypeId::VOID),
        zip3: stub(program, "zip3", TypeId::VOID),
        zip4: stub(program, "zip4", TypeId::VOID),
        has_more: stub(program, "has_more", TypeId::BOOL),
        get_value: stub(program, "get_value", TypeId::INT),
    };
    program.func_mut(iter).iterator_info = Some(info);
    fixture
}

/// `main() { for x in iter(args) { trace(x); } }`
pub(crate) fn traced_loop(program: &mut Program, fixture: &IterFixture, args: &[Operand]) -> FnId {
    let trace = trace_fn(program);
    let mut b = IrBuilder::new_fn(program, "main", TypeId::VOID);
    let ic = fixture.instance(&mut b, args);
    let x = b.fresh_var("x", TypeId::INT);
    let body = b.emit_for_loop(x, ic);
    b.position_at(body);
    b.emit_call(trace, [x.into()]);
    b.finish()
}

/// Positional tuple type over `fields`.
pub(crate) fn tuple_type(program: &mut Program, name: &str, fields: &[TypeId]) -> TypeId {
    let fields: Vec<FieldDef> = fields
        .iter()
        .enumerate()
        .map(|(i, &ty)| field(program, &format!("x{i}"), ty))
        .collect();
    let name = program.intern(name);
    program.add_type(
        TypeDef::new(name, TypeKind::Record)
            .with_flags(TypeFlags::TUPLE)
            .with_fields(fields),
    )
}

/// `main() { for (a, b, ..) in zip(iters) { trace(a); trace(b); .. } }`
pub(crate) fn zipped_loop(program: &mut Program, components: &[(IterFixture, &[Operand])]) -> FnId {
    let trace = trace_fn(program);
    let classes: Vec<TypeId> = components.iter().map(|(f, _)| f.iclass).collect();
    let ints = vec![TypeId::INT; components.len()];
    let iter_tuple = tuple_type(program, "_tuple_iters", &classes);
    let index_tuple = tuple_type(program, "_tuple_index", &ints);

    let mut b = IrBuilder::new_fn(program, "main", TypeId::VOID);
    let ics: Vec<SymId> = components
        .iter()
        .map(|(fixture, args)| fixture.instance(&mut b, args))
        .collect();
    let g = b.fresh_var("g", iter_tuple);
    for (i, ic) in (0u32..).zip(ics) {
        b.emit_set_member(g, FieldRef::Index(i), ic.into());
    }
    let idx = b.fresh_var("idx", index_tuple);
    let body = b.emit_for_loop(idx, g);
    b.position_at(body);
    for i in 0..u32::try_from(components.len()).unwrap_or(0) {
        let e = b.fresh_var("e", TypeId::INT);
        b.emit_assign(
            e,
            Expr::GetMemberValue {
                base: idx,
                field: FieldRef::Index(i),
            },
        );
        b.emit_call(trace, [e.into()]);
    }
    b.finish()
}

/// Run `name` on the reference evaluator and collect its traced integers.
pub(crate) fn run(program: &Program, name: &str) -> Result<Vec<i64>, EvalError> {
    let mut eval = Evaluator::new(program);
    eval.run_named(name)?;
    Ok(eval.output_ints())
}

/// Full pipeline with a state-machine lowerer that does nothing.
pub(crate) fn lower(program: &mut Program, config: LowerConfig) -> LowerResult<LowerSummary> {
    let mut diagnostics = DiagnosticQueue::new();
    let mut no_state_machine = |_: &mut Program, _: FnId| -> LowerResult<()> { Ok(()) };
    lower_iterators(program, &config, &mut no_state_machine, &mut diagnostics)
}

/// Statements of `func` matching `pred`.
pub(crate) fn count_stmts(program: &Program, func: FnId, pred: impl Fn(&StmtKind) -> bool) -> usize {
    program
        .fn_stmts(func)
        .into_iter()
        .filter(|&s| pred(program.kind(s)))
        .count()
}

/// Direct calls to `callee` anywhere in `func`.
pub(crate) fn calls_to(program: &Program, func: FnId, callee: FnId) -> usize {
    count_stmts(program, func, |kind| {
        matches!(
            kind,
            StmtKind::Assign { value: Expr::Call { callee: c, .. }, .. }
                | StmtKind::Eval(Expr::Call { callee: c, .. }) if *c == callee
        )
    })
}

pub(crate) fn has_for_loops(program: &Program, func: FnId) -> bool {
    count_stmts(program, func, |kind| {
        matches!(kind.block_info(), Some(BlockInfo::ForLoop(_)))
    }) > 0
}

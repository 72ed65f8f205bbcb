use pretty_assertions::assert_eq;
use weft_diagnostic::ErrorCode;
use weft_ir::{
    BlockInfo, Expr, FieldRef, IrBuilder, Operand, ParallelKind, Span, SymId, TypeId,
};

use super::*;
use crate::test_helpers::{
    countdown_iterator, has_for_loops, lower, once_iterator, range_iterator, run, trace_fn,
    traced_loop, tuple_type, IterFixture,
};

fn ints(values: &[i64]) -> Vec<Operand> {
    values.iter().copied().map(Operand::int).collect()
}

fn traced_body(b: &mut IrBuilder<'_>, trace: FnId, index: SymId, ic: SymId) {
    let top = b.current_block();
    let body = b.emit_for_loop(index, ic);
    b.position_at(body);
    b.emit_call(trace, [index.into()]);
    b.position_at(top);
}

/// `main` with one loop per strategy:
///
/// ```text
/// for x in range(0, 3) { trace(x); }
/// for (a, b) in zip(once(1), once(2)) { trace(a); trace(b); }
/// for x in countdown(2) { trace(x); }
/// ```
fn mixed_program(program: &mut Program) -> FnId {
    let range = range_iterator(program, "range", 1);
    let once = once_iterator(program);
    let countdown = countdown_iterator(program);
    let trace = trace_fn(program);
    let iters = tuple_type(program, "_tuple_iters", &[once.iclass, once.iclass]);
    let index = tuple_type(program, "_tuple_index", &[TypeId::INT, TypeId::INT]);

    let mut b = IrBuilder::new_fn(program, "main", TypeId::VOID);
    let ic = range.instance(&mut b, &ints(&[0, 3]));
    let x = b.fresh_var("x", TypeId::INT);
    traced_body(&mut b, trace, x, ic);

    let first = once.instance(&mut b, &ints(&[1]));
    let second = once.instance(&mut b, &ints(&[2]));
    let g = b.fresh_var("g", iters);
    b.emit_set_member(g, FieldRef::Index(0), first.into());
    b.emit_set_member(g, FieldRef::Index(1), second.into());
    let idx = b.fresh_var("idx", index);
    let top = b.current_block();
    let body = b.emit_for_loop(idx, g);
    b.position_at(body);
    for i in 0..2 {
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
    b.position_at(top);

    let ic = countdown.instance(&mut b, &ints(&[2]));
    let y = b.fresh_var("y", TypeId::INT);
    traced_body(&mut b, trace, y, ic);
    b.finish()
}

#[test]
fn every_strategy_in_one_program() {
    let mut program = Program::new();
    let main = mixed_program(&mut program);

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(
        summary,
        LowerSummary {
            inlined: 1,
            zip_fused: 1,
            // countdown's own recursive loop, through its protocol
            protocol: 1,
            recursive_cps: 1,
            left_for_state_machine: 0,
            generated_fns: 1,
            fragmented_blocks: 0,
            state_machines: 3,
        }
    );
    assert!(program.fn_ids().all(|f| !has_for_loops(&program, f)));
    assert!(!has_for_loops(&program, main));
    assert_eq!(run(&program, "main").unwrap(), vec![0, 1, 2, 1, 2, 0, 1, 2]);
}

#[test]
fn state_machine_sees_each_iterator_once() {
    let mut program = Program::new();
    mixed_program(&mut program);

    let mut seen = Vec::new();
    let mut record = |p: &mut Program, f: FnId| -> LowerResult<()> {
        seen.push(p.fn_name(f).to_owned());
        Ok(())
    };
    let mut diagnostics = DiagnosticQueue::new();
    lower_iterators(&mut program, &LowerConfig::default(), &mut record, &mut diagnostics).unwrap();

    seen.sort();
    assert_eq!(seen, ["countdown", "once", "range"]);
}

#[test]
fn state_machine_errors_stop_the_pass() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 1);
    traced_loop(&mut program, &range, &ints(&[0, 2]));

    let mut failing = |_: &mut Program, _: FnId| -> LowerResult<()> {
        Err(error::internal("cannot build state machine", Span::DUMMY))
    };
    let mut diagnostics = DiagnosticQueue::new();
    let err = lower_iterators(&mut program, &LowerConfig::default(), &mut failing, &mut diagnostics)
        .unwrap_err();
    assert!(matches!(
        err,
        LowerError::Internal { ref message, .. } if message == "cannot build state machine"
    ));
}

#[test]
fn serial_violations_stop_before_any_rewrite() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 1);
    let main = traced_loop(&mut program, &range, &ints(&[0, 2]));

    let mut b = IrBuilder::for_fn(&mut program, range.iter);
    b.emit_block(Some(BlockInfo::Parallel(ParallelKind::Begin)));

    let mut diagnostics = DiagnosticQueue::new();
    let mut no_state_machine = |_: &mut Program, _: FnId| -> LowerResult<()> { Ok(()) };
    let err = lower_iterators(
        &mut program,
        &LowerConfig::default(),
        &mut no_state_machine,
        &mut diagnostics,
    )
    .unwrap_err();

    assert!(matches!(err, LowerError::Stopped(_)));
    assert_eq!(diagnostics.error_count(), 1);
    assert!(has_for_loops(&program, main));
    assert!(program.find_fn("_rec_iter_fn_range").is_none());
}

#[test]
fn program_without_loops_is_untouched() {
    let mut program = Program::new();
    range_iterator(&mut program, "range", 1);

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(
        summary,
        LowerSummary {
            state_machines: 1,
            ..LowerSummary::default()
        }
    );
}

#[test]
fn internal_errors_become_e9001_diagnostics() {
    let err = error::internal("unexpected case", Span::new(4, 9));
    let diag = err.to_diagnostic().unwrap();
    assert_eq!(diag.code, ErrorCode::E9001);
    assert!(err.to_string().contains("unexpected case"));
}

#[test]
fn tracing_can_be_initialized_twice() {
    init_tracing();
    init_tracing();
}

#[test]
fn inline_and_protocol_agree_on_every_fixture() {
    let build: [fn(&mut Program) -> IterFixture; 2] = [
        |p| range_iterator(p, "range", 7),
        once_iterator,
    ];
    for make in build {
        let mut naive = Program::new();
        let fixture = make(&mut naive);
        let args = ints(&[2, 5][..fixture_arity(&naive, &fixture)]);
        traced_loop(&mut naive, &fixture, &args);
        let expected = run(&naive, "main").unwrap();

        for inline in [true, false] {
            let mut program = Program::new();
            let fixture = make(&mut program);
            traced_loop(&mut program, &fixture, &args);
            lower(&mut program, LowerConfig::default().with_inline_iterators(inline)).unwrap();
            assert_eq!(run(&program, "main").unwrap(), expected, "inline = {inline}");
        }
    }
}

fn fixture_arity(program: &Program, fixture: &IterFixture) -> usize {
    program.func(fixture.iter).formals.len()
}

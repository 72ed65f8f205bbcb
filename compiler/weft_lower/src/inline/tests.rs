use pretty_assertions::assert_eq;
use weft_ir::{FnFlags, IrBuilder, PrimOp, TypeId};

use super::*;
use crate::test_helpers::{
    count_stmts, has_for_loops, lower, once_iterator, range_iterator, run, traced_loop,
};
use crate::LowerConfig;

#[test]
fn single_yield_iterator_is_inlined() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 10);
    let main = traced_loop(&mut program, &range, &[Operand::int(0), Operand::int(3)]);
    let naive = run(&program, "main").unwrap();

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.inlined, 1);
    assert_eq!(summary.protocol, 0);
    assert!(!has_for_loops(&program, main));
    assert_eq!(count_stmts(&program, main, StmtKind::is_yield), 0);
    assert_eq!(count_stmts(&program, main, StmtKind::is_return), 0);
    assert_eq!(run(&program, "main").unwrap(), naive);
    assert_eq!(naive, vec![0, 10, 20]);
}

#[test]
fn formals_are_read_from_the_instance() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 1);
    let main = traced_loop(&mut program, &range, &[Operand::int(4), Operand::int(6)]);
    lower(&mut program, LowerConfig::default()).unwrap();

    let instance_reads = count_stmts(&program, main, |kind| {
        matches!(
            kind,
            StmtKind::Assign {
                value: Expr::GetMemberValue { field: FieldRef::Index(1 | 2), .. },
                ..
            }
        )
    });
    assert_eq!(instance_reads, 2);
    assert_eq!(run(&program, "main").unwrap(), vec![4, 5]);
}

#[test]
fn yielded_value_move_is_reused() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 3);
    let main = traced_loop(&mut program, &range, &[Operand::int(0), Operand::int(2)]);
    lower(
        &mut program,
        LowerConfig::default()
            .with_copy_propagation(false)
            .with_dead_code_elimination(false),
    )
    .unwrap();

    let direct_products = count_stmts(&program, main, |kind| {
        matches!(
            kind,
            StmtKind::Assign { dst, value: Expr::Prim { op: PrimOp::Mul, .. } }
                if program.sym_name(*dst) == "_yieldedIndex"
        )
    });
    assert_eq!(direct_products, 1);
    assert_eq!(run(&program, "main").unwrap(), vec![0, 3]);
}

#[test]
fn marked_iterator_with_two_yields_copies_the_body_twice() {
    let mut program = Program::new();
    let once = once_iterator(&mut program);
    program.func_mut(once.iter).flags |= FnFlags::INLINE_ITERATOR;
    let v = program.func(once.iter).formal(0).unwrap();
    let mut b = IrBuilder::for_fn(&mut program, once.iter);
    let w = b.fresh_var("w", TypeId::INT);
    b.emit_assign(w, Expr::prim(PrimOp::Add, [v.into(), Operand::int(1)]));
    b.emit_yield(w.into());

    let trace = crate::test_helpers::trace_fn(&mut program);
    let main = traced_loop(&mut program, &once, &[Operand::int(5)]);
    assert_eq!(run(&program, "main").unwrap(), vec![5, 6]);

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.inlined, 1);
    assert_eq!(crate::test_helpers::calls_to(&program, main, trace), 2);
    assert_eq!(run(&program, "main").unwrap(), vec![5, 6]);
}

#[test]
fn inlining_disabled_uses_the_protocol() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 10);
    let main = traced_loop(&mut program, &range, &[Operand::int(0), Operand::int(3)]);
    let summary = lower(&mut program, LowerConfig::default().with_inline_iterators(false)).unwrap();
    assert_eq!(summary.inlined, 0);
    assert_eq!(summary.protocol, 1);
    let has_more = program.func(range.iter).iterator_info.as_ref().unwrap().has_more;
    assert!(crate::test_helpers::calls_to(&program, main, has_more) > 0);
    assert_eq!(run(&program, "main").unwrap(), vec![0, 10, 20]);
}

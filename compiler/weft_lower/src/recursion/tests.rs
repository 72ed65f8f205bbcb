use pretty_assertions::assert_eq;
use weft_ir::{Expr, FnFlags, IrBuilder, Operand, Program, Span, TypeId};

use super::*;
use crate::test_helpers::{countdown_iterator, range_iterator, traced_loop};

#[test]
fn self_call_is_recursive() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let range = range_iterator(&mut program, "range", 1);
    traced_loop(&mut program, &countdown, &[Operand::int(3)]);

    let graph = CallGraph::build(&program);
    let recursive = compute_recursive_iterators(&program, &graph);
    assert!(recursive.contains(&countdown.iter));
    assert!(!recursive.contains(&range.iter));
}

#[test]
fn recursion_through_a_helper() {
    let mut program = Program::new();
    let iter = program.new_fn("walk", TypeId::INT, Span::DUMMY);
    program.func_mut(iter).flags |= FnFlags::ITERATOR_FN;

    let mut b = IrBuilder::new_fn(&mut program, "helper", TypeId::VOID);
    b.emit_eval(Expr::call(iter, []));
    let helper = b.finish();
    IrBuilder::for_fn(&mut program, iter).emit_eval(Expr::call(helper, []));

    let graph = CallGraph::build(&program);
    let recursive = compute_recursive_iterators(&program, &graph);
    assert_eq!(recursive.into_iter().collect::<Vec<_>>(), vec![iter]);
}

#[test]
fn plain_functions_are_never_reported() {
    let mut program = Program::new();
    let f = program.new_fn("f", TypeId::VOID, Span::DUMMY);
    IrBuilder::for_fn(&mut program, f).emit_eval(Expr::call(f, []));

    let graph = CallGraph::build(&program);
    assert!(compute_recursive_iterators(&program, &graph).is_empty());
    assert_eq!(graph.callers(f), vec![f]);
}

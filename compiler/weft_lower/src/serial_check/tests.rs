use pretty_assertions::assert_eq;
use weft_diagnostic::{DiagnosticConfig, DiagnosticQueue};
use weft_ir::{BlockInfo, FnFlags, IrBuilder, Operand, ParallelKind, Program, TypeId};

use super::*;
use crate::test_helpers::range_iterator;

fn serial_iterator(program: &mut Program, flags: FnFlags) -> FnId {
    let mut b = IrBuilder::new_fn(program, "serial", TypeId::INT);
    b.set_flags(FnFlags::ITERATOR_FN | flags);
    let body = b.body();
    let par = b.emit_block(Some(BlockInfo::Parallel(ParallelKind::Coforall)));
    b.position_at(par);
    b.emit_yield(Operand::int(1));
    b.position_at(body);
    b.emit_block(Some(BlockInfo::On { non_blocking: true }));
    b.finish()
}

#[test]
fn clean_iterators_pass() {
    let mut program = Program::new();
    range_iterator(&mut program, "range", 1);
    let mut queue = DiagnosticQueue::new();
    assert!(check_serial_iterators(&program, &mut queue).is_ok());
    assert_eq!(queue.error_count(), 0);
}

#[test]
fn every_violation_is_reported() {
    let mut program = Program::new();
    serial_iterator(&mut program, FnFlags::empty());
    let mut queue = DiagnosticQueue::new();
    assert!(check_serial_iterators(&program, &mut queue).is_err());
    let codes: Vec<ErrorCode> = queue.flush().iter().map(|d| d.code).collect();
    assert_eq!(codes.len(), 2);
    assert!(codes.contains(&ErrorCode::E7001));
    assert!(codes.contains(&ErrorCode::E7002));
}

#[test]
fn leader_call_is_a_parallel_construct() {
    let mut program = Program::new();
    let leader = program.new_fn("leader", TypeId::VOID, weft_ir::Span::DUMMY);
    program.func_mut(leader).flags |= FnFlags::TO_LEADER;
    let mut b = IrBuilder::new_fn(&mut program, "serial", TypeId::INT);
    b.set_flags(FnFlags::ITERATOR_FN);
    b.emit_call(leader, []);
    b.emit_yield(Operand::int(1));

    let mut queue = DiagnosticQueue::new();
    assert!(check_serial_iterators(&program, &mut queue).is_err());
    let diags = queue.flush();
    assert_eq!(diags.len(), 1);
    assert_eq!(
        diags[0].message,
        "invalid use of parallel construct in serial iterator"
    );
}

#[test]
fn inline_iterators_are_exempt() {
    let mut program = Program::new();
    serial_iterator(&mut program, FnFlags::INLINE_ITERATOR);
    let mut queue = DiagnosticQueue::new();
    assert!(check_serial_iterators(&program, &mut queue).is_ok());
}

#[test]
fn errors_past_the_limit_are_summarized() {
    let mut program = Program::new();
    let mut b = IrBuilder::new_fn(&mut program, "serial", TypeId::INT);
    b.set_flags(FnFlags::ITERATOR_FN);
    for _ in 0..3 {
        b.emit_block(Some(BlockInfo::Parallel(ParallelKind::Begin)));
    }
    b.emit_yield(Operand::int(1));
    b.finish();

    let mut queue = DiagnosticQueue::with_config(DiagnosticConfig {
        error_limit: 2,
        deduplicate: false,
    });
    assert!(check_serial_iterators(&program, &mut queue).is_err());
    let codes: Vec<ErrorCode> = queue.flush().iter().map(|d| d.code).collect();
    assert_eq!(codes, vec![ErrorCode::E7001, ErrorCode::E7001, ErrorCode::E9002]);
}

use pretty_assertions::assert_eq;
use weft_ir::{FnId, IrBuilder, Operand};

use super::*;
use crate::test_helpers::{
    countdown_iterator, has_for_loops, lower, once_iterator, range_iterator, run, traced_loop,
    zipped_loop, IterFixture,
};
use crate::{compute_recursive_iterators, CallGraph, LowerConfig, LowerError};

fn ctx_for(program: &Program, config: LowerConfig) -> LowerCtx {
    let graph = CallGraph::build(program);
    LowerCtx::new(config, compute_recursive_iterators(program, &graph))
}

fn only_loop(program: &Program, func: FnId) -> StmtId {
    let loops: Vec<StmtId> = for_loops(program)
        .into_iter()
        .filter(|&s| program.enclosing_fn(s) == Some(func))
        .collect();
    assert_eq!(loops.len(), 1);
    loops[0]
}

/// `countdown` without its trailing `yield n`: the recursive loop is its
/// only yield, and nothing marks it for inlining.
fn single_yield_countdown(program: &mut Program) -> IterFixture {
    let countdown = countdown_iterator(program);
    program.func_mut(countdown.iter).flags -= FnFlags::INLINE_ITERATOR;
    let body = program.func(countdown.iter).body;
    let last = *program.block_body(body).last().unwrap();
    assert!(program.kind(last).is_yield());
    program.remove(last).unwrap();
    countdown
}

#[test]
fn single_path_iterator_is_inlined() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 1);
    let main = traced_loop(&mut program, &range, &[Operand::int(0), Operand::int(2)]);
    let ctx = ctx_for(&program, LowerConfig::default());

    let block = only_loop(&program, main);
    assert_eq!(classify(&program, &ctx, block).unwrap(), LoweringStrategy::DirectInline);
}

#[test]
fn disabled_inlining_always_uses_the_protocol() {
    let mut program = Program::new();
    let range = range_iterator(&mut program, "range", 1);
    let main = traced_loop(&mut program, &range, &[Operand::int(0), Operand::int(2)]);
    let ctx = ctx_for(&program, LowerConfig::default().with_inline_iterators(false));

    let block = only_loop(&program, main);
    assert_eq!(classify(&program, &ctx, block).unwrap(), LoweringStrategy::Protocol);
}

#[test]
fn zippered_loops_fuse_or_fall_back() {
    let mut program = Program::new();
    let once = once_iterator(&mut program);
    let args = [Operand::int(1)];
    let main = zipped_loop(&mut program, &[(once, &args[..]), (once, &args[..])]);
    let ctx = ctx_for(&program, LowerConfig::default());
    let block = only_loop(&program, main);
    assert_eq!(classify(&program, &ctx, block).unwrap(), LoweringStrategy::ZipFusion);

    let mut program = Program::new();
    let once = once_iterator(&mut program);
    let range = range_iterator(&mut program, "range", 1);
    let (one, bounds) = ([Operand::int(1)], [Operand::int(0), Operand::int(1)]);
    let main = zipped_loop(&mut program, &[(once, &one[..]), (range, &bounds[..])]);
    let ctx = ctx_for(&program, LowerConfig::default());
    let block = only_loop(&program, main);
    assert_eq!(classify(&program, &ctx, block).unwrap(), LoweringStrategy::Protocol);
}

#[test]
fn recursive_iterators_use_cps_except_inside_themselves() {
    let mut program = Program::new();
    let countdown = single_yield_countdown(&mut program);
    let main = traced_loop(&mut program, &countdown, &[Operand::int(2)]);
    let ctx = ctx_for(&program, LowerConfig::default());
    assert!(ctx.is_recursive(countdown.iter));

    let outer = only_loop(&program, main);
    let inner = only_loop(&program, countdown.iter);
    assert_eq!(classify(&program, &ctx, outer).unwrap(), LoweringStrategy::RecursiveCps);
    assert_eq!(classify(&program, &ctx, inner).unwrap(), LoweringStrategy::Skip);
}

#[test]
fn skipped_loops_are_left_for_the_state_machine() {
    let mut program = Program::new();
    let countdown = single_yield_countdown(&mut program);
    let main = traced_loop(&mut program, &countdown, &[Operand::int(2)]);
    let naive = run(&program, "main").unwrap();

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.recursive_cps, 1);
    assert_eq!(summary.left_for_state_machine, 1);
    assert_eq!(summary.generated_fns, 1);
    assert_eq!(summary.state_machines, 1);
    assert!(!has_for_loops(&program, main));
    assert!(has_for_loops(&program, countdown.iter));
    assert_eq!(run(&program, "main").unwrap(), naive);
}

#[test]
fn marked_recursive_iterator_goes_through_cps_first() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let main = traced_loop(&mut program, &countdown, &[Operand::int(2)]);
    let mut ctx = ctx_for(&program, LowerConfig::default());

    inline_marked_iterators(&mut program, &mut ctx).unwrap();
    let summary = ctx.summary();
    assert_eq!(summary.recursive_cps, 1);
    assert_eq!(summary.inlined, 0);
    assert!(!has_for_loops(&program, main));
    // its own recursive loop waits for the remaining-loop pass
    assert!(has_for_loops(&program, countdown.iter));
}

#[test]
fn malformed_header_is_internal() {
    let mut program = Program::new();
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let header = [Operand::int(1)].into_iter().collect();
    let block = b.emit_block(Some(BlockInfo::ForLoop(header)));
    b.finish();
    let ctx = ctx_for(&program, LowerConfig::default());

    assert!(matches!(
        classify(&program, &ctx, block),
        Err(LowerError::Internal { .. })
    ));
}

#[test]
fn strategies_display_in_words() {
    let names: Vec<String> = [
        LoweringStrategy::DirectInline,
        LoweringStrategy::ZipFusion,
        LoweringStrategy::Protocol,
        LoweringStrategy::RecursiveCps,
        LoweringStrategy::Skip,
    ]
    .iter()
    .map(ToString::to_string)
    .collect();
    assert_eq!(
        names,
        ["direct inline", "zip fusion", "protocol", "recursive cps", "skip"]
    );
}

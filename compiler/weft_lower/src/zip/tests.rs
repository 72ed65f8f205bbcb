use pretty_assertions::assert_eq;
use weft_ir::{BlockInfo, IrBuilder, ProtocolOp, TypeId};

use super::*;
use crate::test_helpers::{
    calls_to, has_for_loops, lower, once_iterator, range_iterator, run, tuple_type, zipped_loop,
};
use crate::{LowerConfig, LowerError};

#[test]
fn single_yield_components_fuse_without_protocol_calls() {
    let mut program = Program::new();
    let once = once_iterator(&mut program);
    let (ten, twenty) = ([Operand::int(10)], [Operand::int(20)]);
    let main = zipped_loop(&mut program, &[(once, &ten[..]), (once, &twenty[..])]);

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.zip_fused, 1);
    assert_eq!(summary.protocol, 0);
    assert!(!has_for_loops(&program, main));
    let info = program.func(once.iter).iterator_info.clone().unwrap();
    for op in ProtocolOp::ALL {
        assert_eq!(calls_to(&program, main, info.protocol_fn(op)), 0);
    }
    assert_eq!(run(&program, "main").unwrap(), vec![10, 20]);
}

#[test]
fn nested_yield_prevents_fusion() {
    let mut program = Program::new();
    let once = once_iterator(&mut program);
    let range = range_iterator(&mut program, "range", 1);
    let both = tuple_type(&mut program, "_tuple_pair", &[once.iclass, range.iclass]);
    let onces = tuple_type(&mut program, "_tuple_onces", &[once.iclass, once.iclass]);
    assert!(can_fuse(&program, onces));
    assert!(!can_fuse(&program, both));
    assert!(!can_fuse(&program, range.iclass));
    assert!(can_fuse(&program, once.iclass));
}

/// `for idx in g` with `g: ((a, b), c)` and a matching index tuple.
fn nested_loop(program: &mut Program, index_arity: usize) -> (StmtId, SymId, SymId, FnId) {
    let once = once_iterator(program);
    let inner_iters = tuple_type(program, "_tuple_inner", &[once.iclass, once.iclass]);
    let outer_iters = tuple_type(program, "_tuple_outer", &[inner_iters, once.iclass]);
    let inner_index = tuple_type(program, "_tuple_inner_index", &[TypeId::INT, TypeId::INT]);
    let index_fields: Vec<TypeId> = [inner_index, TypeId::INT, TypeId::INT]
        .into_iter()
        .take(index_arity)
        .collect();
    let outer_index = tuple_type(program, "_tuple_outer_index", &index_fields);

    let mut b = IrBuilder::new_fn(program, "main", TypeId::VOID);
    let g = b.fresh_var("g", outer_iters);
    let idx = b.fresh_var("idx", outer_index);
    let block = b.emit_for_loop(idx, g);
    let main = b.finish();
    (block, idx, g, main)
}

#[test]
fn nested_tuples_flatten_to_leaves() {
    let mut program = Program::new();
    let (block, idx, g, main) = nested_loop(&mut program, 2);
    let setup = setup_simultaneous_iterators(&mut program, block, idx, g, main).unwrap();

    assert_eq!(setup.components.len(), 3);
    assert_eq!(setup.index_defs.len(), 4);
    let targets: Vec<SymId> = setup.index_stores.iter().map(|&(t, _, _)| t).collect();
    assert_eq!(targets.len(), 4);
    assert_eq!(&targets[2..], &[idx, idx]);
    assert_eq!(targets[0], targets[1]);
    assert_eq!(setup.index_stores[2].2, targets[0]);

    // one `Def` and one read per tuple component, all before the loop
    let before = program
        .block_body(program.func(main).body)
        .iter()
        .take_while(|&&s| s != block)
        .count();
    assert_eq!(before, 2 + 2 * 4);
    assert!(matches!(
        program.kind(block).block_info(),
        Some(BlockInfo::ForLoop(_))
    ));
}

#[test]
fn arity_mismatch_is_internal() {
    let mut program = Program::new();
    let (block, idx, g, main) = nested_loop(&mut program, 1);
    let err = setup_simultaneous_iterators(&mut program, block, idx, g, main).unwrap_err();
    assert!(matches!(err, LowerError::Internal { .. }));
}

#[test]
fn plain_iterator_is_one_component() {
    let mut program = Program::new();
    let once = once_iterator(&mut program);
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let ic = once.instance(&mut b, &[Operand::int(1)]);
    let x = b.fresh_var("x", TypeId::INT);
    let block = b.emit_for_loop(x, ic);
    let main = b.finish();

    let setup = setup_simultaneous_iterators(&mut program, block, x, ic, main).unwrap();
    assert_eq!(setup.components, vec![(ic, x)]);
    assert!(setup.index_defs.is_empty());
    assert!(setup.index_stores.is_empty());
}

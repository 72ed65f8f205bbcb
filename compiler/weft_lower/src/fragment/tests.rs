use pretty_assertions::assert_eq;
use weft_ir::{Expr, FnId, IrBuilder, Operand, PrimOp, TypeId};

use super::*;
use crate::test_helpers::{run, trace_fn};

#[derive(Clone, Debug)]
enum Op {
    Trace(i64),
    Decl(i64),
    /// `goto l; trace(skipped); l:`
    Skip(i64),
    Nested(Vec<i64>),
    Cond(bool, Vec<i64>),
    Return,
}

/// `main() { local { ops } trace(-1); }`
fn build(program: &mut Program, ops: &[Op]) -> (FnId, StmtId) {
    let trace = trace_fn(program);
    let mut b = IrBuilder::new_fn(program, "main", TypeId::VOID);
    let body = b.body();
    let local = b.emit_block(Some(BlockInfo::Local));
    b.position_at(local);
    for op in ops {
        match op {
            Op::Trace(v) => {
                b.emit_call(trace, [Operand::int(*v)]);
            }
            Op::Decl(v) => {
                let t = b.fresh_var("t", TypeId::INT);
                b.emit_assign(t, Expr::prim(PrimOp::Add, [Operand::int(*v), Operand::int(0)]));
                b.emit_call(trace, [t.into()]);
            }
            Op::Skip(v) => {
                let label = b.new_label("skip");
                b.emit_goto(label);
                b.emit_call(trace, [Operand::int(*v)]);
                b.emit_label(label);
            }
            Op::Nested(vs) => {
                let nested = b.emit_block(None);
                b.position_at(nested);
                for v in vs {
                    b.emit_call(trace, [Operand::int(*v)]);
                }
                b.position_at(local);
            }
            Op::Cond(taken, vs) => {
                let cond = if *taken { Operand::TRUE } else { Operand::FALSE };
                let (then_block, _) = b.emit_cond(cond, false);
                b.position_at(then_block);
                for v in vs {
                    b.emit_call(trace, [Operand::int(*v)]);
                }
                b.position_at(local);
            }
            Op::Return => {
                b.emit_return(Operand::VOID);
            }
        }
    }
    b.position_at(body);
    b.emit_call(trace, [Operand::int(-1)]);
    (b.finish(), local)
}

fn transfers_control(program: &Program, stmt: StmtId) -> bool {
    match program.kind(stmt) {
        StmtKind::Yield(_) | StmtKind::Return(_) | StmtKind::Goto(_) => true,
        StmtKind::Def(sym) => program.sym(*sym).is_label(),
        _ => false,
    }
}

/// No local block directly holds a yield, return, goto, or label.
fn assert_no_escaping_children(program: &Program, func: FnId) {
    for stmt in program.fn_stmts(func) {
        if matches!(program.kind(stmt).block_info(), Some(BlockInfo::Local)) {
            for &child in program.block_body(stmt) {
                assert!(
                    !transfers_control(program, child),
                    "local block holds {:?}",
                    program.kind(child)
                );
            }
        }
    }
}

#[test]
fn straight_line_local_is_untouched() {
    let mut program = Program::new();
    let (main, local) = build(&mut program, &[Op::Trace(1), Op::Decl(2)]);
    assert_eq!(fragment_local_blocks(&mut program).unwrap(), 0);
    assert_eq!(
        program.kind(local).block_info(),
        Some(&BlockInfo::Local),
    );
    assert_eq!(run(&program, "main").unwrap(), vec![1, 2, -1]);
    assert!(program.is_within(local, program.func(main).body));
}

#[test]
fn splits_around_goto_and_label() {
    let mut program = Program::new();
    let (main, local) = build(
        &mut program,
        &[Op::Trace(1), Op::Decl(2), Op::Skip(99), Op::Trace(3)],
    );
    assert_eq!(fragment_local_blocks(&mut program).unwrap(), 1);
    assert_eq!(program.kind(local).block_info(), None);
    assert_no_escaping_children(&program, main);

    let body = program.block_body(local);
    // decl, local { trace(1); t = ..; trace(t) }, goto, local { trace(99) }, label, local { trace(3) }
    assert!(matches!(program.kind(body[0]), StmtKind::Def(_)));
    assert_eq!(program.block_body(body[1]).len(), 3);
    assert!(matches!(program.kind(body[2]), StmtKind::Goto(_)));
    assert_eq!(run(&program, "main").unwrap(), vec![1, 2, 3, -1]);
}

#[test]
fn nested_blocks_and_branches_are_fragmented() {
    let mut program = Program::new();
    let (main, _) = build(
        &mut program,
        &[
            Op::Nested(vec![1, 2]),
            Op::Cond(true, vec![3]),
            Op::Cond(false, vec![4]),
            Op::Return,
        ],
    );
    fragment_local_blocks(&mut program).unwrap();
    assert_no_escaping_children(&program, main);
    assert_eq!(run(&program, "main").unwrap(), vec![1, 2, 3]);
}

#[test]
fn nested_block_without_escapes_stays_in_its_local() {
    let mut program = Program::new();
    let (main, local) = build(&mut program, &[Op::Nested(vec![])]);
    assert_eq!(fragment_local_blocks(&mut program).unwrap(), 0);
    assert_eq!(program.kind(local).block_info(), Some(&BlockInfo::Local));
    assert_no_escaping_children(&program, main);
    assert_eq!(run(&program, "main").unwrap(), vec![-1]);
}

#[test]
fn unmarked_blocks_are_ignored() {
    let mut program = Program::new();
    let trace = trace_fn(&mut program);
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let label = b.new_label("l");
    b.emit_goto(label);
    b.emit_call(trace, [Operand::int(1)]);
    b.emit_label(label);
    let main = b.finish();
    let before = program.fn_stmts(main).len();
    assert_eq!(fragment_local_blocks(&mut program).unwrap(), 0);
    assert_eq!(program.fn_stmts(main).len(), before);
}

mod proptest_fragment {
    use proptest::prelude::*;

    use super::*;

    fn op() -> impl Strategy<Value = Op> {
        let values = || proptest::collection::vec(0i64..100, 0..4);
        prop_oneof![
            4 => (0i64..100).prop_map(Op::Trace),
            2 => (0i64..100).prop_map(Op::Decl),
            1 => (0i64..100).prop_map(Op::Skip),
            1 => values().prop_map(Op::Nested),
            1 => (any::<bool>(), values()).prop_map(|(t, vs)| Op::Cond(t, vs)),
            1 => Just(Op::Return),
        ]
    }

    proptest! {
        #[test]
        fn fragmentation_preserves_output(ops in proptest::collection::vec(op(), 0..24)) {
            let mut program = Program::new();
            let (main, _) = build(&mut program, &ops);
            let before = run(&program, "main").unwrap();
            fragment_local_blocks(&mut program).unwrap();
            let after = run(&program, "main").unwrap();
            prop_assert_eq!(before, after);
            assert_no_escaping_children(&program, main);
        }
    }
}

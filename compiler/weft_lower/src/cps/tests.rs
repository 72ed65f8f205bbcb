use pretty_assertions::assert_eq;
use weft_ir::{IrBuilder, PrimOp};

use super::flatten::free_captures;
use super::*;
use crate::test_helpers::{
    calls_to, count_stmts, countdown_iterator, has_for_loops, lower, run, trace_fn, traced_loop,
};
use crate::{LowerConfig, LowerError};

fn fns_named(program: &Program, name: &str) -> usize {
    program.fn_ids().filter(|&f| program.fn_name(f) == name).count()
}

#[test]
fn recursive_loop_matches_naive_output() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let main = traced_loop(&mut program, &countdown, &[Operand::int(3)]);
    let naive = run(&program, "main").unwrap();
    assert_eq!(naive, vec![0, 1, 2, 3]);

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.recursive_cps, 1);
    assert_eq!(summary.generated_fns, 1);
    assert!(!has_for_loops(&program, main));
    assert_eq!(fns_named(&program, "_rec_iter_fn_countdown"), 1);
    assert_eq!(fns_named(&program, "_rec_iter_loop_main"), 1);
    assert_eq!(fns_named(&program, "_rec_iter_loop_wrapper_main"), 1);
    assert_eq!(program.ftable.len(), 1);
    assert_eq!(run(&program, "main").unwrap(), naive);
}

#[test]
fn generated_iterator_calls_back_instead_of_yielding() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let name = program.intern("_fn_arg_bundle");
    let bundle = program.add_type(
        TypeDef::new(name, TypeKind::Record).with_flags(TypeFlags::ARG_BUNDLE),
    );
    let generated = build_recursive_fn(&mut program, countdown.iter, bundle, Span::DUMMY).unwrap();

    let def = program.func(generated);
    assert!(def.flags.contains(FnFlags::GENERATED));
    assert!(!def.flags.contains(FnFlags::ITERATOR_FN));
    let formal_types: Vec<TypeId> = def.formals.iter().map(|&f| program.sym_ty(f)).collect();
    assert_eq!(formal_types, vec![countdown.iclass, TypeId::INT, bundle]);

    assert_eq!(count_stmts(&program, generated, StmtKind::is_yield), 0);
    assert!(!has_for_loops(&program, generated));
    // the nested loop over itself becomes a direct recursive call
    assert_eq!(calls_to(&program, generated, generated), 1);
    let callbacks = count_stmts(&program, generated, |kind| {
        matches!(kind, StmtKind::Eval(Expr::FtableCall { .. }))
    });
    assert_eq!(callbacks, 1);
    // the source iterator is left alone
    assert_eq!(program.yields_in(program.func(countdown.iter).body).len(), 2);
}

#[test]
fn equivalent_sites_share_one_generated_function() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let trace = trace_fn(&mut program);
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    for n in [2, 3] {
        let ic = countdown.instance(&mut b, &[Operand::int(n)]);
        let x = b.fresh_var("x", TypeId::INT);
        let body = b.emit_for_loop(x, ic);
        b.position_at(body);
        b.emit_call(trace, [x.into()]);
        let top = b.body();
        b.position_at(top);
    }
    b.finish();
    let naive = run(&program, "main").unwrap();

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.recursive_cps, 2);
    assert_eq!(summary.generated_fns, 1);
    assert_eq!(fns_named(&program, "_rec_iter_fn_countdown"), 1);
    assert_eq!(fns_named(&program, "_rec_iter_loop_wrapper_main"), 2);
    assert_eq!(program.ftable.len(), 2);
    assert_eq!(run(&program, "main").unwrap(), naive);
    assert_eq!(naive, vec![0, 1, 2, 0, 1, 2, 3]);
}

#[test]
fn sites_with_different_captures_get_their_own_function() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let trace = trace_fn(&mut program);

    // for x in countdown(2) { trace(x); }
    // var k = 10; var j = true;
    // for x in countdown(1) { var y = x + k; var z = j; trace(y); }
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let ic = countdown.instance(&mut b, &[Operand::int(2)]);
    let x = b.fresh_var("x", TypeId::INT);
    let body = b.emit_for_loop(x, ic);
    b.position_at(body);
    b.emit_call(trace, [x.into()]);
    let top = b.body();
    b.position_at(top);

    let k = b.fresh_var("k", TypeId::INT);
    b.emit_assign(k, Expr::Use(Operand::int(10)));
    let j = b.fresh_var("j", TypeId::BOOL);
    b.emit_assign(j, Expr::Use(Operand::TRUE));
    let ic = countdown.instance(&mut b, &[Operand::int(1)]);
    let x = b.fresh_var("x", TypeId::INT);
    let body = b.emit_for_loop(x, ic);
    b.position_at(body);
    let y = b.fresh_var("y", TypeId::INT);
    b.emit_assign(y, Expr::prim(PrimOp::Add, [x.into(), k.into()]));
    let z = b.fresh_var("z", TypeId::BOOL);
    b.emit_assign(z, Expr::sym(j));
    b.emit_call(trace, [y.into()]);
    b.finish();
    let naive = run(&program, "main").unwrap();
    assert_eq!(naive, vec![0, 1, 2, 10, 11]);

    let summary = lower(&mut program, LowerConfig::default()).unwrap();
    assert_eq!(summary.recursive_cps, 2);
    assert_eq!(summary.generated_fns, 2);
    let mut arities: Vec<usize> = program
        .fn_ids()
        .filter(|&f| program.fn_name(f) == "_rec_iter_loop_main")
        .map(|f| program.func(f).formals.len())
        .collect();
    arities.sort_unstable();
    assert_eq!(arities, vec![1, 3]);
    assert_eq!(fns_named(&program, "_rec_iter_fn_countdown"), 2);
    assert_eq!(run(&program, "main").unwrap(), naive);
}

#[test]
fn return_symbol_is_localized_per_block() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let trace = trace_fn(&mut program);

    // countdown(n) { var r = n + 100; if n > 0 { trace(r); .. } yield n; }
    let iter = countdown.iter;
    let n = program.func(iter).formal(0).unwrap();
    let r = program.new_local(iter, "r", TypeId::INT);
    program.func_mut(iter).ret_sym = Some(r);
    let body = program.func(iter).body;
    let then_block = program
        .fn_stmts(iter)
        .into_iter()
        .find_map(|s| match program.kind(s) {
            StmtKind::Cond { then_block, .. } => Some(*then_block),
            _ => None,
        })
        .unwrap();
    let read = program.new_stmt(StmtKind::Eval(Expr::call(trace, [r.into()])), Span::DUMMY);
    program.insert_at_head(then_block, read).unwrap();
    let init = program.new_stmt(
        StmtKind::Assign {
            dst: r,
            value: Expr::prim(PrimOp::Add, [n.into(), Operand::int(100)]),
        },
        Span::DUMMY,
    );
    program.insert_at_head(body, init).unwrap();
    let def = program.new_stmt(StmtKind::Def(r), Span::DUMMY);
    program.insert_at_head(body, def).unwrap();

    traced_loop(&mut program, &countdown, &[Operand::int(2)]);
    let naive = run(&program, "main").unwrap();
    assert_eq!(naive, vec![102, 101, 0, 1, 2]);

    lower(&mut program, LowerConfig::default()).unwrap();
    let generated = program.find_fn("_rec_iter_fn_countdown").unwrap();
    let ret_defs = count_stmts(&program, generated, |kind| {
        matches!(kind, StmtKind::Def(sym) if program.sym_name(*sym) == "r")
    });
    assert_eq!(ret_defs, 2);
    assert_eq!(run(&program, "main").unwrap(), naive);
}

#[test]
fn written_captures_travel_by_reference() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let trace = trace_fn(&mut program);

    // var s = 0; for x in countdown(3) { s = s + x; } trace(s);
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let s = b.fresh_var("s", TypeId::INT);
    b.emit_assign(s, Expr::Use(Operand::int(0)));
    let ic = countdown.instance(&mut b, &[Operand::int(3)]);
    let x = b.fresh_var("x", TypeId::INT);
    let body = b.emit_for_loop(x, ic);
    b.position_at(body);
    b.emit_assign(s, Expr::prim(PrimOp::Add, [s.into(), x.into()]));
    let top = b.body();
    b.position_at(top);
    b.emit_call(trace, [s.into()]);
    let main = b.finish();

    lower(&mut program, LowerConfig::default()).unwrap();
    let addr_ofs = count_stmts(&program, main, |kind| {
        matches!(kind, StmtKind::Assign { value: Expr::AddrOf(sym), .. } if *sym == s)
    });
    assert_eq!(addr_ofs, 1);
    let body_fn = program.find_fn("_rec_iter_loop_main").unwrap();
    let captured = program.func(body_fn).formal(1).unwrap();
    assert!(program.is_ref(program.sym_ty(captured)));
    let stores = count_stmts(&program, body_fn, |kind| matches!(kind, StmtKind::Store { .. }));
    assert_eq!(stores, 1);
    assert_eq!(run(&program, "main").unwrap(), vec![6]);
}

#[test]
fn read_only_captures_travel_by_value() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let trace = trace_fn(&mut program);

    // var k = 10; for x in countdown(2) { trace(x + k); }
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let k = b.fresh_var("k", TypeId::INT);
    b.emit_assign(k, Expr::Use(Operand::int(10)));
    let ic = countdown.instance(&mut b, &[Operand::int(2)]);
    let x = b.fresh_var("x", TypeId::INT);
    let body = b.emit_for_loop(x, ic);
    b.position_at(body);
    let y = b.fresh_var("y", TypeId::INT);
    b.emit_assign(y, Expr::prim(PrimOp::Add, [x.into(), k.into()]));
    b.emit_call(trace, [y.into()]);
    b.finish();

    lower(&mut program, LowerConfig::default()).unwrap();
    let body_fn = program.find_fn("_rec_iter_loop_main").unwrap();
    let captured = program.func(body_fn).formal(1).unwrap();
    assert_eq!(program.sym_ty(captured), TypeId::INT);
    assert_eq!(run(&program, "main").unwrap(), vec![10, 11, 12]);
}

#[test]
fn return_in_loop_body_is_internal() {
    let mut program = Program::new();
    let countdown = countdown_iterator(&mut program);
    let mut b = IrBuilder::new_fn(&mut program, "main", TypeId::VOID);
    let ic = countdown.instance(&mut b, &[Operand::int(2)]);
    let x = b.fresh_var("x", TypeId::INT);
    let body = b.emit_for_loop(x, ic);
    b.position_at(body);
    b.emit_return(Operand::VOID);
    b.finish();

    let err = lower(&mut program, LowerConfig::default()).unwrap_err();
    assert!(matches!(err, LowerError::Internal { .. }), "{err:?}");
}

#[test]
fn free_symbols_in_first_appearance_order() {
    let mut program = Program::new();
    let mut outer = IrBuilder::new_fn(&mut program, "outer", TypeId::VOID);
    let k = outer.fresh_var("k", TypeId::INT);
    let s = outer.fresh_var("s", TypeId::INT);
    let t = outer.fresh_var("t", TypeId::INT);
    outer.finish();

    // body(x) { var a = k + x; s = a; &t; goto l; l: }
    let mut b = IrBuilder::new_fn(&mut program, "body", TypeId::VOID);
    let x = b.add_formal("x", TypeId::INT);
    let a = b.fresh_var("a", TypeId::INT);
    b.emit_assign(a, Expr::prim(PrimOp::Add, [k.into(), x.into()]));
    b.emit_assign(s, Expr::sym(a));
    b.emit_eval(Expr::AddrOf(t));
    let l = b.new_label("l");
    b.emit_goto(l);
    b.emit_label(l);
    let body = b.finish();

    let captures = free_captures(&program, body).unwrap();
    assert_eq!(
        captures,
        vec![
            Capture { sym: k, by_ref: false },
            Capture { sym: s, by_ref: true },
            Capture { sym: t, by_ref: true },
        ]
    );
}

#[test]
fn goto_out_of_the_body_is_internal() {
    let mut program = Program::new();
    let mut outer = IrBuilder::new_fn(&mut program, "outer", TypeId::VOID);
    let l = outer.new_label("done");
    outer.emit_label(l);
    outer.finish();

    let mut b = IrBuilder::new_fn(&mut program, "body", TypeId::VOID);
    b.emit_goto(l);
    let body = b.finish();
    assert!(matches!(
        free_captures(&program, body),
        Err(LowerError::Internal { .. })
    ));
}

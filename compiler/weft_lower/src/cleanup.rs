//! Small body cleanups run on iterator functions between lowering stages.
//!
//! Each pass is conservative: it only fires on shapes whose rewrite is
//! obviously behavior-preserving, and reports how many rewrites it made.

use rustc_hash::{FxHashMap, FxHashSet};
use weft_ir::{BlockInfo, Expr, FnId, Operand, Program, StmtId, StmtKind, SymFlags, SymId, SymKind};

use crate::{LowerConfig, LowerResult};

/// Cleanup of one iterator body before state-machine lowering.
pub fn cleanup_iterator(program: &mut Program, func: FnId, config: &LowerConfig) -> LowerResult<()> {
    let collapsed = collapse_blocks(program, func)?;
    let gotos = remove_unnecessary_gotos(program, func)?;
    let propagated = if config.copy_propagation {
        local_copy_propagation(program, func)?
    } else {
        0
    };
    let (dead_vars, dead_exprs) = if config.dead_code_elimination {
        (
            dead_variable_elimination(program, func)?,
            dead_expression_elimination(program, func)?,
        )
    } else {
        (0, 0)
    };
    tracing::debug!(
        func = program.fn_name(func),
        collapsed,
        gotos,
        propagated,
        dead_vars,
        dead_exprs,
        "cleaned iterator body"
    );
    Ok(())
}

/// Splice unmarked blocks into the block that contains them.
///
/// Conditional branches and the function body stay blocks.
pub fn collapse_blocks(program: &mut Program, func: FnId) -> LowerResult<usize> {
    let mut count = 0;
    for id in program.fn_stmts(func).into_iter().rev() {
        let plain = matches!(program.kind(id), StmtKind::Block { info: None, .. });
        let in_block = program
            .parent(id)
            .is_some_and(|p| matches!(program.kind(p), StmtKind::Block { .. }));
        if plain && in_block {
            program.splice_before(id, id)?;
            program.remove(id)?;
            count += 1;
        }
    }
    Ok(count)
}

/// Drop a goto that jumps to the statement right after it, then every
/// label nothing jumps to.
pub fn remove_unnecessary_gotos(program: &mut Program, func: FnId) -> LowerResult<usize> {
    let mut count = 0;
    for id in program.fn_stmts(func) {
        let StmtKind::Goto(label) = *program.kind(id) else {
            continue;
        };
        let falls_through = program
            .next_sibling(id)
            .is_some_and(|next| matches!(program.kind(next), StmtKind::Def(l) if *l == label));
        if falls_through {
            program.remove(id)?;
            count += 1;
        }
    }

    let stmts = program.fn_stmts(func);
    let targets: FxHashSet<SymId> = stmts
        .iter()
        .filter_map(|&id| match program.kind(id) {
            StmtKind::Goto(label) => Some(*label),
            _ => None,
        })
        .collect();
    for id in stmts {
        if let StmtKind::Def(sym) = *program.kind(id) {
            if program.sym(sym).is_label() && !targets.contains(&sym) {
                program.remove(id)?;
                count += 1;
            }
        }
    }
    Ok(count)
}

#[derive(Default)]
struct SymUses {
    assigns: FxHashMap<SymId, Vec<StmtId>>,
    defs: FxHashMap<SymId, Vec<StmtId>>,
    pinned: FxHashSet<SymId>,
}

impl SymUses {
    fn collect(program: &Program, func: FnId) -> Self {
        let mut uses = SymUses::default();
        for id in program.fn_stmts(func) {
            match program.kind(id) {
                StmtKind::Def(sym) => uses.defs.entry(*sym).or_default().push(id),
                StmtKind::Assign { dst, value } => {
                    uses.assigns.entry(*dst).or_default().push(id);
                    if let Expr::AddrOf(sym) = value {
                        uses.pinned.insert(*sym);
                    }
                }
                StmtKind::Eval(Expr::AddrOf(sym)) => {
                    uses.pinned.insert(*sym);
                }
                StmtKind::Block {
                    info: Some(BlockInfo::ForLoop(ops)),
                    ..
                } => uses.pinned.extend(ops.iter().filter_map(|op| op.as_sym())),
                _ => {}
            }
        }
        if let Some(ret) = program.func(func).ret_sym {
            uses.pinned.insert(ret);
        }
        uses
    }

    fn assign_count(&self, sym: SymId) -> usize {
        self.assigns.get(&sym).map_or(0, Vec::len)
    }
}

/// Forward `a = b` copies into the reads of `a`.
///
/// Fires when `a` is a temporary assigned once and every read of `a` comes
/// later in the same block, and `b` cannot change over that stretch: either
/// a formal that is never written, or a local assigned once earlier in the
/// same block and not redeclared after that. Neither may have its address
/// taken or appear in a loop header.
pub fn local_copy_propagation(program: &mut Program, func: FnId) -> LowerResult<usize> {
    let uses = SymUses::collect(program, func);
    let body = program.func(func).body;
    let mut count = 0;
    for id in program.fn_stmts(func) {
        let StmtKind::Assign {
            dst,
            value: Expr::Use(Operand::Sym(src)),
        } = *program.kind(id)
        else {
            continue;
        };
        if !copy_is_forwardable(program, &uses, id, dst, src) {
            continue;
        }
        let Some(block) = program.parent(id) else {
            continue;
        };
        let siblings = program.block_body(block);
        let Some(pos) = siblings.iter().position(|&s| s == id) else {
            continue;
        };
        let later = &siblings[pos + 1..];
        let readers: Vec<StmtId> = program
            .stmts_mentioning(body, dst)
            .into_iter()
            .filter(|&s| s != id && !matches!(program.kind(s), StmtKind::Def(_)))
            .collect();
        let contained = readers
            .iter()
            .all(|&r| later.iter().any(|&l| program.is_within(r, l)));
        if !contained || !source_is_stable(program, &uses, block, pos, src) {
            continue;
        }
        for reader in readers {
            program.kind_mut(reader).rewrite_syms(&mut |s| if s == dst { src } else { s });
        }
        tracing::trace!(
            from = program.sym_name(dst),
            to = program.sym_name(src),
            "propagated copy"
        );
        count += 1;
    }
    Ok(count)
}

fn copy_is_forwardable(program: &Program, uses: &SymUses, id: StmtId, dst: SymId, src: SymId) -> bool {
    let dst_sym = program.sym(dst);
    dst != src
        && dst_sym.kind == SymKind::Var
        && dst_sym.flags.contains(SymFlags::TEMP)
        && dst_sym.ty == program.sym_ty(src)
        && uses.assigns.get(&dst).is_some_and(|a| a.as_slice() == [id])
        && !uses.pinned.contains(&dst)
        && !uses.pinned.contains(&src)
}

/// `src` holds one value from before `pos` in `block` to the block's end.
fn source_is_stable(program: &Program, uses: &SymUses, block: StmtId, pos: usize, src: SymId) -> bool {
    match program.sym(src).kind {
        SymKind::Arg => uses.assign_count(src) == 0,
        SymKind::Var => {
            let Some(&[assign]) = uses.assigns.get(&src).map(Vec::as_slice) else {
                return false;
            };
            let siblings = program.block_body(block);
            let Some(assign_pos) = siblings[..pos].iter().position(|&s| s == assign) else {
                return false;
            };
            let redeclared = uses.defs.get(&src).is_some_and(|defs| {
                defs.iter().any(|&d| {
                    siblings[assign_pos + 1..]
                        .iter()
                        .any(|&s| program.is_within(d, s))
                })
            });
            !redeclared
        }
        SymKind::Label => false,
    }
}

/// Remove locals that are never read, along with their pure assignments.
/// Assignments with effects keep their right-hand side as an expression
/// statement. Repeats until nothing changes.
pub fn dead_variable_elimination(program: &mut Program, func: FnId) -> LowerResult<usize> {
    let ret = program.func(func).ret_sym;
    let mut count = 0;
    loop {
        let stmts = program.fn_stmts(func);
        let mut read = FxHashSet::default();
        for &id in &stmts {
            program.kind(id).for_each_read(&mut |s| {
                read.insert(s);
            });
        }
        let dead: FxHashSet<SymId> = stmts
            .iter()
            .filter_map(|&id| match program.kind(id) {
                StmtKind::Def(sym) => Some(*sym),
                _ => None,
            })
            .filter(|&sym| {
                program.sym(sym).kind == SymKind::Var && Some(sym) != ret && !read.contains(&sym)
            })
            .collect();
        if dead.is_empty() {
            return Ok(count);
        }
        for id in stmts {
            // `Some(None)` removes the statement, `Some(Some(e))` keeps `e`.
            let rewrite = match program.kind(id) {
                StmtKind::Def(sym) if dead.contains(sym) => Some(None),
                StmtKind::Assign { dst, value } if dead.contains(dst) => {
                    Some((!value.is_pure()).then(|| value.clone()))
                }
                _ => None,
            };
            match rewrite {
                Some(None) => program.remove(id)?,
                Some(Some(value)) => *program.kind_mut(id) = StmtKind::Eval(value),
                None => {}
            }
        }
        count += dead.len();
    }
}

/// Remove expression statements without effects, and no-ops.
pub fn dead_expression_elimination(program: &mut Program, func: FnId) -> LowerResult<usize> {
    let mut count = 0;
    for id in program.fn_stmts(func) {
        let dead = match program.kind(id) {
            StmtKind::Eval(value) => value.is_pure(),
            StmtKind::Noop => true,
            _ => false,
        };
        if dead {
            program.remove(id)?;
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

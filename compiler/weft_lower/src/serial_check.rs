//! Rejects parallel and remote constructs inside serial iterators.
//!
//! A serial iterator's body may end up spliced into arbitrary loops, so it
//! must not spawn tasks or migrate execution. Iterators flagged
//! `INLINE_ITERATOR` are exempt. Every offending construct is reported
//! before the pass stops.

use weft_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode, ErrorGuaranteed};
use weft_ir::{BlockInfo, FnFlags, FnId, Program, StmtKind};

use crate::call_graph::direct_callee;

pub fn check_serial_iterators(
    program: &Program,
    diagnostics: &mut DiagnosticQueue,
) -> Result<(), ErrorGuaranteed> {
    let mut reported = None;
    for func in program.fn_ids() {
        let flags = program.func(func).flags;
        if !flags.contains(FnFlags::ITERATOR_FN) || flags.contains(FnFlags::INLINE_ITERATOR) {
            continue;
        }
        for stmt in program.fn_stmts(func) {
            let Some(code) = violation(program, program.kind(stmt)) else {
                continue;
            };
            let message = match code {
                ErrorCode::E7002 => "invalid use of 'on' in serial iterator",
                _ => "invalid use of parallel construct in serial iterator",
            };
            let diag = Diagnostic::error(code)
                .with_message(message)
                .with_label(program.span(stmt), "not allowed here")
                .with_note(format!(
                    "`{}` is a serial iterator",
                    program.fn_name(func)
                ));
            reported = Some(diagnostics.emit_error(diag));
        }
    }
    match reported {
        Some(guarantee) => {
            tracing::debug!("serial iterator check failed");
            Err(guarantee)
        }
        None => Ok(()),
    }
}

fn violation(program: &Program, kind: &StmtKind) -> Option<ErrorCode> {
    match kind.block_info() {
        Some(BlockInfo::Parallel(_)) => return Some(ErrorCode::E7001),
        Some(BlockInfo::On { .. }) => return Some(ErrorCode::E7002),
        _ => {}
    }
    let callee: FnId = direct_callee(kind)?;
    program
        .func(callee)
        .flags
        .contains(FnFlags::TO_LEADER)
        .then_some(ErrorCode::E7001)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

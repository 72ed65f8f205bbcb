//! Iterator lowering for the Weft middle end.
//!
//! Turns every `for` loop over an iterator instance into plain control flow,
//! picking the cheapest strategy per loop:
//!
//! - **Direct inline** ([`inline`]): copy a single-path iterator body in
//!   place of the loop, the loop body standing in for the yield.
//! - **Zip fusion** ([`zip`]): zippered loops whose components each yield
//!   exactly once run as one straight-line block.
//! - **Protocol** ([`protocol`]): drive the iterator through its
//!   `zip1..zip4/hasMore/getValue` functions with runtime subtype dispatch.
//! - **Recursive CPS** ([`cps`]): hand the loop body as a callback to a
//!   generated copy of a recursive iterator.
//!
//! Iterator bodies that still carry `ITERATOR_FN` afterwards go to the
//! caller's [`StateMachineLowerer`].
//!
//! # Debug Environment Variables
//!
//! - `RUST_LOG=weft_lower=debug`: one event per strategy decision and per
//!   synthesized function. Call [`init_tracing`] to install a subscriber.
//! - `RUST_LOG=weft_lower=trace`: individual rewrites (copy propagation,
//!   loop-body captures).

mod call_graph;
pub mod cleanup;
mod config;
mod context;
pub mod cps;
mod dispatch;
mod error;
pub mod fixups;
mod fragment;
mod inline;
mod protocol;
mod recursion;
mod serial_check;
mod state_machine;
mod zip;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod test_helpers;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

use std::sync::Once;

use weft_diagnostic::DiagnosticQueue;
use weft_ir::{FnFlags, FnId, Program};

pub use call_graph::CallGraph;
pub use config::LowerConfig;
pub use context::{LowerCtx, LowerSummary};
pub use dispatch::{classify, inline_marked_iterators, lower_remaining_loops, LoweringStrategy};
pub use error::{LowerError, LowerResult};
pub use fragment::fragment_local_blocks;
pub use inline::expand_iterator_inline;
pub use protocol::{build_iterator_call, is_bounded_iterator, iterator_children, lower_protocol};
pub use recursion::compute_recursive_iterators;
pub use serial_check::check_serial_iterators;
pub use state_machine::StateMachineLowerer;
pub use zip::{can_fuse, fuse, setup_simultaneous_iterators, SimultaneousIterators};

fn iterator_fns(program: &Program) -> Vec<FnId> {
    program
        .fn_ids()
        .filter(|&f| program.func(f).flags.contains(FnFlags::ITERATOR_FN))
        .collect()
}

/// Lower every for-loop in `program`.
///
/// User errors (parallel constructs in serial iterators) are pushed onto
/// `diagnostics` and stop the pass with [`LowerError::Stopped`] before
/// anything is rewritten.
#[tracing::instrument(level = "debug", skip_all)]
pub fn lower_iterators(
    program: &mut Program,
    config: &LowerConfig,
    state_machine: &mut dyn StateMachineLowerer,
    diagnostics: &mut DiagnosticQueue,
) -> LowerResult<LowerSummary> {
    check_serial_iterators(program, diagnostics).map_err(LowerError::Stopped)?;

    let graph = CallGraph::build(program);
    let recursive = compute_recursive_iterators(program, &graph);
    let mut ctx = LowerCtx::new(*config, recursive);

    inline_marked_iterators(program, &mut ctx)?;

    for func in iterator_fns(program) {
        cleanup::collapse_blocks(program, func)?;
        cleanup::remove_unnecessary_gotos(program, func)?;
    }

    ctx.summary.fragmented_blocks = fragment_local_blocks(program)?;

    lower_remaining_loops(program, &mut ctx)?;

    for func in iterator_fns(program) {
        cleanup::cleanup_iterator(program, func, config)?;
    }

    for func in iterator_fns(program) {
        state_machine.lower_iterator(program, func)?;
        ctx.summary.state_machines += 1;
    }

    fixups::run_fixups(program)?;

    let summary = ctx.summary();
    tracing::debug!(?summary, "lowered iterators");
    Ok(summary)
}

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset. Safe to call more than once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(EnvFilter::from_default_env())
                .init();
        }
    });
}

//! Rewrites applied once every for-loop is gone.

mod copy_destroy;
mod field_access;
mod leader_follower;
mod subtype;

pub use copy_destroy::synthesize_copy_destroy;
pub use field_access::normalize_field_accesses;
pub use leader_follower::rewrite_dispatch_helper_args;
pub use subtype::reconstruct_subtype_records;

use weft_ir::Program;

use crate::LowerResult;

/// Run every fixup over the whole program.
#[tracing::instrument(level = "debug", skip_all)]
pub fn run_fixups(program: &mut Program) -> LowerResult<()> {
    let fields = normalize_field_accesses(program)?;
    let helper_args = rewrite_dispatch_helper_args(program)?;
    let subtypes = reconstruct_subtype_records(program)?;
    let synthesized = synthesize_copy_destroy(program)?;
    tracing::debug!(fields, helper_args, subtypes, synthesized, "applied fixups");
    Ok(())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

//! Per-run state of the lowering pass.

use rustc_hash::{FxHashMap, FxHashSet};
use weft_ir::{FnId, Program, TypeFlags, TypeId, TypeKind};

use crate::LowerConfig;

/// What the pass did, by strategy.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct LowerSummary {
    pub inlined: usize,
    pub zip_fused: usize,
    pub protocol: usize,
    pub recursive_cps: usize,
    /// Loops over recursive iterators left inside recursive iterators.
    pub left_for_state_machine: usize,
    /// Recursive iterator functions synthesized (cache misses).
    pub generated_fns: usize,
    pub fragmented_blocks: usize,
    pub state_machines: usize,
}

/// Analysis results and caches shared by every strategy during one call to
/// [`lower_iterators`](crate::lower_iterators).
#[derive(Debug)]
pub struct LowerCtx {
    pub(crate) config: LowerConfig,
    recursive: FxHashSet<FnId>,
    pub(crate) cache: RecursiveLoweringCache,
    pub(crate) summary: LowerSummary,
}

impl LowerCtx {
    pub fn new(config: LowerConfig, recursive: FxHashSet<FnId>) -> Self {
        LowerCtx {
            config,
            recursive,
            cache: RecursiveLoweringCache::default(),
            summary: LowerSummary::default(),
        }
    }

    #[inline]
    pub fn is_recursive(&self, func: FnId) -> bool {
        self.recursive.contains(&func)
    }

    pub fn summary(&self) -> LowerSummary {
        self.summary
    }
}

/// Recursive iterator functions already synthesized, per source iterator,
/// with the loop-body function each was built for.
#[derive(Debug, Default)]
pub(crate) struct RecursiveLoweringCache {
    entries: FxHashMap<FnId, Vec<CachedLowering>>,
}

#[derive(Copy, Clone, Debug)]
struct CachedLowering {
    generated: FnId,
    loop_body: FnId,
}

impl RecursiveLoweringCache {
    /// A generated function whose loop body has the same formal arity and
    /// pairwise equivalent formal types as `loop_body`.
    pub(crate) fn lookup(&self, program: &Program, iterator: FnId, loop_body: FnId) -> Option<FnId> {
        let formals = &program.func(loop_body).formals;
        self.entries.get(&iterator)?.iter().find_map(|entry| {
            let cached = &program.func(entry.loop_body).formals;
            let matches = cached.len() == formals.len()
                && cached.iter().zip(formals.iter()).all(|(&a, &b)| {
                    equivalent_types(program, program.sym_ty(a), program.sym_ty(b))
                });
            matches.then_some(entry.generated)
        })
    }

    pub(crate) fn insert(&mut self, iterator: FnId, generated: FnId, loop_body: FnId) {
        self.entries.entry(iterator).or_default().push(CachedLowering {
            generated,
            loop_body,
        });
    }
}

/// Identical, or both function references, or both argument bundles, or
/// both references to argument bundles.
///
/// Bundles compare equal regardless of their fields.
pub(crate) fn equivalent_types(program: &Program, a: TypeId, b: TypeId) -> bool {
    if a == b {
        return true;
    }
    let (ta, tb) = (program.ty(a), program.ty(b));
    if ta.kind == TypeKind::FnRef && tb.kind == TypeKind::FnRef {
        return true;
    }
    [TypeFlags::ARG_BUNDLE, TypeFlags::REF_ARG_BUNDLE]
        .into_iter()
        .any(|flag| ta.flags.contains(flag) && tb.flags.contains(flag))
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

//! Recursive iterator detection.

use rustc_hash::FxHashSet;
use weft_ir::{FnId, Program};

use crate::CallGraph;

/// Iterator functions that can reach themselves through the static call
/// graph.
///
/// Breadth-first over callers, starting at the iterator: it is recursive
/// when it shows up as a caller of something already visited.
pub fn compute_recursive_iterators(program: &Program, graph: &CallGraph) -> FxHashSet<FnId> {
    let mut recursive = FxHashSet::default();
    for iterator in program.fn_ids() {
        if !program.func(iterator).is_iterator() {
            continue;
        }
        let mut visited = FxHashSet::default();
        visited.insert(iterator);
        let mut queue = vec![iterator];
        let mut next = 0;
        'search: while let Some(&func) = queue.get(next) {
            next += 1;
            for caller in graph.callers(func) {
                if caller == iterator {
                    recursive.insert(iterator);
                    break 'search;
                }
                if visited.insert(caller) {
                    queue.push(caller);
                }
            }
        }
    }
    tracing::debug!(count = recursive.len(), "recursive iterators");
    recursive
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]
mod tests;

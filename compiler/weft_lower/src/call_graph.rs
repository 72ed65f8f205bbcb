//! Static call graph.
//!
//! Rebuilt from the program on demand: every direct `Call` expression is an
//! edge from its enclosing function to the callee. Calls through the
//! function table are not edges.

use rustc_hash::{FxHashMap, FxHashSet};
use weft_ir::{Expr, FnId, Program, StmtId, StmtKind};

#[derive(Clone, Debug, Default)]
pub struct CallGraph {
    /// Call statements per callee, in program order.
    call_sites: FxHashMap<FnId, Vec<StmtId>>,
    /// Enclosing function per call statement.
    caller_of: FxHashMap<StmtId, FnId>,
}

impl CallGraph {
    pub fn build(program: &Program) -> Self {
        let mut graph = CallGraph::default();
        for func in program.fn_ids() {
            for stmt in program.fn_stmts(func) {
                if let Some(callee) = direct_callee(program.kind(stmt)) {
                    graph.call_sites.entry(callee).or_default().push(stmt);
                    graph.caller_of.insert(stmt, func);
                }
            }
        }
        tracing::debug!(
            callees = graph.call_sites.len(),
            sites = graph.caller_of.len(),
            "built call graph"
        );
        graph
    }

    pub fn call_sites(&self, callee: FnId) -> &[StmtId] {
        self.call_sites.get(&callee).map_or(&[], Vec::as_slice)
    }

    /// Distinct functions containing a call to `callee`, in first-call order.
    pub fn callers(&self, callee: FnId) -> Vec<FnId> {
        let mut seen = FxHashSet::default();
        self.call_sites(callee)
            .iter()
            .filter_map(|site| self.caller_of.get(site).copied())
            .filter(|caller| seen.insert(*caller))
            .collect()
    }
}

/// Callee of a statement that is a direct call.
pub(crate) fn direct_callee(kind: &StmtKind) -> Option<FnId> {
    match kind {
        StmtKind::Assign {
            value: Expr::Call { callee, .. },
            ..
        }
        | StmtKind::Eval(Expr::Call { callee, .. }) => Some(*callee),
        _ => None,
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap for concise assertions"
)]

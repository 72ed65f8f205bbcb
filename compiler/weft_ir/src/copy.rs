//! Deep copies of statement trees.

use rustc_hash::FxHashMap;

use crate::{Program, StmtId, StmtKind, SymId};

/// Symbol substitution applied while copying.
#[derive(Clone, Debug, Default)]
pub struct SymbolMap {
    map: FxHashMap<SymId, SymId>,
}

impl SymbolMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, from: SymId, to: SymId) {
        self.map.insert(from, to);
    }

    pub fn get(&self, from: SymId) -> Option<SymId> {
        self.map.get(&from).copied()
    }

    /// Mapped symbol, or `sym` itself when unmapped.
    #[inline]
    pub fn resolve(&self, sym: SymId) -> SymId {
        self.get(sym).unwrap_or(sym)
    }
}

impl Program {
    /// Deep-copy the subtree rooted at `root`.
    ///
    /// Symbols declared inside the subtree get fresh clones (unless `map`
    /// already maps them); every reference is then resolved through `map`.
    /// Clones have no owner until claimed. The copy is detached.
    pub fn copy_tree(&mut self, root: StmtId, map: &mut SymbolMap) -> StmtId {
        for sym in self.defined_syms(root) {
            if map.get(sym).is_none() {
                let clone = self.clone_sym(sym);
                map.insert(sym, clone);
            }
        }
        self.copy_rec(root, map)
    }

    fn copy_rec(&mut self, id: StmtId, map: &SymbolMap) -> StmtId {
        let span = self.span(id);
        let mut kind = self.kind(id).clone();
        match &mut kind {
            StmtKind::Block { body, .. } => {
                for child in body.iter_mut() {
                    *child = self.copy_rec(*child, map);
                }
            }
            StmtKind::Cond {
                then_block,
                else_block,
                ..
            } => {
                *then_block = self.copy_rec(*then_block, map);
                if let Some(else_block) = else_block {
                    *else_block = self.copy_rec(*else_block, map);
                }
            }
            _ => {}
        }
        kind.rewrite_syms(&mut |s| map.resolve(s));
        self.new_stmt(kind, span)
    }
}

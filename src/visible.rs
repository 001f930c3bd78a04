use rustc_hash::{FxBuildHasher, FxHashMap};
use smallvec::SmallVec;

use crate::index::TreeIndex;
use crate::node::{NIL, NodeFlags, NodeId};

impl TreeIndex {
    /// Returns whether `id` is currently reachable: it is a root, or every
    /// ancestor up to its root is expanded.
    ///
    /// The answer is cached per node (`VISIBLE`/`VISIBLE_CACHE_VALID` bits).
    /// Any expansion change drops the whole cache; the first query after
    /// that lazily revalidates the ancestor chain and memoizes along it.
    /// Unknown ids are not visible.
    pub fn is_visible(&mut self, id: NodeId) -> bool {
        let Some(idx) = self.idx_of(id) else {
            return false;
        };
        self.is_visible_idx(idx)
    }

    pub(crate) fn is_visible_idx(&mut self, idx: u32) -> bool {
        if self
            .node(idx)
            .flags
            .contains(NodeFlags::VISIBLE_CACHE_VALID)
        {
            return self.node(idx).flags.contains(NodeFlags::VISIBLE);
        }

        // Climb until a memoized ancestor (or a root), collecting the
        // unresolved chain deepest-first.
        let mut chain: SmallVec<[u32; 16]> = SmallVec::new();
        let mut cursor = idx;
        let memoized_top = loop {
            chain.push(cursor);
            let parent = self.node(cursor).parent;
            if parent == NIL {
                break None;
            }
            if self
                .node(parent)
                .flags
                .contains(NodeFlags::VISIBLE_CACHE_VALID)
            {
                break Some(parent);
            }
            cursor = parent;
        };

        // Resolve top-down, threading (visible, expanded) of the node above.
        let mut above = memoized_top.map(|top| {
            let flags = self.node(top).flags;
            (
                flags.contains(NodeFlags::VISIBLE),
                flags.contains(NodeFlags::EXPANDED),
            )
        });
        let mut visible = true;
        for &node_idx in chain.iter().rev() {
            visible = match above {
                None => true,
                Some((parent_visible, parent_expanded)) => parent_visible && parent_expanded,
            };
            let node = self.node_mut(node_idx);
            node.flags.set(NodeFlags::VISIBLE, visible);
            node.flags.insert(NodeFlags::VISIBLE_CACHE_VALID);
            above = Some((visible, node.flags.contains(NodeFlags::EXPANDED)));
        }
        visible
    }
}

/// One entry of the visible order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VisibleRow {
    pub id: NodeId,
    pub level: u16,
    pub has_children: bool,
    pub(crate) store_index: u32,
}

/// Cached visibility-ordered sequence.
///
/// The order is the pre-order (document-order) traversal of the forest,
/// descending only into expanded nodes: exactly the rows a fully unrolled
/// list would show, top to bottom. It is rebuilt lazily whenever the index
/// reports a newer visibility epoch.
#[derive(Debug, Clone)]
pub struct VisibleOrder {
    rows: Vec<VisibleRow>,
    position: FxHashMap<NodeId, usize>,
    built_epoch: Option<u64>,
}

impl Default for VisibleOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibleOrder {
    /// Creates an empty, never-built order.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            position: FxHashMap::with_hasher(FxBuildHasher),
            built_epoch: None,
        }
    }

    /// Rebuilds the order if the index changed since the last build.
    pub fn ensure(&mut self, index: &TreeIndex) {
        if self.built_epoch == Some(index.visibility_epoch()) {
            return;
        }
        self.rows.clear();
        self.position.clear();
        let extra = index.len().saturating_sub(self.rows.capacity());
        if extra > 0 {
            self.rows.reserve(extra);
        }

        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.extend(index.root_indices().iter().rev());
        while let Some(idx) = stack.pop() {
            let node = index.node(idx);
            self.position.insert(node.id, self.rows.len());
            self.rows.push(VisibleRow {
                id: node.id,
                level: node.level,
                has_children: !node.flags.contains(NodeFlags::IS_LEAF),
                store_index: idx,
            });
            if node.flags.contains(NodeFlags::IS_LEAF)
                || !node.flags.contains(NodeFlags::EXPANDED)
            {
                continue;
            }
            let children: SmallVec<[u32; 16]> = index.child_indices(idx).collect();
            stack.extend(children.iter().rev());
        }
        self.built_epoch = Some(index.visibility_epoch());
    }

    /// The ordered visible rows.
    #[must_use]
    pub fn rows(&self) -> &[VisibleRow] {
        &self.rows
    }

    /// Number of visible rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if nothing is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `id` in the order, if it is visible.
    #[must_use]
    pub fn position_of(&self, id: NodeId) -> Option<usize> {
        self.position.get(&id).copied()
    }

    /// Ids in visible order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.rows.iter().map(|row| row.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RawRecord;

    fn org_index() -> TreeIndex {
        let records = vec![
            RawRecord::department(1, None, "DeptA"),
            RawRecord::person(2, Some(1), "UserA1", "Engineer"),
            RawRecord::person(3, Some(1), "UserA2", "Designer"),
            RawRecord::department(4, None, "DeptB"),
            RawRecord::department(5, Some(4), "DeptB1"),
            RawRecord::person(6, Some(5), "UserB1a", "Manager"),
        ];
        let mut index = TreeIndex::build(&records).unwrap();
        index.set_expanded(NodeId(1), true);
        index.set_expanded(NodeId(4), true);
        index
    }

    fn ids(order: &VisibleOrder) -> Vec<u64> {
        order.ids().map(|id| id.0).collect()
    }

    #[test]
    fn order_is_filtered_preorder() {
        let mut index = org_index();
        let mut order = VisibleOrder::new();
        order.ensure(&index);
        assert_eq!(ids(&order), vec![1, 2, 3, 4, 5]);

        index.set_expanded(NodeId(5), true);
        order.ensure(&index);
        assert_eq!(ids(&order), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn predicate_matches_ancestor_definition() {
        let mut index = org_index();
        // For every node, the cached predicate must agree with a direct
        // recomputation from the ancestor chain.
        for raw in 1..=6_u64 {
            let id = NodeId(raw);
            let expected = index
                .ancestors_of(id)
                .collect::<Vec<_>>()
                .into_iter()
                .all(|a| {
                    index
                        .flags(a)
                        .unwrap()
                        .contains(crate::node::NodeFlags::EXPANDED)
                });
            assert_eq!(index.is_visible(id), expected, "node {raw}");
        }
        assert!(!index.is_visible(NodeId(6)));
        assert!(index.is_visible(NodeId(5)));
    }

    #[test]
    fn collapse_invalidates_cached_predicate() {
        let mut index = org_index();
        assert!(index.is_visible(NodeId(2)));
        index.set_expanded(NodeId(1), false);
        assert!(!index.is_visible(NodeId(2)));
        assert!(index.is_visible(NodeId(1)), "roots stay visible");
    }

    #[test]
    fn order_rebuild_is_cached_until_epoch_moves() {
        let mut index = org_index();
        let mut order = VisibleOrder::new();
        order.ensure(&index);
        let before = ids(&order);
        // No mutation: ensure is a no-op and the data stays identical.
        order.ensure(&index);
        assert_eq!(ids(&order), before);

        index.toggle_expand(NodeId(4));
        order.ensure(&index);
        assert_eq!(ids(&order), vec![1, 2, 3, 4]);
    }

    #[test]
    fn positions_track_the_order() {
        let mut index = org_index();
        let mut order = VisibleOrder::new();
        order.ensure(&index);
        assert_eq!(order.position_of(NodeId(4)), Some(3));
        assert_eq!(order.position_of(NodeId(6)), None);
        assert_eq!(order.len(), 5);
    }

    #[test]
    fn unknown_id_is_not_visible() {
        let mut index = org_index();
        assert!(!index.is_visible(NodeId(42)));
    }

    #[test]
    fn empty_index_yields_empty_order() {
        let index = TreeIndex::empty();
        let mut order = VisibleOrder::new();
        order.ensure(&index);
        assert!(order.is_empty());
    }
}

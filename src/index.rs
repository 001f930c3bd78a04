use rustc_hash::{FxBuildHasher, FxHashMap};
use smallvec::SmallVec;

use crate::error::TreeError;
use crate::intern::{TextHandle, TextInterner};
use crate::node::{NIL, Node, NodeFlags, NodeId, NodeKind, RawRecord};

/// Read-only view of one node, with text handles resolved.
#[derive(Clone, Copy, Debug)]
pub struct NodeView<'a> {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub level: u16,
    pub kind: NodeKind,
    pub flags: NodeFlags,
    pub name: &'a str,
    pub subtitle: &'a str,
    pub contact: &'a str,
}

/// The compact node store and single source of truth.
///
/// All nodes live in one contiguous growable buffer; hierarchy is held as
/// array indices (`first_child`/`next_sibling` sibling lists, non-owning
/// `parent` back-references) and an id→index map provides external lookup.
/// Visibility, windowing, selection, and search all operate on this store by
/// index and never copy nodes.
///
/// A `TreeIndex` is built wholesale from a flat record list and torn down
/// the same way; there is no incremental insert/remove. Interactive
/// mutations only flip per-node flags.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeIndex {
    nodes: Vec<Node>,
    id_map: FxHashMap<NodeId, u32>,
    roots: Vec<u32>,
    interner: TextInterner,
    // Bumped on every change that can affect which nodes are reachable;
    // cached visible orders compare against it.
    visibility_epoch: u64,
    selected: Option<u32>,
}

impl Default for TreeIndex {
    fn default() -> Self {
        Self::empty()
    }
}

impl TreeIndex {
    /// Creates an index with no nodes.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            nodes: Vec::new(),
            id_map: FxHashMap::with_hasher(FxBuildHasher),
            roots: Vec::new(),
            interner: TextInterner::new(),
            visibility_epoch: 0,
            selected: None,
        }
    }

    /// Flattens a raw record list into a new index.
    ///
    /// Records may reference parents that appear later in the list; sibling
    /// order is record order. The only failure modes are structural:
    /// duplicate ids, a parent reference no record defines, or a parent
    /// chain that loops back on itself.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::DuplicateId`], [`TreeError::UnknownParent`], or
    /// [`TreeError::Cycle`] on malformed input.
    pub fn build(records: &[RawRecord]) -> Result<Self, TreeError> {
        let mut nodes: Vec<Node> = Vec::with_capacity(records.len());
        let mut id_map: FxHashMap<NodeId, u32> =
            FxHashMap::with_capacity_and_hasher(records.len(), FxBuildHasher);
        let mut interner = TextInterner::with_capacity(records.len());

        for record in records {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "store indices are 32-bit by design"
            )]
            let idx = nodes.len() as u32;
            if id_map.insert(record.id, idx).is_some() {
                return Err(TreeError::DuplicateId(record.id));
            }
            let mut node = Node::new(record.id, record.kind);
            node.name = interner.intern(&record.name);
            node.subtitle = interner.intern(&record.subtitle);
            node.contact = interner.intern(&record.contact);
            nodes.push(node);
        }

        // Link pass: sibling lists in record order, O(1) append via the
        // last-child scratch table.
        let mut roots: Vec<u32> = Vec::new();
        let mut last_child: Vec<u32> = vec![NIL; nodes.len()];
        for (i, record) in records.iter().enumerate() {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "store indices are 32-bit by design"
            )]
            let idx = i as u32;
            let Some(parent_id) = record.parent else {
                roots.push(idx);
                continue;
            };
            let Some(&parent_idx) = id_map.get(&parent_id) else {
                return Err(TreeError::UnknownParent {
                    child: record.id,
                    parent: parent_id,
                });
            };
            if parent_idx == idx {
                return Err(TreeError::Cycle(record.id));
            }
            nodes[idx as usize].parent = parent_idx;
            let prev = last_child[parent_idx as usize];
            if prev == NIL {
                nodes[parent_idx as usize].first_child = idx;
            } else {
                nodes[prev as usize].next_sibling = idx;
            }
            last_child[parent_idx as usize] = idx;
            nodes[parent_idx as usize].flags.remove(NodeFlags::IS_LEAF);
        }

        // Level pass doubles as the cycle check: a node whose parent chain
        // loops is never reached from a root.
        let mut visited = 0_usize;
        let mut stack: Vec<u32> = Vec::with_capacity(roots.len());
        stack.extend(roots.iter().rev());
        while let Some(idx) = stack.pop() {
            visited += 1;
            let level = {
                let parent = nodes[idx as usize].parent;
                if parent == NIL {
                    0
                } else {
                    nodes[parent as usize].level + 1
                }
            };
            nodes[idx as usize].level = level;
            let mut child = nodes[idx as usize].first_child;
            let mut children: SmallVec<[u32; 16]> = SmallVec::new();
            while child != NIL {
                children.push(child);
                child = nodes[child as usize].next_sibling;
            }
            stack.extend(children.iter().rev());
        }
        if visited != nodes.len() {
            // Unvisited non-roots kept their initial level 0; any of them
            // sits on (or below) a looping parent chain.
            let unreachable = nodes
                .iter()
                .find(|n| n.parent != NIL && n.level == 0)
                .map_or_else(|| nodes[0].id, |n| n.id);
            return Err(TreeError::Cycle(unreachable));
        }

        Ok(Self {
            nodes,
            id_map,
            roots,
            interner,
            visibility_epoch: 0,
            selected: None,
        })
    }

    /// Number of nodes in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the store holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns `true` if the id exists in this index.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.id_map.contains_key(&id)
    }

    /// Resolves an id to its store index.
    #[must_use]
    pub(crate) fn idx_of(&self, id: NodeId) -> Option<u32> {
        self.id_map.get(&id).copied()
    }

    pub(crate) fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    pub(crate) fn node_mut(&mut self, idx: u32) -> &mut Node {
        &mut self.nodes[idx as usize]
    }

    pub(crate) fn node_slice(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn root_indices(&self) -> &[u32] {
        &self.roots
    }

    /// The text table backing this index.
    #[must_use]
    pub fn interner(&self) -> &TextInterner {
        &self.interner
    }

    pub(crate) fn text(&self, handle: TextHandle) -> &str {
        self.interner.resolve(handle)
    }

    /// Returns a read-only view of the node, or `None` for unknown ids.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<NodeView<'_>> {
        let idx = self.idx_of(id)?;
        let node = self.node(idx);
        Some(NodeView {
            id: node.id,
            parent: (node.parent != NIL).then(|| self.node(node.parent).id),
            level: node.level,
            kind: node.kind,
            flags: node.flags,
            name: self.text(node.name),
            subtitle: self.text(node.subtitle),
            contact: self.text(node.contact),
        })
    }

    /// Returns the flags word of a node, or `None` for unknown ids.
    #[must_use]
    pub fn flags(&self, id: NodeId) -> Option<NodeFlags> {
        self.idx_of(id).map(|idx| self.node(idx).flags)
    }

    /// Sets or clears one flag, returning whether anything changed.
    ///
    /// Unknown ids are a no-op. Setting `CHECKED` clears `INDETERMINATE` and
    /// vice versa, so the tri-state exclusivity cannot be violated from
    /// outside. Expansion changes invalidate the visibility cache.
    pub fn set_flag(&mut self, id: NodeId, flag: NodeFlags, value: bool) -> bool {
        let Some(idx) = self.idx_of(id) else {
            return false;
        };
        let node = &mut self.nodes[idx as usize];
        let before = node.flags;
        node.flags.set(flag, value);
        if value && flag == NodeFlags::CHECKED {
            node.flags.remove(NodeFlags::INDETERMINATE);
        } else if value && flag == NodeFlags::INDETERMINATE {
            node.flags.remove(NodeFlags::CHECKED);
        }
        let changed = node.flags != before;
        if changed && flag.intersects(NodeFlags::EXPANDED) {
            self.invalidate_visibility();
        }
        changed
    }

    /// Sets expansion state, returning whether it changed.
    pub fn set_expanded(&mut self, id: NodeId, expanded: bool) -> bool {
        self.set_flag(id, NodeFlags::EXPANDED, expanded)
    }

    /// Toggles expansion, returning the new state (`None` for unknown ids).
    pub fn toggle_expand(&mut self, id: NodeId) -> Option<bool> {
        let idx = self.idx_of(id)?;
        let expanded = !self.node(idx).flags.contains(NodeFlags::EXPANDED);
        self.node_mut(idx).flags.set(NodeFlags::EXPANDED, expanded);
        self.invalidate_visibility();
        Some(expanded)
    }

    /// Expands every non-leaf node.
    pub fn expand_all(&mut self) {
        for node in &mut self.nodes {
            if !node.flags.contains(NodeFlags::IS_LEAF) {
                node.flags.insert(NodeFlags::EXPANDED);
            }
        }
        self.invalidate_visibility();
    }

    /// Collapses every node.
    pub fn collapse_all(&mut self) {
        for node in &mut self.nodes {
            node.flags.remove(NodeFlags::EXPANDED);
        }
        self.invalidate_visibility();
    }

    /// Sets expansion for a node and its whole subtree.
    pub fn set_expanded_recursive(&mut self, id: NodeId, expanded: bool) {
        let Some(start) = self.idx_of(id) else {
            return;
        };
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(start);
        while let Some(idx) = stack.pop() {
            let node = &mut self.nodes[idx as usize];
            if !node.flags.contains(NodeFlags::IS_LEAF) {
                node.flags.set(NodeFlags::EXPANDED, expanded);
            }
            let mut child = self.nodes[idx as usize].first_child;
            while child != NIL {
                stack.push(child);
                child = self.nodes[child as usize].next_sibling;
            }
        }
        self.invalidate_visibility();
    }

    /// Expands every ancestor of `id` so the node becomes reachable.
    ///
    /// Returns `false` for unknown ids. The node's own expansion state is
    /// left alone.
    pub fn expand_to(&mut self, id: NodeId) -> bool {
        let Some(idx) = self.idx_of(id) else {
            return false;
        };
        let mut changed = false;
        let mut parent = self.node(idx).parent;
        while parent != NIL {
            let node = &mut self.nodes[parent as usize];
            if !node.flags.contains(NodeFlags::EXPANDED) {
                node.flags.insert(NodeFlags::EXPANDED);
                changed = true;
            }
            parent = node.parent;
        }
        if changed {
            self.invalidate_visibility();
        }
        true
    }

    /// Moves the single-row selection to `id` (or clears it with `None`).
    pub fn set_selected(&mut self, id: Option<NodeId>) {
        if let Some(prev) = self.selected.take() {
            self.nodes[prev as usize].flags.remove(NodeFlags::SELECTED);
        }
        if let Some(id) = id
            && let Some(idx) = self.idx_of(id)
        {
            self.nodes[idx as usize].flags.insert(NodeFlags::SELECTED);
            self.selected = Some(idx);
        }
    }

    /// The currently selected node, if any.
    #[must_use]
    pub fn selected_id(&self) -> Option<NodeId> {
        self.selected.map(|idx| self.node(idx).id)
    }

    /// Iterates the ids of `id`'s direct children in document order.
    ///
    /// Unknown ids yield an empty iterator.
    pub fn children_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let first = self
            .idx_of(id)
            .map_or(NIL, |idx| self.node(idx).first_child);
        ChildIndices {
            nodes: &self.nodes,
            next: first,
        }
        .map(|idx| self.node(idx).id)
    }

    pub(crate) fn child_indices(&self, idx: u32) -> ChildIndices<'_> {
        ChildIndices {
            nodes: &self.nodes,
            next: self.nodes[idx as usize].first_child,
        }
    }

    /// Iterates the ids of `id`'s ancestors, nearest first.
    pub fn ancestors_of(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let start = self
            .idx_of(id)
            .map_or(NIL, |idx| self.node(idx).parent);
        AncestorIndices {
            nodes: &self.nodes,
            next: start,
        }
        .map(|idx| self.node(idx).id)
    }

    pub(crate) fn ancestor_indices(&self, idx: u32) -> AncestorIndices<'_> {
        AncestorIndices {
            nodes: &self.nodes,
            next: self.nodes[idx as usize].parent,
        }
    }

    /// Ids of all currently checked nodes, in store order.
    #[must_use]
    pub fn checked_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.flags.contains(NodeFlags::CHECKED))
            .map(|n| n.id)
            .collect()
    }

    /// Ids of all nodes matching the active search, in store order.
    #[must_use]
    pub fn matched_ids(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.flags.contains(NodeFlags::MATCHED))
            .map(|n| n.id)
            .collect()
    }

    pub(crate) fn visibility_epoch(&self) -> u64 {
        self.visibility_epoch
    }

    /// Drops every cached visibility bit; the next query recomputes lazily.
    pub(crate) fn invalidate_visibility(&mut self) {
        self.visibility_epoch += 1;
        for node in &mut self.nodes {
            node.flags
                .remove(NodeFlags::VISIBLE | NodeFlags::VISIBLE_CACHE_VALID);
        }
    }
}

/// Iterator over a sibling linked list.
pub(crate) struct ChildIndices<'a> {
    nodes: &'a [Node],
    next: u32,
}

impl Iterator for ChildIndices<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let current = self.next;
        self.next = self.nodes[current as usize].next_sibling;
        Some(current)
    }
}

/// Iterator over the parent chain, nearest ancestor first.
pub(crate) struct AncestorIndices<'a> {
    nodes: &'a [Node],
    next: u32,
}

impl Iterator for AncestorIndices<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let current = self.next;
        self.next = self.nodes[current as usize].parent;
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RawRecord;

    fn org() -> Vec<RawRecord> {
        vec![
            RawRecord::department(1, None, "DeptA"),
            RawRecord::person(2, Some(1), "UserA1", "Engineer"),
            RawRecord::person(3, Some(1), "UserA2", "Designer"),
            RawRecord::department(4, None, "DeptB"),
            RawRecord::department(5, Some(4), "DeptB1"),
            RawRecord::person(6, Some(5), "UserB1a", "Manager"),
        ]
    }

    #[test]
    fn build_assigns_levels_and_sibling_order() {
        let index = TreeIndex::build(&org()).unwrap();
        assert_eq!(index.len(), 6);

        let a = index.get(NodeId(1)).unwrap();
        assert_eq!(a.level, 0);
        assert_eq!(a.parent, None);
        assert_eq!(a.kind, NodeKind::Department);

        let b1a = index.get(NodeId(6)).unwrap();
        assert_eq!(b1a.level, 2);
        assert_eq!(b1a.parent, Some(NodeId(5)));
        assert_eq!(b1a.name, "UserB1a");
        assert_eq!(b1a.subtitle, "Manager");

        let children: Vec<_> = index.children_of(NodeId(1)).collect();
        assert_eq!(children, vec![NodeId(2), NodeId(3)]);
    }

    #[test]
    fn build_accepts_children_before_parents() {
        let records = vec![
            RawRecord::person(2, Some(1), "UserA1", "Engineer"),
            RawRecord::department(1, None, "DeptA"),
        ];
        let index = TreeIndex::build(&records).unwrap();
        assert_eq!(index.get(NodeId(2)).unwrap().level, 1);
        assert_eq!(index.get(NodeId(2)).unwrap().parent, Some(NodeId(1)));
    }

    #[test]
    fn build_rejects_duplicate_ids() {
        let records = vec![
            RawRecord::department(1, None, "DeptA"),
            RawRecord::department(1, None, "DeptA again"),
        ];
        assert_eq!(
            TreeIndex::build(&records),
            Err(TreeError::DuplicateId(NodeId(1)))
        );
    }

    #[test]
    fn build_rejects_unknown_parent() {
        let records = vec![RawRecord::person(2, Some(99), "Orphan", "")];
        assert_eq!(
            TreeIndex::build(&records),
            Err(TreeError::UnknownParent {
                child: NodeId(2),
                parent: NodeId(99),
            })
        );
    }

    #[test]
    fn build_rejects_cycles() {
        let records = vec![
            RawRecord::department(1, Some(2), "A"),
            RawRecord::department(2, Some(1), "B"),
        ];
        assert!(matches!(
            TreeIndex::build(&records),
            Err(TreeError::Cycle(_))
        ));
    }

    #[test]
    fn build_rejects_self_parent() {
        let records = vec![RawRecord::department(1, Some(1), "Ouroboros")];
        assert_eq!(
            TreeIndex::build(&records),
            Err(TreeError::Cycle(NodeId(1)))
        );
    }

    #[test]
    fn forest_invariant_holds() {
        let index = TreeIndex::build(&org()).unwrap();
        for node in index.node_slice() {
            // No node is its own ancestor.
            let idx = index.idx_of(node.id).unwrap();
            assert!(index.ancestor_indices(idx).all(|a| a != idx));
        }
        // Every non-root has exactly one parent and shows up in exactly one
        // child list.
        let mut seen_as_child = 0;
        for node in index.node_slice() {
            seen_as_child += index
                .child_indices(index.idx_of(node.id).unwrap())
                .count();
        }
        assert_eq!(seen_as_child, index.len() - index.root_indices().len());
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let mut index = TreeIndex::build(&org()).unwrap();
        assert!(index.get(NodeId(42)).is_none());
        assert!(!index.set_flag(NodeId(42), NodeFlags::CHECKED, true));
        assert!(index.toggle_expand(NodeId(42)).is_none());
        assert!(!index.expand_to(NodeId(42)));
        assert_eq!(index.children_of(NodeId(42)).count(), 0);
    }

    #[test]
    fn set_flag_keeps_tri_state_exclusive() {
        let mut index = TreeIndex::build(&org()).unwrap();
        assert!(index.set_flag(NodeId(2), NodeFlags::CHECKED, true));
        assert!(index.set_flag(NodeId(2), NodeFlags::INDETERMINATE, true));
        let flags = index.flags(NodeId(2)).unwrap();
        assert!(flags.contains(NodeFlags::INDETERMINATE));
        assert!(!flags.contains(NodeFlags::CHECKED));
    }

    #[test]
    fn expand_to_opens_ancestor_chain_only() {
        let mut index = TreeIndex::build(&org()).unwrap();
        assert!(index.expand_to(NodeId(6)));
        assert!(index.flags(NodeId(4)).unwrap().contains(NodeFlags::EXPANDED));
        assert!(index.flags(NodeId(5)).unwrap().contains(NodeFlags::EXPANDED));
        // The target itself is untouched.
        assert!(!index.flags(NodeId(6)).unwrap().contains(NodeFlags::EXPANDED));
    }

    #[test]
    fn selection_moves_between_nodes() {
        let mut index = TreeIndex::build(&org()).unwrap();
        index.set_selected(Some(NodeId(2)));
        assert_eq!(index.selected_id(), Some(NodeId(2)));
        index.set_selected(Some(NodeId(3)));
        assert_eq!(index.selected_id(), Some(NodeId(3)));
        assert!(!index.flags(NodeId(2)).unwrap().contains(NodeFlags::SELECTED));
        index.set_selected(None);
        assert_eq!(index.selected_id(), None);
    }

    #[test]
    fn shared_text_shares_handles() {
        let records = vec![
            RawRecord::person(1, None, "Alice", "Engineer"),
            RawRecord::person(2, None, "Bob", "Engineer"),
        ];
        let index = TreeIndex::build(&records).unwrap();
        let a = index.idx_of(NodeId(1)).unwrap();
        let b = index.idx_of(NodeId(2)).unwrap();
        assert_eq!(index.node(a).subtitle, index.node(b).subtitle);
        assert_ne!(index.node(a).name, index.node(b).name);
    }
}

use smallvec::SmallVec;

use crate::index::TreeIndex;
use crate::node::{NodeFlags, NodeId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One node whose check state actually changed during a cascade.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckChange {
    pub id: NodeId,
    pub checked: bool,
    pub indeterminate: bool,
}

impl TreeIndex {
    /// Sets the check state of `id` and cascades it through the tree.
    ///
    /// Downward, every descendant takes the same definite state. Upward,
    /// each ancestor is recomputed from its direct children (all checked
    /// makes it checked, none checked and none indeterminate makes it
    /// unchecked, anything in between makes it indeterminate) and the walk
    /// always continues to the root, because a grandparent's verdict depends
    /// on the parent's children rather than the parent's own flags.
    ///
    /// Returns only the nodes whose flags actually changed, so downstream
    /// re-render work stays proportional to the real delta. Unknown ids
    /// return an empty change set.
    pub fn toggle_checked(&mut self, id: NodeId, value: bool) -> Vec<CheckChange> {
        let Some(start) = self.idx_of(id) else {
            return Vec::new();
        };
        let mut changes = Vec::new();

        // Self plus all descendants take the definite state.
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(start);
        while let Some(idx) = stack.pop() {
            self.apply_check(idx, value, false, &mut changes);
            let children: SmallVec<[u32; 16]> = self.child_indices(idx).collect();
            stack.extend(children.iter().rev().copied());
        }

        // Ancestors, nearest first, each recomputed from its direct children.
        let ancestors: SmallVec<[u32; 16]> = self.ancestor_indices(start).collect();
        for ancestor in ancestors {
            let mut total = 0_usize;
            let mut checked = 0_usize;
            let mut indeterminate = false;
            let children: SmallVec<[u32; 16]> = self.child_indices(ancestor).collect();
            for child in children {
                total += 1;
                let flags = self.node(child).flags;
                if flags.contains(NodeFlags::CHECKED) {
                    checked += 1;
                } else if flags.contains(NodeFlags::INDETERMINATE) {
                    indeterminate = true;
                }
            }
            let (new_checked, new_indeterminate) = if total > 0 && checked == total {
                (true, false)
            } else if checked == 0 && !indeterminate {
                (false, false)
            } else {
                (false, true)
            };
            self.apply_check(ancestor, new_checked, new_indeterminate, &mut changes);
        }

        changes
    }

    fn apply_check(
        &mut self,
        idx: u32,
        checked: bool,
        indeterminate: bool,
        changes: &mut Vec<CheckChange>,
    ) {
        debug_assert!(!(checked && indeterminate), "tri-state exclusivity");
        let node = self.node_mut(idx);
        let before = node.flags;
        node.flags.set(NodeFlags::CHECKED, checked);
        node.flags.set(NodeFlags::INDETERMINATE, indeterminate);
        if node.flags != before {
            changes.push(CheckChange {
                id: node.id,
                checked,
                indeterminate,
            });
        }
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
        TreeIndex::build(&records).unwrap()
    }

    fn checked(index: &TreeIndex) -> Vec<u64> {
        index.checked_ids().into_iter().map(|id| id.0).collect()
    }

    #[test]
    fn checking_a_department_checks_the_subtree() {
        let mut index = org_index();
        let changes = index.toggle_checked(NodeId(1), true);
        assert_eq!(checked(&index), vec![1, 2, 3]);
        assert_eq!(changes.len(), 3);
        for change in &changes {
            assert!(change.checked);
            assert!(!change.indeterminate);
        }
    }

    #[test]
    fn unchecking_one_child_makes_the_parent_indeterminate() {
        let mut index = org_index();
        index.toggle_checked(NodeId(1), true);
        let changes = index.toggle_checked(NodeId(2), false);

        assert_eq!(checked(&index), vec![3]);
        let parent = index.flags(NodeId(1)).unwrap();
        assert!(!parent.contains(NodeFlags::CHECKED));
        assert!(parent.contains(NodeFlags::INDETERMINATE));
        // Exactly the two nodes that changed: 2 and 1.
        let ids: Vec<_> = changes.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn checking_all_children_checks_the_parent() {
        let mut index = org_index();
        index.toggle_checked(NodeId(2), true);
        let parent = index.flags(NodeId(1)).unwrap();
        assert!(parent.contains(NodeFlags::INDETERMINATE));

        index.toggle_checked(NodeId(3), true);
        let parent = index.flags(NodeId(1)).unwrap();
        assert!(parent.contains(NodeFlags::CHECKED));
        assert!(!parent.contains(NodeFlags::INDETERMINATE));
    }

    #[test]
    fn cascade_reaches_past_unchanged_ancestors() {
        // Checking the deepest leaf must update the grandparent even though
        // the parent's own flag settles on the same "checked" verdict.
        let mut index = org_index();
        let changes = index.toggle_checked(NodeId(6), true);
        let ids: Vec<_> = changes.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![6, 5, 4]);
        assert!(index.flags(NodeId(4)).unwrap().contains(NodeFlags::CHECKED));
    }

    #[test]
    fn indeterminate_child_keeps_ancestors_indeterminate() {
        // Root -> A -> [L1, L2], plus sibling B under root. Checking L1
        // leaves A indeterminate; the root must reflect that even though
        // none of its direct children are checked.
        let records = vec![
            RawRecord::department(1, None, "Root"),
            RawRecord::department(2, Some(1), "A"),
            RawRecord::person(3, Some(2), "L1", ""),
            RawRecord::person(4, Some(2), "L2", ""),
            RawRecord::person(5, Some(1), "B", ""),
        ];
        let mut index = TreeIndex::build(&records).unwrap();
        index.toggle_checked(NodeId(3), true);

        let a = index.flags(NodeId(2)).unwrap();
        assert!(a.contains(NodeFlags::INDETERMINATE));
        let root = index.flags(NodeId(1)).unwrap();
        assert!(root.contains(NodeFlags::INDETERMINATE));
        assert!(!root.contains(NodeFlags::CHECKED));
    }

    #[test]
    fn tri_state_invariant_holds_everywhere() {
        let mut index = org_index();
        index.toggle_checked(NodeId(1), true);
        index.toggle_checked(NodeId(6), true);
        index.toggle_checked(NodeId(2), false);
        for node in index.node_slice() {
            let flags = node.flags;
            assert!(
                !(flags.contains(NodeFlags::CHECKED) && flags.contains(NodeFlags::INDETERMINATE)),
                "node {:?} is both checked and indeterminate",
                node.id
            );
        }
    }

    #[test]
    fn unknown_id_returns_empty_change_set() {
        let mut index = org_index();
        assert!(index.toggle_checked(NodeId(42), true).is_empty());
        assert!(checked(&index).is_empty());
    }

    #[test]
    fn re_checking_reports_nothing() {
        let mut index = org_index();
        index.toggle_checked(NodeId(2), true);
        let changes = index.toggle_checked(NodeId(2), true);
        assert!(changes.is_empty());
    }
}

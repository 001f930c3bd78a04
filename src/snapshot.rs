use crate::index::TreeIndex;
use crate::node::{NodeFlags, NodeId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Portable capture of interactive state (expansion, checks, selection).
///
/// Datasets are rebuilt wholesale when the input changes; a snapshot taken
/// before the rebuild and restored afterwards carries the user's state
/// across. Ids the new tree does not contain are pruned on restore.
///
/// With the `serde` feature enabled, this type derives
/// `Serialize`/`Deserialize`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Expanded nodes, in store order.
    pub expanded: Vec<NodeId>,
    /// Checked nodes, in store order.
    pub checked: Vec<NodeId>,
    /// The single-row selection, if any.
    pub selected: Option<NodeId>,
}

impl Snapshot {
    /// Captures the current interactive state of the index.
    #[must_use]
    pub fn capture(index: &TreeIndex) -> Self {
        let mut expanded = Vec::new();
        let mut checked = Vec::new();
        for node in index.node_slice() {
            if node.flags.contains(NodeFlags::EXPANDED) {
                expanded.push(node.id);
            }
            if node.flags.contains(NodeFlags::CHECKED) {
                checked.push(node.id);
            }
        }
        Self {
            expanded,
            checked,
            selected: index.selected_id(),
        }
    }

    /// Applies the snapshot onto an index, pruning ids it does not contain.
    ///
    /// Existing expansion/check/selection state is replaced, ancestors of
    /// restored checks are re-derived so the tri-state invariant holds, and
    /// the visibility cache is invalidated.
    pub fn restore(&self, index: &mut TreeIndex) {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "store indices are 32-bit by design"
        )]
        for idx in 0..index.len() as u32 {
            index.node_mut(idx).flags.remove(
                NodeFlags::CHECKED | NodeFlags::INDETERMINATE | NodeFlags::EXPANDED,
            );
        }
        index.set_selected(None);

        for &id in &self.expanded {
            if let Some(idx) = index.idx_of(id) {
                index.node_mut(idx).flags.insert(NodeFlags::EXPANDED);
            }
        }
        for &id in &self.checked {
            // toggle_checked re-derives ancestor tri-state as it goes.
            let _ = index.toggle_checked(id, true);
        }
        index.set_selected(self.selected);
        index.invalidate_visibility();
    }
}

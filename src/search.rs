use crate::index::TreeIndex;
use crate::node::{NIL, NodeFlags, NodeId, NodeKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of one search pass.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchOutcome {
    /// Ids whose fields contain the query, in store order.
    pub matched: Vec<NodeId>,
    /// Ancestors that were newly expanded to make matches reachable.
    pub expanded_ancestors: Vec<NodeId>,
    pub match_count: usize,
}

impl TreeIndex {
    /// Runs a case-insensitive substring search over the node text fields.
    ///
    /// A blank query is the explicit *clear* operation: every `MATCHED` flag
    /// is dropped, the count is zero, and expansion state is left exactly as
    /// it was. This is distinct from a query that merely finds nothing.
    ///
    /// A non-blank query tests a fixed field order per kind (department:
    /// name, description; person: name, position, contact). Matches get
    /// `MATCHED`, stale marks from a previous query are cleared, and every
    /// ancestor of a match is expanded so the match is reachable; only the
    /// ancestors that actually flipped are reported. Identical tree state
    /// and query always produce identical output.
    pub fn search(&mut self, query: &str) -> SearchOutcome {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            self.clear_matches();
            return SearchOutcome::default();
        }

        let mut matched = Vec::new();
        let mut matched_indices = Vec::new();
        #[allow(
            clippy::cast_possible_truncation,
            reason = "store indices are 32-bit by design"
        )]
        for idx in 0..self.len() as u32 {
            let node = self.node(idx);
            let fields: [&str; 3] = match node.kind {
                NodeKind::Department => [self.text(node.name), self.text(node.subtitle), ""],
                NodeKind::Person => [
                    self.text(node.name),
                    self.text(node.subtitle),
                    self.text(node.contact),
                ],
            };
            let is_match = fields
                .iter()
                .any(|field| !field.is_empty() && field.to_lowercase().contains(&needle));
            if is_match {
                matched.push(node.id);
                matched_indices.push(idx);
            }
            self.node_mut(idx).flags.set(NodeFlags::MATCHED, is_match);
        }

        // Open every ancestor path; flipping the flag as we go both expands
        // and deduplicates.
        let mut expanded_ancestors = Vec::new();
        for &idx in &matched_indices {
            let mut parent = self.node(idx).parent;
            while parent != NIL {
                let node = self.node_mut(parent);
                if !node.flags.contains(NodeFlags::EXPANDED) {
                    node.flags.insert(NodeFlags::EXPANDED);
                    expanded_ancestors.push(node.id);
                }
                parent = node.parent;
            }
        }
        if !expanded_ancestors.is_empty() {
            self.invalidate_visibility();
        }

        let match_count = matched.len();
        SearchOutcome {
            matched,
            expanded_ancestors,
            match_count,
        }
    }

    fn clear_matches(&mut self) {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "store indices are 32-bit by design"
        )]
        for idx in 0..self.len() as u32 {
            self.node_mut(idx).flags.remove(NodeFlags::MATCHED);
        }
    }
}

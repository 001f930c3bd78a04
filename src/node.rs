use crate::intern::TextHandle;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Caller-assigned stable identifier of a node.
///
/// Ids are opaque to the engine: they are only hashed and compared, never
/// interpreted. They must be unique within one dataset and stable across
/// interactions so selection/expansion survive rebuild-free mutations.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

/// Discriminates what a node represents.
///
/// A closed enum rather than a string tag: every place where field semantics
/// differ matches on it exhaustively.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// Grouping node with a name and an optional description line.
    Department,
    /// Leaf-level entry with a position line and optional contact info.
    Person,
}

bitflags::bitflags! {
    /// Per-node state, packed into one word.
    ///
    /// `CHECKED` and `INDETERMINATE` are mutually exclusive; the selection
    /// cascade maintains that. `EXPANDED` is only read for nodes that are
    /// not `IS_LEAF`. `VISIBLE` is the cached visibility predicate value and
    /// is meaningful only while `VISIBLE_CACHE_VALID` is set.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NodeFlags: u16 {
        /// Children of this node are shown.
        const EXPANDED            = 0b0_0000_0001;
        /// Node is the current single-row selection.
        const SELECTED            = 0b0_0000_0010;
        /// Tri-state checkbox: fully checked.
        const CHECKED             = 0b0_0000_0100;
        /// Tri-state checkbox: some but not all descendants checked.
        const INDETERMINATE       = 0b0_0000_1000;
        /// Node matched the active search query.
        const MATCHED             = 0b0_0001_0000;
        /// Node content is being resolved elsewhere.
        const LOADING             = 0b0_0010_0000;
        /// Node has no children.
        const IS_LEAF             = 0b0_0100_0000;
        /// Cached visibility predicate value.
        const VISIBLE             = 0b0_1000_0000;
        /// `VISIBLE` holds a current value.
        const VISIBLE_CACHE_VALID = 0b1_0000_0000;
    }
}

/// Sentinel index for absent intra-store links.
pub(crate) const NIL: u32 = u32::MAX;

/// One entry of the compact store.
///
/// Structure is held as array indices (`first_child`/`next_sibling` form a
/// sibling linked list, `parent` is a non-owning back-reference), so a node
/// carries no heap allocations of its own; all text lives in the interner.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Node {
    pub id: NodeId,
    pub parent: u32,
    pub level: u16,
    pub kind: NodeKind,
    pub flags: NodeFlags,
    pub name: TextHandle,
    pub subtitle: TextHandle,
    pub contact: TextHandle,
    pub first_child: u32,
    pub next_sibling: u32,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            parent: NIL,
            level: 0,
            kind,
            flags: NodeFlags::IS_LEAF,
            name: TextHandle::EMPTY,
            subtitle: TextHandle::EMPTY,
            contact: TextHandle::EMPTY,
            first_child: NIL,
            next_sibling: NIL,
        }
    }
}

/// One raw input record.
///
/// The engine consumes a flat list of these; hierarchy comes from the
/// `parent` back-references and sibling order is record order. Records may
/// appear in any order relative to their parents.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    /// Display name; always searchable.
    pub name: String,
    /// Department description or person position; searchable.
    pub subtitle: String,
    /// Contact info (email/phone); searchable on `Person` nodes only.
    pub contact: String,
}

impl RawRecord {
    /// Shorthand for a department record.
    #[must_use]
    pub fn department(id: u64, parent: Option<u64>, name: &str) -> Self {
        Self {
            id: NodeId(id),
            parent: parent.map(NodeId),
            kind: NodeKind::Department,
            name: name.to_owned(),
            subtitle: String::new(),
            contact: String::new(),
        }
    }

    /// Shorthand for a person record.
    #[must_use]
    pub fn person(id: u64, parent: Option<u64>, name: &str, position: &str) -> Self {
        Self {
            id: NodeId(id),
            parent: parent.map(NodeId),
            kind: NodeKind::Person,
            name: name.to_owned(),
            subtitle: position.to_owned(),
            contact: String::new(),
        }
    }

    /// Sets the contact field, builder-style.
    #[must_use]
    pub fn with_contact(mut self, contact: &str) -> Self {
        self.contact = contact.to_owned();
        self
    }
}

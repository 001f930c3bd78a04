#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Scheduling tier of an offloaded command. Lower value runs first.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    /// Interactive viewport recomputation.
    pub const WINDOW: Self = Self(0);
    /// Expand/collapse and single-node checks.
    pub const INTERACT: Self = Self(1);
    /// Search queries.
    pub const SEARCH: Self = Self(2);
    /// Large batch mutations.
    pub const BATCH: Self = Self(3);
}

/// Maps each command family to its scheduling tier.
///
/// Supplied at construction and fixed afterwards. The default ordering keeps
/// a long-running batch from ever starving interactive scrolling.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PriorityTable {
    pub build: Priority,
    pub window: Priority,
    pub expand: Priority,
    pub check: Priority,
    pub search: Priority,
    pub batch: Priority,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self {
            // A build gates everything else, so it shares the top tier.
            build: Priority::WINDOW,
            window: Priority::WINDOW,
            expand: Priority::INTERACT,
            check: Priority::INTERACT,
            search: Priority::SEARCH,
            batch: Priority::BATCH,
        }
    }
}

/// Engine-wide knobs, supplied once at construction.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Fixed pixel height of every row.
    pub row_extent: u32,
    /// Extra rows materialized beyond each edge of the viewport.
    pub overscan_rows: usize,
    /// Operations applied per batch slice before yielding to the scheduler.
    pub batch_chunk_size: usize,
    /// Command-to-tier mapping for the offload queue.
    pub priorities: PriorityTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            row_extent: 40,
            overscan_rows: 2,
            batch_chunk_size: 512,
            priorities: PriorityTable::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_keep_batches_last() {
        let table = PriorityTable::default();
        assert!(table.window < table.expand);
        assert!(table.expand < table.search);
        assert!(table.search < table.batch);
        assert_eq!(table.expand, table.check);
    }
}

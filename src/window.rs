use crate::index::TreeIndex;
use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::visible::VisibleOrder;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One row of a computed window: position in the visible order plus its
/// fixed pixel offset.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowRow {
    pub id: NodeId,
    /// Position within the visible order.
    pub index: usize,
    /// `index * row_extent`; strictly increasing with `index`.
    pub offset_px: u64,
}

/// The contiguous slice of the visible order intersecting the viewport.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Window {
    pub rows: Vec<WindowRow>,
    /// `visible_count * row_extent`, for scrollbar sizing.
    pub total_extent: u64,
}

/// Fully resolved view record for one on-screen row.
///
/// This is the complete output surface for the rendering layer: identity,
/// text, and every flag it needs, so it never has to reach back into the
/// store.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RowView {
    pub id: NodeId,
    pub kind: NodeKind,
    pub level: u16,
    pub name: String,
    pub subtitle: String,
    pub contact: String,
    pub has_children: bool,
    pub expanded: bool,
    pub checked: bool,
    pub indeterminate: bool,
    pub matched: bool,
    pub offset_px: u64,
}

/// Maps a scroll position onto the slice of rows that must exist.
///
/// `start = floor(scroll / row) - overscan`, `end = ceil((scroll + viewport)
/// / row) + overscan`, both clamped to the order; the result is a contiguous
/// sub-sequence of at most `ceil(viewport / row) + 2 * overscan + 1` rows.
/// An empty order (or a zero row extent) yields an empty window, never an
/// error.
#[must_use]
pub fn compute_window(
    order: &VisibleOrder,
    scroll_offset: u64,
    viewport_extent: u64,
    row_extent: u32,
    overscan_rows: usize,
) -> Window {
    let len = order.len();
    if len == 0 || row_extent == 0 {
        return Window::default();
    }
    let row = u64::from(row_extent);
    let total_extent = len as u64 * row;

    let first_in_view = (scroll_offset / row) as usize;
    // Clamp like index_at_offset: a scroll position past the content still
    // resolves to the last row instead of an empty or inverted range.
    let start = first_in_view.saturating_sub(overscan_rows).min(len - 1);

    // div_ceil yields the exclusive end of the covered rows; the inclusive
    // last row is one before that.
    let last_in_view = ((scroll_offset + viewport_extent).div_ceil(row) as usize).saturating_sub(1);
    let end = last_in_view
        .saturating_add(overscan_rows)
        .min(len - 1)
        .max(start);

    let rows = order.rows()[start..=end]
        .iter()
        .enumerate()
        .map(|(offset, visible)| WindowRow {
            id: visible.id,
            index: start + offset,
            offset_px: (start + offset) as u64 * row,
        })
        .collect();
    Window { rows, total_extent }
}

/// Resolves a computed window into full view records.
///
/// Only the windowed rows are materialized; text comes out of the interner
/// as owned copies so the result can cross the offload boundary.
#[must_use]
pub fn materialize(index: &TreeIndex, order: &VisibleOrder, window: &Window) -> Vec<RowView> {
    window
        .rows
        .iter()
        .filter_map(|row| {
            let visible = order.rows().get(row.index)?;
            let node = index.node(visible.store_index);
            Some(RowView {
                id: node.id,
                kind: node.kind,
                level: node.level,
                name: index.text(node.name).to_owned(),
                subtitle: index.text(node.subtitle).to_owned(),
                contact: index.text(node.contact).to_owned(),
                has_children: !node.flags.contains(NodeFlags::IS_LEAF),
                expanded: node.flags.contains(NodeFlags::EXPANDED),
                checked: node.flags.contains(NodeFlags::CHECKED),
                indeterminate: node.flags.contains(NodeFlags::INDETERMINATE),
                matched: node.flags.contains(NodeFlags::MATCHED),
                offset_px: row.offset_px,
            })
        })
        .collect()
}

/// Alignment mode when scrolling a row into view.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollAlign {
    /// Row's top edge at the viewport top.
    Start,
    /// Row centered within the viewport.
    Center,
    /// Row's bottom edge at the viewport bottom.
    End,
    /// Smallest scroll change that makes the row fully visible.
    Nearest,
}

/// Scroll offset that brings visible-order `position` into view.
///
/// Pure arithmetic over the fixed row extent; the result is clamped so the
/// viewport never runs past the content.
#[must_use]
pub fn scroll_offset_for(
    position: usize,
    align: ScrollAlign,
    visible_len: usize,
    current_offset: u64,
    viewport_extent: u64,
    row_extent: u32,
) -> u64 {
    if visible_len == 0 || row_extent == 0 {
        return 0;
    }
    let row = u64::from(row_extent);
    let position = position.min(visible_len - 1) as u64;
    let item_start = position * row;
    let item_end = item_start + row;

    let target = match align {
        ScrollAlign::Start => item_start,
        ScrollAlign::End => item_end.saturating_sub(viewport_extent),
        ScrollAlign::Center => {
            let mid = (item_start + item_end) / 2;
            mid.saturating_sub(viewport_extent / 2)
        }
        ScrollAlign::Nearest => {
            if item_start >= current_offset
                && item_end <= current_offset + viewport_extent
            {
                current_offset
            } else if item_start < current_offset {
                item_start
            } else {
                item_end.saturating_sub(viewport_extent)
            }
        }
    };

    let content = visible_len as u64 * row;
    let max_offset = content.saturating_sub(viewport_extent);
    target.min(max_offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::RawRecord;

    fn flat_index(count: u64) -> (TreeIndex, VisibleOrder) {
        let records: Vec<_> = (1..=count)
            .map(|i| RawRecord::person(i, None, &format!("P{i}"), "Staff"))
            .collect();
        let index = TreeIndex::build(&records).unwrap();
        let mut order = VisibleOrder::new();
        order.ensure(&index);
        (index, order)
    }

    #[test]
    fn window_scenario_clamps_to_last_row() {
        // 8 visible rows of 40px, 200px viewport, 1 overscan row, scrolled
        // 80px down: rows 1 through 7.
        let (_, order) = flat_index(8);
        let window = compute_window(&order, 80, 200, 40, 1);
        let indices: Vec<_> = window.rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(window.rows[0].offset_px, 40);
        assert_eq!(window.total_extent, 320);
    }

    #[test]
    fn window_size_stays_bounded() {
        let (_, order) = flat_index(1000);
        for scroll in [0_u64, 40, 55, 400, 39_960] {
            for overscan in [0_usize, 1, 3] {
                let window = compute_window(&order, scroll, 200, 40, overscan);
                let bound = 200_usize.div_ceil(40) + 2 * overscan + 1;
                assert!(
                    window.rows.len() <= bound,
                    "scroll={scroll} overscan={overscan}: {} > {bound}",
                    window.rows.len()
                );
                // Contiguity and strictly increasing offsets.
                for pair in window.rows.windows(2) {
                    assert_eq!(pair[1].index, pair[0].index + 1);
                    assert!(pair[1].offset_px > pair[0].offset_px);
                }
            }
        }
    }

    #[test]
    fn scroll_past_content_resolves_to_last_row() {
        let (_, order) = flat_index(8);
        let window = compute_window(&order, 10_000, 200, 40, 1);
        let indices: Vec<_> = window.rows.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![7]);
    }

    #[test]
    fn empty_order_yields_empty_window() {
        let order = VisibleOrder::new();
        let window = compute_window(&order, 500, 200, 40, 2);
        assert!(window.rows.is_empty());
        assert_eq!(window.total_extent, 0);
    }

    #[test]
    fn materialized_rows_carry_text_and_flags() {
        let (mut index, _) = flat_index(3);
        index.set_flag(NodeId(2), NodeFlags::CHECKED, true);
        let mut order = VisibleOrder::new();
        order.ensure(&index);
        let window = compute_window(&order, 0, 200, 40, 0);
        let rows = materialize(&index, &order, &window);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].name, "P2");
        assert_eq!(rows[1].subtitle, "Staff");
        assert!(rows[1].checked);
        assert!(!rows[0].checked);
        assert_eq!(rows[2].offset_px, 80);
        assert_eq!(rows[0].kind, NodeKind::Person);
    }

    #[test]
    fn scroll_alignment_targets() {
        // 10 rows of 10px, 30px viewport.
        assert_eq!(scroll_offset_for(3, ScrollAlign::Start, 10, 0, 30, 10), 30);
        assert_eq!(scroll_offset_for(3, ScrollAlign::End, 10, 0, 30, 10), 10);
        assert_eq!(scroll_offset_for(3, ScrollAlign::Center, 10, 0, 30, 10), 20);
        // Already fully visible: keep the current offset.
        assert_eq!(
            scroll_offset_for(3, ScrollAlign::Nearest, 10, 20, 30, 10),
            20
        );
        // Below the viewport: align end.
        assert_eq!(
            scroll_offset_for(9, ScrollAlign::Nearest, 10, 0, 30, 10),
            70
        );
        // Clamped to content.
        assert_eq!(scroll_offset_for(9, ScrollAlign::Start, 10, 0, 30, 10), 70);
    }
}

//! Windowed tree index engine for very large hierarchical lists.
//!
//! Builds a compact index over tens of thousands of department/person
//! records and answers the questions a virtualized list view asks: which
//! rows are reachable under the current expansion state, which contiguous
//! slice intersects the viewport, what changed after a tri-state check
//! cascade, and which nodes match a search. All of it can run behind an
//! asynchronous offload channel so a long operation never blocks the
//! interactive path.
//!
//! Rendering is out of scope: the engine consumes flat [`RawRecord`] lists
//! plus row/viewport geometry and produces [`RowView`] descriptors, extents,
//! and id sets for a presentation layer to draw.
//!
//! Feature flags:
//! - `serde`: serde support for wire/payload types and [`Snapshot`].

mod config;
mod error;
mod index;
mod intern;
mod node;
mod offload;
pub mod prelude;
mod search;
mod select;
mod snapshot;
mod visible;
mod window;

pub use config::{EngineConfig, Priority, PriorityTable};
pub use error::{OffloadError, TreeError};
pub use index::{NodeView, TreeIndex};
pub use intern::{TextHandle, TextInterner};
pub use node::{NodeFlags, NodeId, NodeKind, RawRecord};
pub use offload::{
    BatchOp, Command, CommandId, CommandOutput, ExecutorSession, OffloadChannel, OffloadEvent,
};
pub use search::SearchOutcome;
pub use select::CheckChange;
pub use snapshot::Snapshot;
pub use visible::{VisibleOrder, VisibleRow};
pub use window::{
    RowView, ScrollAlign, Window, WindowRow, compute_window, materialize, scroll_offset_for,
};

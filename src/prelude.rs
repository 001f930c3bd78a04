//! Convenience re-exports of the commonly used types.

pub use crate::config::EngineConfig;
pub use crate::index::TreeIndex;
pub use crate::node::{NodeFlags, NodeId, NodeKind, RawRecord};
pub use crate::offload::{BatchOp, Command, CommandOutput, OffloadChannel, OffloadEvent};
pub use crate::visible::VisibleOrder;
pub use crate::window::{RowView, ScrollAlign, compute_window, materialize};

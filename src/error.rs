use crate::node::NodeId;

/// Errors raised while building or querying a tree index.
///
/// Only [`TreeIndex::build`](crate::TreeIndex::build) is fallible: the three
/// structural variants reject malformed input outright. Operations on
/// existing trees treat unknown ids as no-ops instead of failing;
/// [`TreeError::NodeNotFound`] exists for callers that want to report the
/// condition themselves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("duplicate node id: {0:?}")]
    DuplicateId(NodeId),

    #[error("node {child:?} references unknown parent {parent:?}")]
    UnknownParent { child: NodeId, parent: NodeId },

    #[error("parent chain of node {0:?} forms a cycle")]
    Cycle(NodeId),

    #[error("unknown node id: {0:?}")]
    NodeNotFound(NodeId),
}

/// Errors raised at the offload boundary.
///
/// Neither variant is fatal to the caller: the channel falls back to
/// synchronous in-process execution and keeps serving commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OffloadError {
    #[error("offload channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("executor fault: {0}")]
    ExecutorFault(String),
}

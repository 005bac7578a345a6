//! Error types for the transport layer.

use decree_core::NodeName;

/// Errors surfaced by [`call`](crate::NodeNet::call).
///
/// A partitioned peer does not produce an error by itself: the message
/// is simply lost in transit and the call ends in [`CallError::Timeout`].
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// The reply did not arrive before the deadline.
    #[error("call timed out")]
    Timeout,

    /// The target node is not running, or its actor dropped the request
    /// without replying.
    #[error("peer down: {0}")]
    Down(NodeName),

    /// The request or reply failed to (de)serialize.
    #[error("codec failure: {0}")]
    Codec(String),
}

/// Errors surfaced by [`join`](crate::Cluster::join).
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// A node with this name is already part of the cluster.
    #[error("node name already joined: {0}")]
    NameTaken(NodeName),
}

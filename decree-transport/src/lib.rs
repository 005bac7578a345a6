//! # decree-transport
//!
//! The in-process cluster transport the decree engine runs over.
//!
//! Every agent is reachable by an [`Address`], a pair of
//! ([`ActorName`], node name), and communicates by request/reply
//! exchanges with bounded deadlines:
//!
//! - [`NodeNet::call`] sends one request and awaits the reply;
//! - [`NodeNet::multicall`] fans a request out to a list of peers and
//!   collects the replies that arrive before the deadline (peers that
//!   time out or are unreachable are omitted);
//! - [`NodeNet::subscribe`] yields the node's `nodeup`/`nodedown`
//!   membership stream.
//!
//! The transport is unordered across actors and lossy by configuration:
//! [`Cluster::partition`], [`Cluster::stop`], a symmetric per-hop
//! delivery delay, and a seeded loss probability let tests reproduce
//! partitions, crashes, and chaos deterministically.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

mod cluster;
mod error;
mod inbox;

pub use cluster::{ActorName, Address, Cluster, ClusterConfig, MembershipEvent, NodeNet};
pub use error::{CallError, ClusterError};
pub use inbox::{Inbox, ReplyHandle};

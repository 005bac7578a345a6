//! # decree
//!
//! A single-decree (Basic Paxos) consensus engine: a fixed set of
//! communicating nodes agrees on exactly one value despite message loss,
//! network partitions, and non-Byzantine crashes.
//!
//! Every node runs three cooperating agents over the in-process
//! transport from `decree-transport`:
//!
//! - the **Acceptor** ([`acceptor`]) votes on proposals under strict
//!   promise monotonicity and history-preservation rules, the safety
//!   core of the protocol;
//! - the **Proposer** ([`proposer`]) drives Phase 1 + Phase 2 rounds,
//!   computing the consensus value from the highest previously accepted
//!   proposal and retrying with randomized backoff;
//! - the **Leader** ([`leader`]) elects a single distinguished proposer
//!   per cluster to suppress livelock between duelling proposers, and
//!   forwards client requests to it.
//!
//! ## Getting started
//!
//! ```no_run
//! use decree::Node;
//! use decree_core::Config;
//! use decree_transport::{Cluster, ClusterConfig};
//!
//! # async fn example() -> Result<(), decree_transport::ClusterError> {
//! let cluster = Cluster::new(ClusterConfig::default());
//! let nodes: Vec<Node> = (1..=3)
//!     .map(|i| Node::spawn(&cluster, format!("paxos{i}@local"), Config::default()))
//!     .collect::<Result<_, _>>()?;
//!
//! let outcome = nodes[0].handle().start("pizza").await;
//! assert!(outcome.is_accepted());
//! # Ok(())
//! # }
//! ```
//!
//! Acceptor state is volatile by design: a crash loses it, and the
//! supervisor relaunches crashed agents with fresh state.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod acceptor;
pub mod backoff;
pub mod leader;
pub mod node;
pub mod pool;
pub mod proposer;

pub use acceptor::AcceptorState;
pub use leader::Leader;
pub use node::{Node, NodeHandle};
pub use pool::{run_proposers, ProposerSpec};
pub use proposer::Proposer;

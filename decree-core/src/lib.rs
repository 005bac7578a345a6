//! # decree-core
//!
//! Shared types for the decree single-decree consensus engine.
//!
//! decree implements Basic Paxos: a fixed set of nodes agrees on exactly
//! one value despite message loss, partitions, and non-Byzantine crashes.
//! This crate holds everything the protocol crates agree on:
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`proposal`] | [`ProposalId`], [`AcceptedPair`], the monotone [`ProposalClock`] |
//! | [`value`] | [`Value`], the opaque application payload |
//! | [`message`] | Wire request/reply enums for the three agents |
//! | [`outcome`] | [`RoundOutcome`] returned to clients, [`ErrorKind`] |
//! | [`node`] | [`NodeName`] and stable per-node identifier derivation |
//! | [`codec`] | [`MessageCodec`] trait and the [`JsonCodec`] default |
//! | [`config`] | [`Config`] with the protocol's tunable knobs |
//!
//! The engine itself lives in the `decree` crate; the in-process cluster
//! transport lives in `decree-transport`.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]

pub mod codec;
pub mod config;
pub mod message;
pub mod node;
pub mod outcome;
pub mod proposal;
pub mod value;

pub use codec::{CodecError, JsonCodec, MessageCodec};
pub use config::Config;
pub use message::{AcceptorReply, AcceptorRequest, LeaderReply, LeaderRequest, ProposerReply, ProposerRequest};
pub use node::{stable_id, NodeName};
pub use outcome::{ErrorKind, RoundOutcome, RoundStatus};
pub use proposal::{AcceptedPair, ProposalClock, ProposalId};
pub use value::Value;

//! Wire messages exchanged between agents.
//!
//! Every request/reply pair below round-trips through a
//! [`MessageCodec`](crate::codec::MessageCodec). The enums are internally
//! tagged so `Decline` is a tag of its own, distinct from `Promise` and
//! `Accepted`.

use serde::{Deserialize, Serialize};

use crate::node::NodeName;
use crate::outcome::RoundOutcome;
use crate::proposal::{AcceptedPair, ProposalId};
use crate::value::Value;

/// Requests handled by an Acceptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcceptorRequest {
    /// Phase 1: ask for a promise not to accept lower-numbered proposals.
    Prepare {
        /// The proposal id seeking a promise.
        id: ProposalId,
    },

    /// Phase 2: ask the acceptor to accept a value under a promised id.
    Commit {
        /// The proposal id, which must match the acceptor's promise.
        id: ProposalId,
        /// The value to accept.
        value: Value,
    },
}

/// Replies sent by an Acceptor. Acceptors always reply; they never fail
/// a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AcceptorReply {
    /// The promise was granted. `accepted` carries the acceptor's
    /// highest accepted pair when one exists, so the proposer can learn
    /// and re-propose any value that may already have been chosen.
    Promise {
        /// The id the promise was granted for.
        id: ProposalId,
        /// The acceptor's highest accepted pair, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        accepted: Option<AcceptedPair>,
    },

    /// The value was accepted under the given id.
    Accepted {
        /// The accepted proposal id.
        id: ProposalId,
        /// The accepted value.
        value: Value,
    },

    /// The request lost to a higher promise; state is unchanged.
    Decline,
}

/// Requests handled by a Proposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposerRequest {
    /// Run rounds for `value` until success or the retry budget elapses.
    Start {
        /// The value to propose.
        value: Value,
    },

    /// Run exactly one round for `value`; never retry.
    StartOnce {
        /// The value to propose.
        value: Value,
    },

    /// Ask for the proposer's stable identifier (used by elections).
    GetId,
}

/// Replies sent by a Proposer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposerReply {
    /// The outcome of a `Start` / `StartOnce` request.
    Outcome {
        /// The structured round outcome.
        outcome: RoundOutcome,
    },

    /// The proposer's stable identifier.
    Id {
        /// The identifier string.
        id: String,
    },
}

/// Requests handled by a Leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeaderRequest {
    /// Propose `value` via the current distinguished proposer.
    Start {
        /// The value to propose.
        value: Value,
    },

    /// Ask which node currently hosts the distinguished proposer.
    GetLeader,
}

/// Replies sent by a Leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LeaderReply {
    /// The outcome of a forwarded `Start`.
    Outcome {
        /// The structured round outcome.
        outcome: RoundOutcome,
    },

    /// The current leader, or `None` while the election has not
    /// converged.
    Leader {
        /// The leader's node name, if resolved.
        node: Option<NodeName>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{JsonCodec, MessageCodec};

    #[test]
    fn test_prepare_roundtrip() {
        let codec = JsonCodec;
        let msg = AcceptorRequest::Prepare {
            id: ProposalId::new(9, "abc/p1"),
        };
        let bytes = codec.encode(&msg).expect("encode");
        let decoded: AcceptorRequest = codec.decode(&bytes).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_promise_with_history_roundtrip() {
        let codec = JsonCodec;
        let msg = AcceptorReply::Promise {
            id: ProposalId::new(9, "abc/p1"),
            accepted: Some(AcceptedPair::new(
                ProposalId::new(4, "def/p2"),
                Value::from("pizza"),
            )),
        };
        let bytes = codec.encode(&msg).expect("encode");
        let decoded: AcceptorReply = codec.decode(&bytes).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_decline_is_its_own_tag() {
        let codec = JsonCodec;
        let bytes = codec.encode(&AcceptorReply::Decline).expect("encode");
        assert_eq!(&bytes, br#"{"type":"decline"}"#);
    }

    #[test]
    fn test_bare_promise_omits_history() {
        let codec = JsonCodec;
        let bytes = codec
            .encode(&AcceptorReply::Promise {
                id: ProposalId::new(1, "o"),
                accepted: None,
            })
            .expect("encode");
        let text = String::from_utf8(bytes).expect("utf8");
        assert!(!text.contains("accepted"));
    }

    #[test]
    fn test_get_id_roundtrip() {
        let codec = JsonCodec;
        let bytes = codec.encode(&ProposerRequest::GetId).expect("encode");
        let decoded: ProposerRequest = codec.decode(&bytes).expect("decode");
        assert_eq!(decoded, ProposerRequest::GetId);
    }

    #[test]
    fn test_leader_reply_roundtrip() {
        let codec = JsonCodec;
        let msg = LeaderReply::Leader {
            node: Some(NodeName::from("paxos3@lab")),
        };
        let bytes = codec.encode(&msg).expect("encode");
        let decoded: LeaderReply = codec.decode(&bytes).expect("decode");
        assert_eq!(msg, decoded);
    }
}

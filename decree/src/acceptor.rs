//! The Acceptor: the voter in the Paxos protocol.
//!
//! An acceptor holds two pieces of volatile state: the highest proposal
//! id it has promised (`highest_promise`) and the highest-numbered
//! proposal it has accepted together with its value (`highest_accepted`).
//!
//! ## Rules
//!
//! Phase 1, on `Prepare(id)`:
//! - `id` not higher than the promise: reply `Decline`, state unchanged.
//! - `id` higher, nothing accepted yet: raise the promise, reply
//!   `Promise(id)`.
//! - `id` higher, something accepted: raise the promise (keep the
//!   accepted pair) and reply `Promise(id, accepted)` so the proposer
//!   learns any value that may already have been chosen. This history
//!   propagation is the safety linchpin of Paxos.
//!
//! Phase 2, on `Commit(id, value)`:
//! - `id` equals the promise: record `(id, value)` as accepted, reply
//!   `Accepted(id, value)`.
//! - `id` below the promise: reply `Decline`, state unchanged.
//! - `id` above the promise: a stray commit without a matching promise.
//!   Cannot happen under a well-behaved proposer; reply `Decline` and
//!   leave state unchanged.
//!
//! ## Invariants
//!
//! - `highest_accepted.id <= highest_promise` at all times.
//! - `highest_promise` is monotone non-decreasing over the process
//!   lifetime.
//! - A non-empty `highest_accepted` is only replaced by a pair with a
//!   strictly greater id.
//!
//! State lives in memory only; a crash loses it. Acceptors always reply
//! and never fail a call.

use decree_core::{AcceptedPair, AcceptorReply, AcceptorRequest, NodeName, ProposalId, Value};
use decree_transport::Inbox;
use tracing::debug;

/// The acceptor's volatile state machine.
#[derive(Debug)]
pub struct AcceptorState {
    highest_promise: ProposalId,
    highest_accepted: AcceptedPair,
}

impl Default for AcceptorState {
    fn default() -> Self {
        Self::new()
    }
}

impl AcceptorState {
    /// Create an acceptor that has promised and accepted nothing.
    pub fn new() -> Self {
        Self {
            highest_promise: ProposalId::empty(),
            highest_accepted: AcceptedPair::none(),
        }
    }

    /// The highest promise made so far.
    pub fn highest_promise(&self) -> &ProposalId {
        &self.highest_promise
    }

    /// The highest accepted pair so far.
    pub fn highest_accepted(&self) -> &AcceptedPair {
        &self.highest_accepted
    }

    /// Handle a Phase 1 `Prepare`.
    pub fn handle_prepare(&mut self, id: ProposalId) -> AcceptorReply {
        if id <= self.highest_promise {
            debug!(id = %id, promise = %self.highest_promise, "declining stale prepare");
            return AcceptorReply::Decline;
        }

        self.highest_promise = id.clone();
        let accepted = if self.highest_accepted.is_none() {
            None
        } else {
            Some(self.highest_accepted.clone())
        };
        debug!(id = %id, with_history = accepted.is_some(), "promise granted");
        AcceptorReply::Promise { id, accepted }
    }

    /// Handle a Phase 2 `Commit`.
    pub fn handle_commit(&mut self, id: ProposalId, value: Value) -> AcceptorReply {
        if id == self.highest_promise {
            self.highest_accepted = AcceptedPair::new(id.clone(), value.clone());
            debug!(id = %id, value = %value, "value accepted");
            AcceptorReply::Accepted { id, value }
        } else {
            // Below the promise: stale. Above the promise: a stray commit
            // without a matching prepare.
            debug!(id = %id, promise = %self.highest_promise, "declining commit");
            AcceptorReply::Decline
        }
    }
}

/// Run the acceptor mailbox loop until the inbox closes.
pub async fn run_acceptor(node: NodeName, mut inbox: Inbox) {
    let mut state = AcceptorState::new();
    debug!(node = %node, "acceptor running");
    while let Some((request, reply)) = inbox.next::<AcceptorRequest>().await {
        let response = match request {
            AcceptorRequest::Prepare { id } => state.handle_prepare(id),
            AcceptorRequest::Commit { id, value } => state.handle_commit(id, value),
        };
        reply.send(&response);
    }
    debug!(node = %node, "acceptor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(sequence: i64, origin: &str) -> ProposalId {
        ProposalId::new(sequence, origin)
    }

    #[test]
    fn test_first_prepare_promises_without_history() {
        let mut acceptor = AcceptorState::new();

        let reply = acceptor.handle_prepare(id(1, "p1"));
        assert_eq!(
            reply,
            AcceptorReply::Promise {
                id: id(1, "p1"),
                accepted: None,
            }
        );
        assert_eq!(acceptor.highest_promise(), &id(1, "p1"));
    }

    #[test]
    fn test_prepare_not_higher_is_declined() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(5, "p1"));

        // Lower sequence.
        assert_eq!(acceptor.handle_prepare(id(3, "p1")), AcceptorReply::Decline);
        // Equal id: "not higher" includes equality.
        assert_eq!(acceptor.handle_prepare(id(5, "p1")), AcceptorReply::Decline);
        // State unchanged.
        assert_eq!(acceptor.highest_promise(), &id(5, "p1"));
    }

    #[test]
    fn test_prepare_tie_breaks_on_origin() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(5, "pa"));

        // Same sequence, greater origin: higher under the total order.
        let reply = acceptor.handle_prepare(id(5, "pb"));
        assert!(matches!(reply, AcceptorReply::Promise { .. }));
        assert_eq!(acceptor.highest_promise(), &id(5, "pb"));
    }

    #[test]
    fn test_prepare_after_accept_carries_history() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(1, "p1"));
        acceptor.handle_commit(id(1, "p1"), Value::from("pizza"));

        let reply = acceptor.handle_prepare(id(2, "p2"));
        assert_eq!(
            reply,
            AcceptorReply::Promise {
                id: id(2, "p2"),
                accepted: Some(AcceptedPair::new(id(1, "p1"), Value::from("pizza"))),
            }
        );
        // The accepted pair survives the new promise.
        assert_eq!(
            acceptor.highest_accepted(),
            &AcceptedPair::new(id(1, "p1"), Value::from("pizza"))
        );
    }

    #[test]
    fn test_commit_at_promise_is_accepted() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(3, "p1"));

        let reply = acceptor.handle_commit(id(3, "p1"), Value::from("v"));
        assert_eq!(
            reply,
            AcceptorReply::Accepted {
                id: id(3, "p1"),
                value: Value::from("v"),
            }
        );
    }

    #[test]
    fn test_commit_below_promise_is_declined() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(1, "p1"));
        acceptor.handle_commit(id(1, "p1"), Value::from("old"));
        acceptor.handle_prepare(id(5, "p2"));

        let reply = acceptor.handle_commit(id(1, "p1"), Value::from("old"));
        assert_eq!(reply, AcceptorReply::Decline);
        // The earlier acceptance is preserved.
        assert_eq!(
            acceptor.highest_accepted(),
            &AcceptedPair::new(id(1, "p1"), Value::from("old"))
        );
    }

    #[test]
    fn test_commit_above_promise_is_declined() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(2, "p1"));

        // A commit the acceptor never promised: defensively declined.
        let reply = acceptor.handle_commit(id(9, "p9"), Value::from("stray"));
        assert_eq!(reply, AcceptorReply::Decline);
        assert_eq!(acceptor.highest_promise(), &id(2, "p1"));
        assert!(acceptor.highest_accepted().is_none());
    }

    #[test]
    fn test_replayed_commit_is_idempotent() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(4, "p1"));
        acceptor.handle_commit(id(4, "p1"), Value::from("v"));

        // Replaying the same commit yields Accepted with the same value.
        let reply = acceptor.handle_commit(id(4, "p1"), Value::from("v"));
        assert_eq!(
            reply,
            AcceptorReply::Accepted {
                id: id(4, "p1"),
                value: Value::from("v"),
            }
        );
    }

    #[test]
    fn test_promise_monotonicity() {
        let mut acceptor = AcceptorState::new();
        let mut last = ProposalId::empty();

        for (sequence, origin) in [(1, "a"), (3, "b"), (2, "c"), (3, "a"), (7, "z"), (6, "q")] {
            acceptor.handle_prepare(id(sequence, origin));
            assert!(acceptor.highest_promise() >= &last);
            last = acceptor.highest_promise().clone();
        }
    }

    #[test]
    fn test_accepted_only_replaced_by_greater_id() {
        let mut acceptor = AcceptorState::new();
        acceptor.handle_prepare(id(1, "p1"));
        acceptor.handle_commit(id(1, "p1"), Value::from("first"));

        acceptor.handle_prepare(id(2, "p2"));
        acceptor.handle_commit(id(2, "p2"), Value::from("second"));

        assert_eq!(
            acceptor.highest_accepted(),
            &AcceptedPair::new(id(2, "p2"), Value::from("second"))
        );
    }
}

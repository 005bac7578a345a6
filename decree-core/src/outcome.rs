//! The structured result of a proposal round.
//!
//! Every `Start` / `StartOnce` call returns a [`RoundOutcome`] rather
//! than an error: the protocol's failure modes are data, not exceptions.
//! The only fatal condition anywhere in the engine is an internal
//! invariant violation (a programmer error), which panics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::node::NodeName;
use crate::proposal::ProposalId;
use crate::value::Value;

/// How a round concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// A majority of acceptors accepted the round's value.
    Accepted,
    /// Phase 2 ran but fell short of a majority.
    Declined,
    /// The round could not run to a Phase 2 verdict.
    Error,
}

/// Error kinds surfaced in a [`RoundOutcome`].
///
/// The `Display` strings are the canonical wire-visible names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Fewer than `min_quorum` reachable peers at Phase 1. Retrying
    /// cannot help until the topology changes, so the proposer never
    /// retries this.
    #[error("prepare_nodes_below_min_quorum")]
    PrepareNodesBelowMinQuorum,

    /// Phase 1 lacked majority promises.
    #[error("prepare_consensus_not_reached")]
    PrepareConsensusNotReached,

    /// Phase 2 lacked majority accepts.
    #[error("commit_declined")]
    CommitDeclined,

    /// The client deadline elapsed before an outcome arrived.
    #[error("timeout")]
    Timeout,

    /// Unexpected transport failure or actor exit.
    #[error("catch_all")]
    CatchAll,
}

/// Structured record returned to the caller of a round.
///
/// When `status` is [`RoundStatus::Accepted`], `round` and `value` are
/// singletons and equal across all accepting acceptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundOutcome {
    /// How the round concluded.
    pub status: RoundStatus,

    /// Acceptors that accepted the round's id and value.
    pub participants: BTreeSet<NodeName>,

    /// The round's proposal id (singleton on success).
    pub round: BTreeSet<ProposalId>,

    /// The round's value (singleton on success).
    pub value: BTreeSet<Value>,

    /// Acceptors that replied `Decline` in Phase 2.
    pub declines: BTreeSet<NodeName>,

    /// The error kind, when the outcome is not a success.
    pub error_kind: Option<ErrorKind>,
}

impl RoundOutcome {
    /// Build a successful outcome.
    pub fn accepted(
        participants: BTreeSet<NodeName>,
        round: ProposalId,
        value: Value,
        declines: BTreeSet<NodeName>,
    ) -> Self {
        Self {
            status: RoundStatus::Accepted,
            participants,
            round: BTreeSet::from([round]),
            value: BTreeSet::from([value]),
            declines,
            error_kind: None,
        }
    }

    /// Build a declined outcome (Phase 2 fell short of a majority).
    ///
    /// Carries `commit_declined` so retry classification can treat it as
    /// an error-tagged result while the status stays `declined`.
    pub fn declined(
        participants: BTreeSet<NodeName>,
        round: ProposalId,
        value: Value,
        declines: BTreeSet<NodeName>,
    ) -> Self {
        Self {
            status: RoundStatus::Declined,
            participants,
            round: BTreeSet::from([round]),
            value: BTreeSet::from([value]),
            declines,
            error_kind: Some(ErrorKind::CommitDeclined),
        }
    }

    /// Build an error outcome.
    pub fn error(kind: ErrorKind) -> Self {
        Self {
            status: RoundStatus::Error,
            participants: BTreeSet::new(),
            round: BTreeSet::new(),
            value: BTreeSet::new(),
            declines: BTreeSet::new(),
            error_kind: Some(kind),
        }
    }

    /// Whether this outcome is a success.
    pub fn is_accepted(&self) -> bool {
        self.status == RoundStatus::Accepted
    }

    /// Whether a retrying `Start` should run another round after this
    /// outcome.
    ///
    /// Declined Phase 2 and missed Phase 1 majorities are retryable; a
    /// success is terminal, and so is `prepare_nodes_below_min_quorum`
    /// (only a topology change can help).
    pub fn is_retryable(&self) -> bool {
        match self.status {
            RoundStatus::Accepted => false,
            RoundStatus::Declined => true,
            RoundStatus::Error => matches!(
                self.error_kind,
                Some(ErrorKind::PrepareConsensusNotReached) | Some(ErrorKind::CommitDeclined)
            ),
        }
    }

    /// The singleton value of a successful outcome.
    pub fn single_value(&self) -> Option<&Value> {
        if self.value.len() == 1 {
            self.value.iter().next()
        } else {
            None
        }
    }

    /// The singleton round id of a successful outcome.
    pub fn single_round(&self) -> Option<&ProposalId> {
        if self.round.len() == 1 {
            self.round.iter().next()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(names: &[&str]) -> BTreeSet<NodeName> {
        names.iter().map(|n| NodeName::from(*n)).collect()
    }

    #[test]
    fn test_accepted_outcome_shape() {
        let out = RoundOutcome::accepted(
            nodes(&["paxos1", "paxos2"]),
            ProposalId::new(1, "o"),
            Value::from("pizza"),
            BTreeSet::new(),
        );
        assert!(out.is_accepted());
        assert!(!out.is_retryable());
        assert_eq!(out.single_value(), Some(&Value::from("pizza")));
        assert_eq!(out.single_round(), Some(&ProposalId::new(1, "o")));
        assert!(out.error_kind.is_none());
    }

    #[test]
    fn test_declined_is_retryable_and_error_tagged() {
        let out = RoundOutcome::declined(
            BTreeSet::new(),
            ProposalId::new(1, "o"),
            Value::from("v"),
            nodes(&["paxos2", "paxos3"]),
        );
        assert_eq!(out.status, RoundStatus::Declined);
        assert!(out.is_retryable());
        assert_eq!(out.error_kind, Some(ErrorKind::CommitDeclined));
    }

    #[test]
    fn test_retry_classification() {
        assert!(RoundOutcome::error(ErrorKind::PrepareConsensusNotReached).is_retryable());
        assert!(RoundOutcome::error(ErrorKind::CommitDeclined).is_retryable());
        assert!(!RoundOutcome::error(ErrorKind::PrepareNodesBelowMinQuorum).is_retryable());
        assert!(!RoundOutcome::error(ErrorKind::Timeout).is_retryable());
        assert!(!RoundOutcome::error(ErrorKind::CatchAll).is_retryable());
    }

    #[test]
    fn test_error_kind_canonical_strings() {
        assert_eq!(
            ErrorKind::PrepareNodesBelowMinQuorum.to_string(),
            "prepare_nodes_below_min_quorum"
        );
        assert_eq!(
            ErrorKind::PrepareConsensusNotReached.to_string(),
            "prepare_consensus_not_reached"
        );
        assert_eq!(ErrorKind::CommitDeclined.to_string(), "commit_declined");
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
        assert_eq!(ErrorKind::CatchAll.to_string(), "catch_all");
    }

    #[test]
    fn test_serde_roundtrip() {
        let out = RoundOutcome::error(ErrorKind::Timeout);
        let json = serde_json::to_string(&out).expect("serialize");
        assert!(json.contains("\"timeout\""));
        let decoded: RoundOutcome = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(out, decoded);
    }
}

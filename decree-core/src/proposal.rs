//! Proposal identifiers and the accepted-pair record.
//!
//! A [`ProposalId`] names one full Phase 1 + Phase 2 attempt. Ids are
//! totally ordered: first by `sequence`, then by byte-wise comparison of
//! `origin`. The `origin` is the issuing proposer's stable identifier, so
//! two proposers minting ids in the same nanosecond still order
//! deterministically.
//!
//! # Invariants
//!
//! - The sentinel [`ProposalId::empty`] `(0, "")` is smaller than every id
//!   a proposer can mint.
//! - A proposer's successive ids form a strictly increasing sequence;
//!   [`ProposalClock`] enforces this even if the wall clock stalls or
//!   steps backwards.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::Value;

/// Total-ordered identifier of a single proposal attempt.
///
/// Ordering is derived from field order: `a > b` iff
/// `a.sequence > b.sequence`, or the sequences are equal and `a.origin`
/// is byte-wise greater than `b.origin`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProposalId {
    /// Strictly monotone time component, nanoseconds since the Unix epoch.
    pub sequence: i64,

    /// Stable identifier of the proposer that minted this id.
    pub origin: String,
}

impl ProposalId {
    /// Create a proposal id from its parts.
    pub fn new(sequence: i64, origin: impl Into<String>) -> Self {
        Self {
            sequence,
            origin: origin.into(),
        }
    }

    /// The sentinel id `(0, "")`, smaller than every real id.
    pub fn empty() -> Self {
        Self {
            sequence: 0,
            origin: String::new(),
        }
    }

    /// Whether this is the sentinel id.
    pub fn is_empty(&self) -> bool {
        self.sequence == 0 && self.origin.is_empty()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "proposal(empty)")
        } else {
            write!(f, "proposal({}:{})", self.sequence, self.origin)
        }
    }
}

/// The highest-numbered proposal an acceptor has accepted, and the value
/// it carried. `(empty, None)` means "none yet".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptedPair {
    /// Id of the accepted proposal, or the sentinel.
    pub id: ProposalId,

    /// The accepted value. Present iff `id` is not the sentinel.
    pub value: Option<Value>,
}

impl AcceptedPair {
    /// The initial "nothing accepted" pair.
    pub fn none() -> Self {
        Self {
            id: ProposalId::empty(),
            value: None,
        }
    }

    /// Build a pair recording an accepted proposal.
    pub fn new(id: ProposalId, value: Value) -> Self {
        Self {
            id,
            value: Some(value),
        }
    }

    /// Whether this pair records an actual acceptance.
    pub fn is_none(&self) -> bool {
        self.id.is_empty()
    }
}

impl Default for AcceptedPair {
    fn default() -> Self {
        Self::none()
    }
}

/// Monotone sequence source for proposal ids.
///
/// Reads the nanosecond wall clock and clamps the result to be strictly
/// greater than the previously issued sequence, so each call yields a
/// fresh, strictly greater id even under clock steps.
#[derive(Debug, Default)]
pub struct ProposalClock {
    last: i64,
}

impl ProposalClock {
    /// Create a clock that has issued nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint the next proposal id for `origin`.
    pub fn next(&mut self, origin: &str) -> ProposalId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        let sequence = now.max(self.last + 1);
        self.last = sequence;
        ProposalId::new(sequence, origin)
    }
}

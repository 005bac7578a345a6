//! A small task pool for driving concurrent proposers.
//!
//! The duel scenarios need several proposers starting at staggered
//! offsets; this drives each through its node's handle and collects the
//! outcomes in spec order.

use std::time::Duration;

use decree_core::{ErrorKind, RoundOutcome, Value};
use tokio::task::JoinSet;
use tracing::warn;

use crate::node::NodeHandle;

/// One proposer to drive: where, when, what, and whether to retry.
pub struct ProposerSpec {
    /// The node whose proposer runs the rounds.
    pub handle: NodeHandle,
    /// How long to wait before starting.
    pub delay: Duration,
    /// The value to propose.
    pub value: Value,
    /// `true` drives `Start` (retrying), `false` drives `StartOnce`.
    pub retries: bool,
}

impl ProposerSpec {
    /// Build a spec.
    pub fn new(
        handle: NodeHandle,
        delay: Duration,
        value: impl Into<Value>,
        retries: bool,
    ) -> Self {
        Self {
            handle,
            delay,
            value: value.into(),
            retries,
        }
    }
}

/// Run every spec concurrently and return the outcomes in spec order.
pub async fn run_proposers(specs: Vec<ProposerSpec>) -> Vec<RoundOutcome> {
    let count = specs.len();
    let mut tasks = JoinSet::new();
    for (index, spec) in specs.into_iter().enumerate() {
        tasks.spawn(async move {
            if !spec.delay.is_zero() {
                tokio::time::sleep(spec.delay).await;
            }
            let outcome = if spec.retries {
                spec.handle.propose(spec.value).await
            } else {
                spec.handle.propose_once(spec.value).await
            };
            (index, outcome)
        });
    }

    let mut outcomes: Vec<Option<RoundOutcome>> = (0..count).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => outcomes[index] = Some(outcome),
            Err(error) => warn!(%error, "proposer driver task failed"),
        }
    }
    outcomes
        .into_iter()
        .map(|outcome| outcome.unwrap_or_else(|| RoundOutcome::error(ErrorKind::CatchAll)))
        .collect()
}

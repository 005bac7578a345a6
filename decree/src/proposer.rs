//! The Proposer: the round driver seeking majority acceptance.
//!
//! One round is a Phase 1 + Phase 2 handshake:
//!
//! 1. Mint a fresh [`ProposalId`] strictly greater than any previously
//!    issued (monotone clock, this proposer's stable id as origin).
//! 2. Multicast `Prepare` to every peer acceptor (self included) and
//!    collect replies within the round timeout.
//! 3. Check the peer snapshot against `min_quorum`; compute the quorum
//!    `q = n/2 + 1`.
//! 4. Count promises. Short of `q`: `prepare_consensus_not_reached`.
//! 5. Among the promises, adopt the value of the highest accepted pair
//!    if any exists; otherwise propose our own value. Re-proposing the
//!    highest learned value is what preserves any possibly-chosen value.
//! 6. Multicast `Commit` with the chosen value.
//! 7. Partition replies into participants (accepted our id and value)
//!    and declines; discard anything else.
//! 8. Quorum of accepts: success. Otherwise: declined.
//!
//! `Start` wraps the round in randomized exponential backoff under a
//! total elapsed budget; `StartOnce` runs a single round. Rounds are
//! serialized by the mailbox: at most one is in flight per proposer.
//!
//! The live peer set is maintained from membership notifications and
//! snapshotted at the start of each attempt, so a retry observes
//! topology changes but a round in flight does not.

use std::collections::BTreeSet;
use std::time::Duration;

use decree_core::{
    stable_id, AcceptedPair, AcceptorReply, AcceptorRequest, Config, ErrorKind, NodeName,
    ProposalClock, ProposalId, ProposerReply, ProposerRequest, RoundOutcome, Value,
};
use decree_transport::{ActorName, Inbox, MembershipEvent, NodeNet};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;

/// The per-node proposer agent.
pub struct Proposer {
    net: NodeNet,
    config: Config,
    id: String,
    clock: ProposalClock,
    current_round: ProposalId,
    peers: BTreeSet<NodeName>,
    rng: StdRng,
}

impl Proposer {
    /// Create a proposer for the node behind `net`.
    ///
    /// The stable id is derived once here and becomes the `origin` of
    /// every proposal id this proposer mints. The peer set is seeded
    /// from the transport and maintained from membership events.
    pub fn new(net: NodeNet, config: Config) -> Self {
        let id = stable_id(net.node());
        let peers = net.peers(&config.excluded_nodes).into_iter().collect();
        Self {
            net,
            config,
            id,
            clock: ProposalClock::new(),
            current_round: ProposalId::empty(),
            peers,
            rng: StdRng::from_os_rng(),
        }
    }

    /// The stable identifier used for leader comparison.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The number of live peers (self included).
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    fn apply_event(&mut self, event: MembershipEvent) {
        match event {
            MembershipEvent::Up(node) => {
                if !self.config.excluded_nodes.contains(&node) && self.peers.insert(node.clone()) {
                    debug!(node = %node, peers = self.peers.len(), "peer up");
                }
            }
            MembershipEvent::Down(node) => {
                if self.peers.remove(&node) {
                    debug!(node = %node, peers = self.peers.len(), "peer down");
                }
            }
        }
    }

    /// Apply every membership event that has already arrived, without
    /// blocking. Called between rounds so each attempt sees the current
    /// topology.
    fn drain_membership(&mut self, events: &mut broadcast::Receiver<MembershipEvent>) {
        loop {
            match events.try_recv() {
                Ok(event) => self.apply_event(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "membership stream lagged; resyncing peer set");
                    self.peers = self
                        .net
                        .peers(&self.config.excluded_nodes)
                        .into_iter()
                        .collect();
                }
                Err(_) => break,
            }
        }
    }

    /// Mint a proposal id strictly greater than any this proposer has
    /// issued.
    fn next_round(&mut self) -> ProposalId {
        let id = self.clock.next(&self.id);
        debug_assert!(id > self.current_round);
        self.current_round = id.clone();
        id
    }

    /// Run one full Phase 1 + Phase 2 attempt.
    async fn attempt(&mut self, value: &Value) -> RoundOutcome {
        let round = self.next_round();
        let targets: Vec<NodeName> = self.peers.iter().cloned().collect();
        let peer_count = targets.len();

        if peer_count < self.config.min_quorum {
            warn!(
                round = %round,
                peers = peer_count,
                min_quorum = self.config.min_quorum,
                "not enough peers to attempt a round"
            );
            return RoundOutcome::error(ErrorKind::PrepareNodesBelowMinQuorum);
        }
        let quorum = peer_count / 2 + 1;

        // Phase 1: collect promises.
        let replies = self
            .net
            .multicall::<AcceptorRequest, AcceptorReply>(
                &targets,
                ActorName::Acceptor,
                &AcceptorRequest::Prepare { id: round.clone() },
                self.config.round_timeout,
            )
            .await;
        assert!(
            replies.len() <= peer_count,
            "multicall returned {} replies for {} peers",
            replies.len(),
            peer_count
        );

        let mut promises = 0usize;
        let mut learned = AcceptedPair::none();
        for (node, reply) in &replies {
            match reply {
                AcceptorReply::Promise { accepted, .. } => {
                    promises += 1;
                    if let Some(pair) = accepted {
                        if pair.id > learned.id {
                            learned = pair.clone();
                        }
                    }
                }
                AcceptorReply::Decline => {}
                other => {
                    debug!(node = %node, reply = ?other, "discarding unexpected prepare reply");
                }
            }
        }

        if promises < quorum {
            debug!(round = %round, promises, quorum, "prepare fell short of quorum");
            return RoundOutcome::error(ErrorKind::PrepareConsensusNotReached);
        }

        // The consensus value: the highest previously accepted value if
        // any promise carried one, otherwise our own.
        let chosen = match learned.value {
            Some(learned_value) => {
                info!(
                    round = %round,
                    learned_from = %learned.id,
                    value = %learned_value,
                    "re-proposing previously accepted value"
                );
                learned_value
            }
            None => value.clone(),
        };

        // Phase 2: seek majority acceptance.
        let replies = self
            .net
            .multicall::<AcceptorRequest, AcceptorReply>(
                &targets,
                ActorName::Acceptor,
                &AcceptorRequest::Commit {
                    id: round.clone(),
                    value: chosen.clone(),
                },
                self.config.round_timeout,
            )
            .await;
        assert!(
            replies.len() <= peer_count,
            "multicall returned {} replies for {} peers",
            replies.len(),
            peer_count
        );

        let mut participants = BTreeSet::new();
        let mut declines = BTreeSet::new();
        for (node, reply) in replies {
            match reply {
                AcceptorReply::Accepted { id, value } if id == round && value == chosen => {
                    participants.insert(node);
                }
                AcceptorReply::Decline => {
                    declines.insert(node);
                }
                other => {
                    debug!(node = %node, reply = ?other, "discarding unexpected commit reply");
                }
            }
        }

        if participants.len() >= quorum {
            info!(
                round = %round,
                value = %chosen,
                accepted = participants.len(),
                declined = declines.len(),
                "round accepted"
            );
            RoundOutcome::accepted(participants, round, chosen, declines)
        } else {
            debug!(
                round = %round,
                accepted = participants.len(),
                declined = declines.len(),
                quorum,
                "round declined"
            );
            RoundOutcome::declined(participants, round, chosen, declines)
        }
    }

    /// Run rounds for `value` until one succeeds, a terminal failure
    /// occurs, or (with `retries`) the retry budget elapses.
    async fn start(
        &mut self,
        value: Value,
        retries: bool,
        events: &mut broadcast::Receiver<MembershipEvent>,
    ) -> RoundOutcome {
        let deadline = Instant::now() + self.config.retry_budget;
        let mut backoff = Backoff::new();

        loop {
            self.drain_membership(events);
            let outcome = self.attempt(&value).await;

            if !retries || !outcome.is_retryable() {
                return outcome;
            }
            let delay = backoff.next_delay(&mut self.rng);
            if Instant::now() + delay >= deadline {
                debug!(value = %value, "retry budget exhausted");
                return outcome;
            }
            debug!(value = %value, delay_ms = delay.as_millis() as u64, "retrying after backoff");
            tokio::time::sleep(delay).await;
        }
    }

    /// Run the proposer mailbox loop until the inbox closes.
    ///
    /// Requests are served one at a time in arrival order, which
    /// serializes rounds. Membership events are drained between
    /// requests and between retries.
    pub async fn run(mut self, mut inbox: Inbox) {
        let mut events = self.net.subscribe();
        // Snapshot after subscribing: joins that raced construction are
        // either in the snapshot or in the event stream, never lost.
        self.peers = self
            .net
            .peers(&self.config.excluded_nodes)
            .into_iter()
            .collect();
        debug!(node = %self.net.node(), id = %self.id, "proposer running");

        while let Some((request, reply)) = inbox.next::<ProposerRequest>().await {
            self.drain_membership(&mut events);
            match request {
                ProposerRequest::Start { value } => {
                    let outcome = self.start(value, true, &mut events).await;
                    reply.send(&ProposerReply::Outcome { outcome });
                }
                ProposerRequest::StartOnce { value } => {
                    let outcome = self.start(value, false, &mut events).await;
                    reply.send(&ProposerReply::Outcome { outcome });
                }
                ProposerRequest::GetId => {
                    reply.send(&ProposerReply::Id {
                        id: self.id.clone(),
                    });
                }
            }
        }
        debug!(node = %self.net.node(), "proposer stopped");
    }
}

/// Convenience: how long a caller should wait on a forwarded proposer
/// request before giving up.
pub(crate) fn forward_timeout(config: &Config) -> Duration {
    config.retry_budget + 2 * config.round_timeout
}

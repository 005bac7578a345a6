//! The Leader: election agent and client entry point.
//!
//! Consensus safety never depends on leader uniqueness (only the
//! acceptor rules guarantee it) but progress does: duelling proposers
//! can preempt each other's rounds forever. The leader designates a
//! single distinguished proposer per cluster and forwards client
//! `Start` requests to it.
//!
//! ## Election
//!
//! On demand (or on a startup timer), the leader multicalls every peer's
//! proposer for its stable id and picks the lexicographically greatest.
//! Ids hash the node-name component before `@`, so greatness does not
//! trivially correlate with a numeric suffix, and distinct nodes cannot
//! tie.
//!
//! On `nodedown` of the current leader the choice is cleared and a
//! re-election is scheduled after a settle delay; other membership
//! events change nothing. An election that returns no candidates leaves
//! the leader unresolved and schedules a retry. Election failures are
//! swallowed; callers only ever see a resolved leader or an empty one,
//! never partial election state.

use decree_core::{
    Config, ErrorKind, LeaderReply, LeaderRequest, NodeName, ProposerReply, ProposerRequest,
    RoundOutcome, Value,
};
use decree_transport::{ActorName, Address, CallError, Inbox, MembershipEvent, NodeNet};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::proposer::forward_timeout;

/// The currently resolved distinguished proposer.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ChosenLeader {
    node: NodeName,
    id: String,
}

/// The per-node leader agent.
pub struct Leader {
    net: NodeNet,
    config: Config,
    chosen: Option<ChosenLeader>,
}

impl Leader {
    /// Create a leader agent for the node behind `net`.
    pub fn new(net: NodeNet, config: Config) -> Self {
        Self {
            net,
            config,
            chosen: None,
        }
    }

    /// The currently resolved leader node, if any.
    pub fn leader(&self) -> Option<&NodeName> {
        self.chosen.as_ref().map(|c| &c.node)
    }

    /// Resolve the distinguished proposer by asking every peer's
    /// proposer for its id and keeping the greatest.
    ///
    /// Returns whether the election resolved a leader.
    async fn elect(&mut self) -> bool {
        let candidates = self.net.peers(&self.config.excluded_nodes);
        let replies = self
            .net
            .multicall::<ProposerRequest, ProposerReply>(
                &candidates,
                ActorName::Proposer,
                &ProposerRequest::GetId,
                self.config.round_timeout,
            )
            .await;

        let mut best: Option<ChosenLeader> = None;
        for (node, reply) in replies {
            let ProposerReply::Id { id } = reply else {
                debug!(node = %node, "discarding unexpected election reply");
                continue;
            };
            let better = best.as_ref().map_or(true, |b| id > b.id);
            if better {
                best = Some(ChosenLeader { node, id });
            }
        }

        match best {
            Some(chosen) => {
                if self.chosen.as_ref() != Some(&chosen) {
                    info!(leader = %chosen.node, id = %chosen.id, "leader resolved");
                }
                self.chosen = Some(chosen);
                true
            }
            None => {
                warn!("election returned no candidates; leader stays unresolved");
                false
            }
        }
    }

    /// Forward a client `Start` to the distinguished proposer, electing
    /// first if unresolved.
    async fn handle_start(&mut self, value: Value) -> (RoundOutcome, bool) {
        if self.chosen.is_none() && !self.elect().await {
            // Still unresolved; let the timer retry the election.
            return (RoundOutcome::error(ErrorKind::CatchAll), true);
        }
        let Some(chosen) = self.chosen.clone() else {
            return (RoundOutcome::error(ErrorKind::CatchAll), true);
        };

        let target = Address::new(ActorName::Proposer, chosen.node.clone());
        let result = self
            .net
            .call::<ProposerRequest, ProposerReply>(
                &target,
                &ProposerRequest::Start { value },
                forward_timeout(&self.config),
            )
            .await;

        match result {
            Ok(ProposerReply::Outcome { outcome }) => (outcome, false),
            Ok(other) => {
                warn!(leader = %chosen.node, reply = ?other, "unexpected reply to forwarded start");
                (RoundOutcome::error(ErrorKind::CatchAll), false)
            }
            Err(CallError::Timeout) => {
                warn!(leader = %chosen.node, "forwarded start timed out");
                (RoundOutcome::error(ErrorKind::Timeout), false)
            }
            Err(error) => {
                warn!(leader = %chosen.node, %error, "forwarded start failed");
                // The leader's node is gone; drop the stale choice.
                self.chosen = None;
                (RoundOutcome::error(ErrorKind::CatchAll), true)
            }
        }
    }

    fn on_membership(&mut self, event: MembershipEvent) -> bool {
        match event {
            MembershipEvent::Down(node) => {
                if self.leader() == Some(&node) {
                    info!(leader = %node, "current leader went down; scheduling re-election");
                    self.chosen = None;
                    return true;
                }
                false
            }
            // A new peer changes nothing immediately; later rounds pick
            // it up through proposer membership tracking.
            MembershipEvent::Up(_) => false,
        }
    }

    /// Run the leader mailbox loop until the inbox closes.
    pub async fn run(mut self, mut inbox: Inbox) {
        let mut events = self.net.subscribe();
        let mut election_at = Some(Instant::now() + self.config.election_startup_delay);
        debug!(node = %self.net.node(), "leader running");

        loop {
            let timer = election_timer(election_at);
            tokio::select! {
                maybe = inbox.next::<LeaderRequest>() => {
                    let Some((request, reply)) = maybe else { break };
                    match request {
                        LeaderRequest::Start { value } => {
                            let (outcome, reschedule) = self.handle_start(value).await;
                            if reschedule {
                                election_at = Some(
                                    Instant::now() + self.config.leader_choose_delay,
                                );
                            }
                            reply.send(&LeaderReply::Outcome { outcome });
                        }
                        LeaderRequest::GetLeader => {
                            reply.send(&LeaderReply::Leader {
                                node: self.leader().cloned(),
                            });
                        }
                    }
                }
                _ = timer => {
                    election_at = if self.elect().await {
                        None
                    } else {
                        Some(Instant::now() + self.config.leader_choose_delay)
                    };
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if self.on_membership(event) {
                                election_at = Some(
                                    Instant::now() + self.config.leader_choose_delay,
                                );
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "membership stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        debug!(node = %self.net.node(), "leader stopped");
    }
}

/// A future that fires at `at`, or never when `at` is `None`.
async fn election_timer(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decree_core::stable_id;
    use decree_transport::{Cluster, ClusterConfig};
    use std::time::Duration;

    fn small_config() -> Config {
        Config {
            round_timeout: Duration::from_millis(200),
            leader_choose_delay: Duration::from_millis(100),
            ..Config::default()
        }
    }

    /// Serve `GetId` on a node's proposer slot with the real stable id.
    fn spawn_id_server(cluster: &Cluster, name: &str) {
        let net = cluster.join(name).expect("join");
        let mut inbox = net.register(ActorName::Proposer);
        let id = stable_id(net.node());
        tokio::spawn(async move {
            while let Some((request, reply)) = inbox.next::<ProposerRequest>().await {
                if matches!(request, ProposerRequest::GetId) {
                    reply.send(&ProposerReply::Id { id: id.clone() });
                }
            }
        });
    }

    #[tokio::test(start_paused = true)]
    async fn test_election_picks_greatest_id() {
        let cluster = Cluster::new(ClusterConfig::default());
        let net = cluster.join("client@lab").expect("join");
        for name in ["paxos1@lab", "paxos2@lab", "paxos3@lab"] {
            spawn_id_server(&cluster, name);
        }
        tokio::task::yield_now().await;

        let mut leader = Leader::new(net, small_config());
        assert!(leader.elect().await);

        let expected = ["paxos1@lab", "paxos2@lab", "paxos3@lab", "client@lab"]
            .iter()
            .map(|n| {
                let node = NodeName::from(*n);
                (stable_id(&node), node)
            })
            .filter(|(_, node)| node.as_str() != "client@lab")
            .max()
            .map(|(_, node)| node)
            .expect("candidates");
        assert_eq!(leader.leader(), Some(&expected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_election_with_no_candidates_stays_unresolved() {
        let cluster = Cluster::new(ClusterConfig::default());
        let net = cluster.join("client@lab").expect("join");
        let mut leader = Leader::new(net, small_config());

        // Only the client node exists and it runs no proposer.
        assert!(!leader.elect().await);
        assert!(leader.leader().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nodedown_of_leader_clears_choice() {
        let cluster = Cluster::new(ClusterConfig::default());
        let net = cluster.join("client@lab").expect("join");
        spawn_id_server(&cluster, "paxos1@lab");
        tokio::task::yield_now().await;

        let mut leader = Leader::new(net, small_config());
        assert!(leader.elect().await);
        let chosen = leader.leader().cloned().expect("resolved");

        // A down event for some other node changes nothing.
        assert!(!leader.on_membership(MembershipEvent::Down(NodeName::from("other@lab"))));
        assert_eq!(leader.leader(), Some(&chosen));

        // Losing the chosen node clears the choice and asks for a
        // re-election.
        assert!(leader.on_membership(MembershipEvent::Down(chosen)));
        assert!(leader.leader().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_nodeup_changes_nothing() {
        let cluster = Cluster::new(ClusterConfig::default());
        let net = cluster.join("client@lab").expect("join");
        spawn_id_server(&cluster, "paxos1@lab");
        tokio::task::yield_now().await;

        let mut leader = Leader::new(net, small_config());
        assert!(leader.elect().await);
        let chosen = leader.leader().cloned().expect("resolved");

        assert!(!leader.on_membership(MembershipEvent::Up(NodeName::from("new@lab"))));
        assert_eq!(leader.leader(), Some(&chosen));
    }
}

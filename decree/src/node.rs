//! Per-node wiring: agent launch, supervision, and the client surface.
//!
//! [`Node::spawn`] joins a node to the cluster and launches its three
//! agents (Acceptor, Proposer, Leader), each as a task owning a private
//! state struct and a mailbox. A supervisor watches them: an agent that
//! panics is relaunched with fresh volatile state (losing acceptor state
//! on a crash is an accepted property of the design); an agent that
//! exits normally (the node left the cluster) is not.

use std::collections::HashMap;

use decree_core::{
    Config, ErrorKind, LeaderReply, LeaderRequest, NodeName, ProposerReply, ProposerRequest,
    RoundOutcome, Value,
};
use decree_transport::{ActorName, Address, CallError, Cluster, ClusterError, NodeNet};
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::acceptor::run_acceptor;
use crate::leader::Leader;
use crate::proposer::{forward_timeout, Proposer};

/// The agent kinds a node hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Agent {
    Acceptor,
    Proposer,
    Leader,
}

async fn run_agent(agent: Agent, net: NodeNet, config: Config) -> Agent {
    match agent {
        Agent::Acceptor => {
            let inbox = net.register(ActorName::Acceptor);
            run_acceptor(net.node().clone(), inbox).await;
        }
        Agent::Proposer => {
            let inbox = net.register(ActorName::Proposer);
            Proposer::new(net, config).run(inbox).await;
        }
        Agent::Leader => {
            let inbox = net.register(ActorName::Leader);
            Leader::new(net, config).run(inbox).await;
        }
    }
    agent
}

fn launch(
    tasks: &mut JoinSet<Agent>,
    running: &mut HashMap<tokio::task::Id, Agent>,
    agent: Agent,
    net: NodeNet,
    config: Config,
) {
    let handle = tasks.spawn(run_agent(agent, net, config));
    running.insert(handle.id(), agent);
}

/// Supervise a node's agents until all of them have exited.
async fn supervise(net: NodeNet, config: Config) {
    let mut tasks = JoinSet::new();
    let mut running: HashMap<tokio::task::Id, Agent> = HashMap::new();

    for agent in [Agent::Acceptor, Agent::Proposer, Agent::Leader] {
        launch(&mut tasks, &mut running, agent, net.clone(), config.clone());
    }

    while let Some(result) = tasks.join_next_with_id().await {
        match result {
            Ok((task_id, agent)) => {
                running.remove(&task_id);
                debug!(node = %net.node(), ?agent, "agent exited");
            }
            Err(join_error) => {
                let agent = running.remove(&join_error.id());
                if join_error.is_panic() {
                    match agent {
                        Some(agent) => {
                            error!(
                                node = %net.node(),
                                ?agent,
                                "agent panicked; relaunching with fresh state"
                            );
                            launch(&mut tasks, &mut running, agent, net.clone(), config.clone());
                        }
                        None => {
                            error!(node = %net.node(), "unknown agent task panicked");
                        }
                    }
                } else {
                    debug!(node = %net.node(), ?agent, "agent cancelled");
                }
            }
        }
    }
    debug!(node = %net.node(), "supervisor finished");
}

/// One running node: three supervised agents behind a cluster handle.
pub struct Node {
    net: NodeNet,
    config: Config,
}

impl Node {
    /// Join the cluster under `name` and launch the node's agents.
    pub fn spawn(
        cluster: &Cluster,
        name: impl Into<NodeName>,
        config: Config,
    ) -> Result<Self, ClusterError> {
        let net = cluster.join(name)?;
        tokio::spawn(supervise(net.clone(), config.clone()));
        Ok(Self { net, config })
    }

    /// This node's name.
    pub fn name(&self) -> &NodeName {
        self.net.node()
    }

    /// A cheap clonable client handle onto this node.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            net: self.net.clone(),
            config: self.config.clone(),
        }
    }
}

/// Client surface of a node.
///
/// All methods translate transport failures into outcome records; they
/// never panic and never corrupt agent state.
#[derive(Clone)]
pub struct NodeHandle {
    net: NodeNet,
    config: Config,
}

impl NodeHandle {
    /// The node this handle talks to.
    pub fn node(&self) -> &NodeName {
        self.net.node()
    }

    /// Propose a value through the node's Leader, which forwards to the
    /// cluster's distinguished proposer (electing one first if needed).
    pub async fn start(&self, value: impl Into<Value>) -> RoundOutcome {
        let request = LeaderRequest::Start {
            value: value.into(),
        };
        let target = Address::new(ActorName::Leader, self.net.node().clone());
        match self
            .net
            .call::<LeaderRequest, LeaderReply>(&target, &request, self.config.client_timeout())
            .await
        {
            Ok(LeaderReply::Outcome { outcome }) => outcome,
            Ok(other) => {
                warn!(reply = ?other, "unexpected reply to start");
                RoundOutcome::error(ErrorKind::CatchAll)
            }
            Err(CallError::Timeout) => RoundOutcome::error(ErrorKind::Timeout),
            Err(error) => {
                warn!(%error, "start failed");
                RoundOutcome::error(ErrorKind::CatchAll)
            }
        }
    }

    /// Ask the node's Leader which node currently hosts the
    /// distinguished proposer. `None` while the election has not
    /// converged (or the node is unreachable).
    pub async fn get_leader(&self) -> Option<NodeName> {
        let target = Address::new(ActorName::Leader, self.net.node().clone());
        match self
            .net
            .call::<LeaderRequest, LeaderReply>(
                &target,
                &LeaderRequest::GetLeader,
                self.config.round_timeout,
            )
            .await
        {
            Ok(LeaderReply::Leader { node }) => node,
            _ => None,
        }
    }

    /// Drive this node's own Proposer directly, with retries.
    pub async fn propose(&self, value: impl Into<Value>) -> RoundOutcome {
        self.call_proposer(ProposerRequest::Start {
            value: value.into(),
        })
        .await
    }

    /// Drive this node's own Proposer directly, single round, no
    /// retries.
    pub async fn propose_once(&self, value: impl Into<Value>) -> RoundOutcome {
        self.call_proposer(ProposerRequest::StartOnce {
            value: value.into(),
        })
        .await
    }

    /// The stable identifier of this node's Proposer.
    pub async fn proposer_id(&self) -> Option<String> {
        let target = Address::new(ActorName::Proposer, self.net.node().clone());
        match self
            .net
            .call::<ProposerRequest, ProposerReply>(
                &target,
                &ProposerRequest::GetId,
                self.config.round_timeout,
            )
            .await
        {
            Ok(ProposerReply::Id { id }) => Some(id),
            _ => None,
        }
    }

    async fn call_proposer(&self, request: ProposerRequest) -> RoundOutcome {
        let target = Address::new(ActorName::Proposer, self.net.node().clone());
        match self
            .net
            .call::<ProposerRequest, ProposerReply>(&target, &request, forward_timeout(&self.config))
            .await
        {
            Ok(ProposerReply::Outcome { outcome }) => outcome,
            Ok(other) => {
                warn!(reply = ?other, "unexpected proposer reply");
                RoundOutcome::error(ErrorKind::CatchAll)
            }
            Err(CallError::Timeout) => RoundOutcome::error(ErrorKind::Timeout),
            Err(error) => {
                warn!(%error, "proposer call failed");
                RoundOutcome::error(ErrorKind::CatchAll)
            }
        }
    }
}

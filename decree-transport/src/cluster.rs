//! The in-process cluster: node registry, routing, membership, chaos.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use decree_core::{JsonCodec, MessageCodec, NodeName};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{CallError, ClusterError};
use crate::inbox::{Envelope, Inbox};

/// Per-node mailbox capacity. Requests beyond this apply backpressure to
/// callers rather than growing without bound.
const MAILBOX_CAPACITY: usize = 64;

/// Per-node membership event buffer. Subscribers that fall further
/// behind than this observe a lag and must resync from
/// [`NodeNet::peers`].
const MEMBERSHIP_CAPACITY: usize = 128;

/// Group ids at or above this base mark nodes isolated by a partition
/// that did not list them.
const ISOLATED_GROUP_BASE: u64 = 1 << 32;

/// The three agent kinds a node hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorName {
    /// The Paxos acceptor.
    Acceptor,
    /// The Paxos proposer.
    Proposer,
    /// The election agent.
    Leader,
}

impl std::fmt::Display for ActorName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActorName::Acceptor => "acceptor",
            ActorName::Proposer => "proposer",
            ActorName::Leader => "leader",
        };
        write!(f, "{name}")
    }
}

/// A fully qualified actor address: which agent, on which node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    /// The agent kind.
    pub actor: ActorName,
    /// The hosting node.
    pub node: NodeName,
}

impl Address {
    /// Create an address.
    pub fn new(actor: ActorName, node: NodeName) -> Self {
        Self { actor, node }
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.actor, self.node)
    }
}

/// A membership notification as observed by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// The named node became reachable.
    Up(NodeName),
    /// The named node stopped or became unreachable.
    Down(NodeName),
}

/// Knobs for the transport's failure model.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// One-way delivery latency applied to each hop (request and reply).
    pub delivery_delay: Duration,

    /// Probability that any single hop silently loses its message.
    pub loss_probability: f64,

    /// Seed for the loss RNG, so chaos runs reproduce.
    pub seed: u64,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            delivery_delay: Duration::ZERO,
            loss_probability: 0.0,
            seed: 0,
        }
    }
}

struct NodeEntry {
    membership: broadcast::Sender<MembershipEvent>,
    group: u64,
}

#[derive(Default)]
struct ClusterState {
    nodes: HashMap<NodeName, NodeEntry>,
    mailboxes: HashMap<(ActorName, NodeName), mpsc::Sender<Envelope>>,
}

impl ClusterState {
    fn reachable(&self, from: &NodeName, to: &NodeName) -> bool {
        match (self.nodes.get(from), self.nodes.get(to)) {
            (Some(a), Some(b)) => a.group == b.group,
            _ => false,
        }
    }
}

struct ClusterInner {
    config: ClusterConfig,
    codec: JsonCodec,
    state: Mutex<ClusterState>,
    rng: Mutex<ChaCha8Rng>,
}

/// An in-process cluster of named nodes.
///
/// Cloning is cheap; clones share the same cluster.
#[derive(Clone)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

impl Cluster {
    /// Create an empty cluster.
    pub fn new(config: ClusterConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            inner: Arc::new(ClusterInner {
                config,
                codec: JsonCodec,
                state: Mutex::new(ClusterState::default()),
                rng: Mutex::new(rng),
            }),
        }
    }

    /// Join a node to the cluster, announcing `nodeup` to every node
    /// that can reach it.
    pub fn join(&self, name: impl Into<NodeName>) -> Result<NodeNet, ClusterError> {
        let name = name.into();
        let (membership, _) = broadcast::channel(MEMBERSHIP_CAPACITY);
        let mut state = self.lock_state();
        if state.nodes.contains_key(&name) {
            return Err(ClusterError::NameTaken(name));
        }
        for entry in state.nodes.values() {
            if entry.group == 0 {
                let _ = entry.membership.send(MembershipEvent::Up(name.clone()));
            }
        }
        state.nodes.insert(name.clone(), NodeEntry { membership, group: 0 });
        debug!(node = %name, "node joined");
        Ok(NodeNet {
            inner: self.inner.clone(),
            node: name,
        })
    }

    /// Stop a node: its mailboxes close, its agents see their inboxes
    /// drain to `None`, and every node that could reach it observes
    /// `nodedown`.
    pub fn stop(&self, name: &NodeName) {
        let mut state = self.lock_state();
        let Some(removed) = state.nodes.remove(name) else {
            return;
        };
        state.mailboxes.retain(|(_, node), _| node != name);
        for entry in state.nodes.values() {
            if entry.group == removed.group {
                let _ = entry.membership.send(MembershipEvent::Down(name.clone()));
            }
        }
        debug!(node = %name, "node stopped");
    }

    /// Partition the cluster into the given groups.
    ///
    /// Nodes in the same group can exchange messages; messages across
    /// groups are lost in transit. Nodes not listed in any group end up
    /// isolated. Each node observes `nodedown`/`nodeup` for the peers it
    /// lost or regained.
    pub fn partition(&self, groups: &[Vec<NodeName>]) {
        let mut assignment: HashMap<NodeName, u64> = HashMap::new();
        for (index, group) in groups.iter().enumerate() {
            for name in group {
                assignment.insert(name.clone(), (index + 1) as u64);
            }
        }
        self.reassign(|name| assignment.get(name).copied());
    }

    /// Remove all partitions, reconnecting every node.
    pub fn heal(&self) {
        self.reassign(|_| Some(0));
    }

    /// All currently running nodes, sorted.
    pub fn nodes(&self) -> Vec<NodeName> {
        let state = self.lock_state();
        let mut names: Vec<NodeName> = state.nodes.keys().cloned().collect();
        names.sort();
        names
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.inner.state.lock().expect("cluster state lock poisoned")
    }

    fn reassign(&self, target_group: impl Fn(&NodeName) -> Option<u64>) {
        let mut state = self.lock_state();
        let names: Vec<NodeName> = state.nodes.keys().cloned().collect();
        let old: HashMap<NodeName, u64> =
            names.iter().map(|n| (n.clone(), state.nodes[n].group)).collect();

        let mut next_isolated = ISOLATED_GROUP_BASE;
        let mut new: HashMap<NodeName, u64> = HashMap::new();
        for name in &names {
            let group = target_group(name).unwrap_or_else(|| {
                next_isolated += 1;
                next_isolated
            });
            new.insert(name.clone(), group);
        }
        for name in &names {
            if let Some(entry) = state.nodes.get_mut(name) {
                entry.group = new[name];
            }
        }

        for a in &names {
            for b in &names {
                if a == b {
                    continue;
                }
                let was = old[a] == old[b];
                let now = new[a] == new[b];
                let event = match (was, now) {
                    (true, false) => MembershipEvent::Down(b.clone()),
                    (false, true) => MembershipEvent::Up(b.clone()),
                    _ => continue,
                };
                let _ = state.nodes[a].membership.send(event);
            }
        }
    }
}

enum Route {
    Deliver(mpsc::Sender<Envelope>),
    Lost,
    Down,
}

/// One node's handle onto the cluster transport.
///
/// Cloning is cheap; clones address the cluster as the same node.
#[derive(Clone)]
pub struct NodeNet {
    inner: Arc<ClusterInner>,
    node: NodeName,
}

impl NodeNet {
    /// The name this handle sends as.
    pub fn node(&self) -> &NodeName {
        &self.node
    }

    /// Register an agent's mailbox, replacing any previous registration
    /// for the same agent (a supervisor relaunching an agent re-registers
    /// it).
    pub fn register(&self, actor: ActorName) -> Inbox {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let mut state = self.lock_state();
        state.mailboxes.insert((actor, self.node.clone()), tx);
        Inbox::new(rx, self.inner.codec)
    }

    /// Subscribe to this node's membership event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        let state = self.lock_state();
        match state.nodes.get(&self.node) {
            Some(entry) => entry.membership.subscribe(),
            // Node already stopped: a receiver that reports closed.
            None => broadcast::channel(1).1,
        }
    }

    /// All nodes reachable from this one (self included), minus the
    /// exclusion list, sorted.
    pub fn peers(&self, excluded: &[NodeName]) -> Vec<NodeName> {
        let state = self.lock_state();
        let Some(me) = state.nodes.get(&self.node) else {
            return Vec::new();
        };
        let mut peers: Vec<NodeName> = state
            .nodes
            .iter()
            .filter(|(name, entry)| entry.group == me.group && !excluded.contains(*name))
            .map(|(name, _)| name.clone())
            .collect();
        peers.sort();
        peers
    }

    /// Send one request and await the reply within `timeout`.
    pub async fn call<Req, Rep>(
        &self,
        target: &Address,
        request: &Req,
        timeout: Duration,
    ) -> Result<Rep, CallError>
    where
        Req: Serialize,
        Rep: DeserializeOwned,
    {
        let payload = self
            .inner
            .codec
            .encode(request)
            .map_err(|e| CallError::Codec(e.to_string()))?;
        let reply = tokio::time::timeout(timeout, self.exchange(target, payload))
            .await
            .map_err(|_| CallError::Timeout)??;
        self.inner
            .codec
            .decode(&reply)
            .map_err(|e| CallError::Codec(e.to_string()))
    }

    /// Fan one request out to `targets` and collect the replies that
    /// arrive within `timeout`. Peers that time out, are unreachable, or
    /// reply undecodably are omitted.
    pub async fn multicall<Req, Rep>(
        &self,
        targets: &[NodeName],
        actor: ActorName,
        request: &Req,
        timeout: Duration,
    ) -> Vec<(NodeName, Rep)>
    where
        Req: Serialize + Clone + Send + Sync + 'static,
        Rep: DeserializeOwned + Send + 'static,
    {
        let mut calls = JoinSet::new();
        for node in targets {
            let net = self.clone();
            let node = node.clone();
            let request = request.clone();
            calls.spawn(async move {
                let address = Address::new(actor, node.clone());
                let result = net.call::<Req, Rep>(&address, &request, timeout).await;
                (node, result)
            });
        }

        let mut replies = Vec::new();
        while let Some(joined) = calls.join_next().await {
            match joined {
                Ok((node, Ok(reply))) => replies.push((node, reply)),
                Ok((node, Err(error))) => {
                    debug!(node = %node, %error, "multicall peer omitted");
                }
                Err(error) => {
                    warn!(%error, "multicall task failed");
                }
            }
        }
        replies
    }

    async fn exchange(&self, target: &Address, payload: Vec<u8>) -> Result<Vec<u8>, CallError> {
        let route = {
            let state = self.lock_state();
            if !state.nodes.contains_key(&target.node) {
                Route::Down
            } else if !state.reachable(&self.node, &target.node) {
                Route::Lost
            } else {
                match state.mailboxes.get(&(target.actor, target.node.clone())) {
                    Some(tx) => Route::Deliver(tx.clone()),
                    None => Route::Down,
                }
            }
        };

        let tx = match route {
            Route::Down => return Err(CallError::Down(target.node.clone())),
            // A partitioned peer looks exactly like a lost message: the
            // caller's deadline decides.
            Route::Lost => return std::future::pending().await,
            Route::Deliver(tx) => tx,
        };

        if self.lose_message() {
            return std::future::pending().await;
        }
        self.delivery_delay().await;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(Envelope {
            payload,
            reply: reply_tx,
        })
        .await
        .map_err(|_| CallError::Down(target.node.clone()))?;

        let reply = reply_rx
            .await
            .map_err(|_| CallError::Down(target.node.clone()))?;

        if self.lose_message() {
            return std::future::pending().await;
        }
        self.delivery_delay().await;

        Ok(reply)
    }

    async fn delivery_delay(&self) {
        let delay = self.inner.config.delivery_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn lose_message(&self) -> bool {
        let probability = self.inner.config.loss_probability;
        if probability <= 0.0 {
            return false;
        }
        self.inner
            .rng
            .lock()
            .expect("cluster rng lock poisoned")
            .random_bool(probability)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ClusterState> {
        self.inner.state.lock().expect("cluster state lock poisoned")
    }
}

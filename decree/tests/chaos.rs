//! Seeded chaos: a lossy transport must never break agreement.
//!
//! Losing requests makes rounds fail; losing replies makes a proposer
//! believe a round failed that an acceptor actually recorded. Neither
//! may ever lead two successful rounds to different values.

use std::time::Duration;

use decree::Node;
use decree_core::{Config, RoundOutcome, Value};
use decree_transport::{Cluster, ClusterConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .try_init();
}

async fn propose_until_accepted(
    node: &Node,
    value: &str,
    attempts: usize,
) -> Option<RoundOutcome> {
    let handle = node.handle();
    for _ in 0..attempts {
        let outcome = handle.propose(value).await;
        if outcome.is_accepted() {
            return Some(outcome);
        }
    }
    None
}

#[tokio::test(start_paused = true)]
async fn slow_chaos_lossy_transport_preserves_agreement() {
    init_tracing();
    let cluster = Cluster::new(ClusterConfig {
        delivery_delay: Duration::from_millis(2),
        loss_probability: 0.05,
        seed: 7,
    });

    let nodes: Vec<Node> = ["paxos1@lab", "paxos2@lab", "paxos3@lab"]
        .iter()
        .map(|n| Node::spawn(&cluster, *n, Config::default()).expect("unique node name"))
        .collect();
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Drive a first value through the lossy cluster.
    let first = propose_until_accepted(&nodes[0], "survivor", 20)
        .await
        .expect("a value should be chosen within 20 client attempts");
    assert_eq!(first.single_value(), Some(&Value::from("survivor")));

    // A later proposer with a different value must converge on the
    // already-chosen one: any quorum of promises intersects the quorum
    // that accepted it, so the history always surfaces.
    let second = propose_until_accepted(&nodes[1], "usurper", 20)
        .await
        .expect("the second proposer should eventually succeed");
    assert_eq!(second.single_value(), Some(&Value::from("survivor")));
}

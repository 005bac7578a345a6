//! Boot an in-process cluster and drive one value to consensus.

use std::time::Duration;

use clap::Parser;
use decree::Node;
use decree_core::Config;
use decree_transport::{Cluster, ClusterConfig};

/// Launch an N-node in-process decree cluster and propose one value.
#[derive(Debug, Parser)]
#[command(name = "decree-demo")]
struct Args {
    /// Number of nodes to launch.
    #[arg(long, default_value_t = 3)]
    nodes: usize,

    /// The value to propose.
    #[arg(long, default_value = "pizza")]
    value: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let cluster = Cluster::new(ClusterConfig::default());
    let config = Config::default();

    let mut nodes = Vec::new();
    for i in 1..=args.nodes {
        let node = Node::spawn(&cluster, format!("paxos{i}@local"), config.clone())
            .expect("node names are unique");
        nodes.push(node);
    }

    // Let the agents come up before proposing.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let handle = nodes[0].handle();
    let outcome = handle.start(args.value.as_str()).await;

    println!("status:       {:?}", outcome.status);
    if let Some(value) = outcome.single_value() {
        println!("value:        {value}");
    }
    if let Some(round) = outcome.single_round() {
        println!("round:        {round}");
    }
    println!(
        "participants: {}",
        outcome
            .participants
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    if let Some(leader) = handle.get_leader().await {
        println!("leader:       {leader}");
    }
}

//! Node naming and stable per-node identifier derivation.
//!
//! Nodes carry Erlang-style names of the form `part@host` (the host is
//! optional). The distinguished-proposer election compares *identifiers*
//! derived from the component before `@`: a stable hash rendered in hex,
//! with the raw component appended. The hash randomizes which node wins
//! an election (greatness does not correlate with a numeric suffix); the
//! appended component keeps distinct names mapping to distinct ids.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// The name of a node in the cluster, e.g. `paxos1@lab`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeName(String);

impl NodeName {
    /// Create a node name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The full name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The component before `@`, or the whole name if there is no `@`.
    pub fn shortname(&self) -> &str {
        match self.0.split_once('@') {
            Some((part, _)) => part,
            None => &self.0,
        }
    }

    /// The component after `@`, or the empty string.
    pub fn host(&self) -> &str {
        match self.0.split_once('@') {
            Some((_, host)) => host,
            None => "",
        }
    }
}

impl From<&str> for NodeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for NodeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Derive the stable identifier a node's proposer announces in elections
/// and stamps into the `origin` of every proposal id it mints.
///
/// The identifier is `"{hash:016x}/{shortname}"` where the hash covers
/// only the name component before `@`. Distinct shortnames yield distinct
/// identifiers by construction (the raw component is part of the id), and
/// the hash prefix dominates the lexicographic order.
pub fn stable_id(name: &NodeName) -> String {
    let part = name.shortname();
    let mut hasher = DefaultHasher::new();
    part.hash(&mut hasher);
    format!("{:016x}/{}", hasher.finish(), part)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shortname_and_host() {
        let name = NodeName::from("paxos1@lab.example");
        assert_eq!(name.shortname(), "paxos1");
        assert_eq!(name.host(), "lab.example");

        let bare = NodeName::from("paxos1");
        assert_eq!(bare.shortname(), "paxos1");
        assert_eq!(bare.host(), "");
    }

    #[test]
    fn test_stable_id_is_stable() {
        let name = NodeName::from("paxos2@lab");
        assert_eq!(stable_id(&name), stable_id(&name));
    }

    #[test]
    fn test_stable_id_ignores_host() {
        // Only the component before `@` participates.
        assert_eq!(
            stable_id(&NodeName::from("paxos1@a")),
            stable_id(&NodeName::from("paxos1@b"))
        );
    }

    #[test]
    fn test_stable_id_distinct_for_distinct_names() {
        let ids: std::collections::BTreeSet<String> = (1..=9)
            .map(|i| stable_id(&NodeName::from(format!("paxos{i}@lab").as_str())))
            .collect();
        assert_eq!(ids.len(), 9);
    }

    #[test]
    fn test_stable_id_embeds_shortname() {
        let id = stable_id(&NodeName::from("paxos3@lab"));
        assert!(id.ends_with("/paxos3"));
    }
}

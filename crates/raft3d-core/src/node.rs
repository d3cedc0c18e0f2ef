use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Where a follower finds the leader's log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderConfig {
    pub node_id: NodeId,
    pub endpoint: String,
}

/// The part a node plays in replication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Accepts writes and serves its log to followers.
    Leader,
    /// Pulls committed entries from the leader.
    Follower(LeaderConfig),
}

impl Role {
    pub fn is_leader(&self) -> bool {
        matches!(self, Role::Leader)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Follower(_) => "follower",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_ordering() {
        assert!(NodeId(1) < NodeId(2));
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(42).to_string(), "node-42");
    }

    #[test]
    fn test_role() {
        let follower = Role::Follower(LeaderConfig {
            node_id: NodeId(1),
            endpoint: "http://localhost:8081".to_string(),
        });
        assert!(Role::Leader.is_leader());
        assert!(!follower.is_leader());
        assert_eq!(follower.as_str(), "follower");
    }
}

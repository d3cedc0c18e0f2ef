use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use raft3d_core::{LeaderConfig, NodeId, Role};

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub node_id: NodeId,
    pub listen_addr: SocketAddr,
    pub db_path: PathBuf,
    /// None when this node is the leader.
    pub leader: Option<LeaderConfig>,
    pub pull_interval: Duration,
    pub snapshot_threshold: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let node_id = lookup("RAFT3D_NODE_ID")
            .ok_or(ConfigError::Missing("RAFT3D_NODE_ID"))?
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid("RAFT3D_NODE_ID", "must be a valid u64"))?;

        let listen_addr = lookup("RAFT3D_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("RAFT3D_LISTEN_ADDR", "must be a valid socket address")
            })?;

        let db_path = lookup("RAFT3D_DB_PATH")
            .unwrap_or_else(|| "./raft3d.redb".to_string())
            .into();

        let pull_interval_ms = match lookup("RAFT3D_PULL_INTERVAL_MS") {
            Some(s) => s.parse::<u64>().map_err(|_| {
                ConfigError::Invalid("RAFT3D_PULL_INTERVAL_MS", "must be a number of milliseconds")
            })?,
            None => 500,
        };

        let snapshot_threshold = match lookup("RAFT3D_SNAPSHOT_THRESHOLD") {
            Some(s) => s.parse::<u64>().map_err(|_| {
                ConfigError::Invalid("RAFT3D_SNAPSHOT_THRESHOLD", "must be a valid u64")
            })?,
            None => 1024,
        };

        let leader = match lookup("RAFT3D_LEADER") {
            Some(s) if !s.trim().is_empty() => Some(Self::parse_leader(s.trim())?),
            _ => None,
        };

        Ok(Config {
            node_id: NodeId(node_id),
            listen_addr,
            db_path,
            leader,
            pull_interval: Duration::from_millis(pull_interval_ms),
            snapshot_threshold,
        })
    }

    // Expected format: "node_id@endpoint" e.g. "1@http://localhost:8081"
    fn parse_leader(entry: &str) -> Result<LeaderConfig, ConfigError> {
        let (node_id, endpoint) = entry.split_once('@').ok_or(ConfigError::Invalid(
            "RAFT3D_LEADER",
            "expected format: node_id@endpoint (e.g. 1@http://localhost:8081)",
        ))?;

        let node_id = node_id.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(
                "RAFT3D_LEADER",
                "node_id must be a valid u64 (format: node_id@endpoint)",
            )
        })?;
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid("RAFT3D_LEADER", "endpoint must not be empty"));
        }

        Ok(LeaderConfig {
            node_id: NodeId(node_id),
            endpoint: endpoint.to_string(),
        })
    }

    pub fn role(&self) -> Role {
        match &self.leader {
            Some(leader) => Role::Follower(leader.clone()),
            None => Role::Leader,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("RAFT3D_NODE_ID", "3")]).unwrap();

        assert_eq!(config.node_id, NodeId(3));
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.db_path, PathBuf::from("./raft3d.redb"));
        assert_eq!(config.pull_interval, Duration::from_millis(500));
        assert_eq!(config.snapshot_threshold, 1024);
        assert!(config.role().is_leader());
    }

    #[test]
    fn test_missing_node_id() {
        assert!(matches!(load(&[]), Err(ConfigError::Missing("RAFT3D_NODE_ID"))));
        assert!(matches!(
            load(&[("RAFT3D_NODE_ID", "abc")]),
            Err(ConfigError::Invalid("RAFT3D_NODE_ID", _))
        ));
    }

    #[test]
    fn test_follower_config() {
        let config = load(&[
            ("RAFT3D_NODE_ID", "2"),
            ("RAFT3D_LEADER", "1@http://localhost:8081"),
            ("RAFT3D_PULL_INTERVAL_MS", "100"),
        ])
        .unwrap();

        assert_eq!(
            config.role(),
            Role::Follower(LeaderConfig {
                node_id: NodeId(1),
                endpoint: "http://localhost:8081".to_string(),
            })
        );
        assert_eq!(config.pull_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_leader() {
        for bad in ["http://localhost:8081", "x@http://localhost:8081", "1@"] {
            assert!(
                matches!(
                    load(&[("RAFT3D_NODE_ID", "2"), ("RAFT3D_LEADER", bad)]),
                    Err(ConfigError::Invalid("RAFT3D_LEADER", _))
                ),
                "accepted {bad}"
            );
        }
    }
}

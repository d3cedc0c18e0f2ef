use serde::{Deserialize, Serialize};

use raft3d_core::{LogEntry, NodeId, SnapshotMeta};

/// Request for committed entries from the leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    /// The requesting node's ID.
    pub from_node: NodeId,
    /// Get entries with index > since_index.
    pub since_index: u64,
    /// Maximum number of entries to return.
    pub limit: Option<usize>,
}

impl PullRequest {
    pub fn new(from_node: NodeId, since_index: u64) -> Self {
        Self {
            from_node,
            since_index,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A page of the leader's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullResponse {
    /// The responding node's ID.
    pub from_node: NodeId,
    /// Entries in index order.
    pub entries: Vec<LogEntry>,
    /// Whether there are more entries after this page.
    pub has_more: bool,
    /// The requested position has been compacted away; fetch the snapshot.
    #[serde(default)]
    pub snapshot_required: bool,
    /// Leader's last log index.
    pub last_index: u64,
}

impl PullResponse {
    pub fn new(from_node: NodeId, entries: Vec<LogEntry>, has_more: bool, last_index: u64) -> Self {
        Self {
            from_node,
            entries,
            has_more,
            snapshot_required: false,
            last_index,
        }
    }

    pub fn empty(from_node: NodeId, last_index: u64) -> Self {
        Self::new(from_node, Vec::new(), false, last_index)
    }

    pub fn snapshot_required(from_node: NodeId, last_index: u64) -> Self {
        Self {
            snapshot_required: true,
            ..Self::empty(from_node, last_index)
        }
    }
}

/// The leader's latest stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotResponse {
    pub from_node: NodeId,
    pub meta: SnapshotMeta,
    pub data: Vec<u8>,
}

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use raft3d_core::{
    LeaderConfig, LogStore, NodeId, RestoreError, SnapshotError, SnapshotStore, StateMachine,
    StorageError,
};

use crate::log::ReplicatedLog;
use crate::protocol::{PullRequest, PullResponse, SnapshotResponse};

/// Default number of entries requested per page.
pub const DEFAULT_PAGE_LIMIT: usize = 500;

/// Error type for replication operations.
#[derive(Error, Debug)]
pub enum ReplicationError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to encode command: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("Restore error: {0}")]
    Restore(#[from] RestoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(String),
}

/// Trait for fetching log pages and snapshots from the leader.
pub trait PeerClient: Send + Sync {
    fn pull_entries(
        &self,
        request: PullRequest,
    ) -> impl std::future::Future<Output = Result<PullResponse, ReplicationError>> + Send;

    fn fetch_snapshot(
        &self,
    ) -> impl std::future::Future<Output = Result<SnapshotResponse, ReplicationError>> + Send;
}

/// Follower-side replicator that keeps the local log in step with the
/// leader's.
pub struct PullReplicator<M, L, S, P>
where
    M: StateMachine,
    L: LogStore,
    S: SnapshotStore,
    P: PeerClient,
{
    node_id: NodeId,
    leader: LeaderConfig,
    log: Arc<ReplicatedLog<M, L, S>>,
    peer_client: Arc<P>,
    page_limit: usize,
}

impl<M, L, S, P> PullReplicator<M, L, S, P>
where
    M: StateMachine,
    L: LogStore,
    S: SnapshotStore,
    P: PeerClient,
{
    pub fn new(
        node_id: NodeId,
        leader: LeaderConfig,
        log: Arc<ReplicatedLog<M, L, S>>,
        peer_client: Arc<P>,
    ) -> Self {
        Self {
            node_id,
            leader,
            log,
            peer_client,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }

    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Pull from the leader until caught up.
    pub async fn sync_once(&self) -> Result<SyncStats, ReplicationError> {
        let mut stats = SyncStats::default();

        loop {
            let since_index = self.log.last_index()?;
            let request = PullRequest::new(self.node_id, since_index).with_limit(self.page_limit);
            let response = self.peer_client.pull_entries(request).await?;

            if response.snapshot_required {
                let snapshot = self.peer_client.fetch_snapshot().await?;
                if snapshot.meta.last_index <= since_index {
                    return Err(ReplicationError::Network(format!(
                        "{} sent snapshot at {} but follower is at {}",
                        self.leader.node_id, snapshot.meta.last_index, since_index
                    )));
                }
                self.log.install_snapshot(snapshot.meta, &snapshot.data)?;
                stats.snapshots_installed += 1;
                continue;
            }

            if response.entries.is_empty() {
                break;
            }

            stats.entries_received += response.entries.len();
            let ingested = self.log.ingest(&response.entries)?;
            stats.entries_applied += ingested.applied;
            stats.entries_discarded += ingested.discarded;

            // A page that doesn't extend the log can't make progress.
            if !response.has_more || ingested.appended == 0 {
                break;
            }
        }

        Ok(stats)
    }

    /// Run continuous sync loop.
    pub async fn run(&self, interval: Duration) {
        tracing::info!(
            leader = %self.leader.node_id,
            endpoint = %self.leader.endpoint,
            "Starting follower replication"
        );

        loop {
            match self.sync_once().await {
                Ok(stats) => {
                    if stats.entries_received > 0 || stats.snapshots_installed > 0 {
                        tracing::info!(
                            received = stats.entries_received,
                            applied = stats.entries_applied,
                            discarded = stats.entries_discarded,
                            snapshots = stats.snapshots_installed,
                            "Synced from leader"
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(leader = %self.leader.node_id, error = %e, "Sync error");
                }
            }

            sleep(interval).await;
        }
    }
}

/// Statistics from a sync operation.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub entries_received: usize,
    pub entries_applied: usize,
    pub entries_discarded: usize,
    pub snapshots_installed: usize,
}

/// HTTP client for the leader's replication endpoints.
pub struct HttpPeerClient {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpPeerClient {
    pub fn new(leader: &LeaderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: leader.endpoint.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ReplicationError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ReplicationError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReplicationError::Network(format!(
                "HTTP error: {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ReplicationError::Network(e.to_string()))
    }
}

impl PeerClient for HttpPeerClient {
    async fn pull_entries(&self, request: PullRequest) -> Result<PullResponse, ReplicationError> {
        let mut url = format!(
            "{}/replication/entries?since_index={}&from_node={}",
            self.endpoint, request.since_index, request.from_node.0
        );
        if let Some(limit) = request.limit {
            url.push_str(&format!("&limit={limit}"));
        }

        self.get_json(&url).await
    }

    async fn fetch_snapshot(&self) -> Result<SnapshotResponse, ReplicationError> {
        let url = format!("{}/replication/snapshot", self.endpoint);
        self.get_json(&url).await
    }
}

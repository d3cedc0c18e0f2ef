//! raft3d Replication - Ordered log, snapshot compaction and pull-based
//! catch-up for followers.

pub mod checkpoint;
pub mod log;
pub mod protocol;
pub mod pull;

pub use checkpoint::CheckpointManager;
pub use log::{IngestStats, LogStatus, Proposal, ReplicatedLog};
pub use protocol::{PullRequest, PullResponse, SnapshotResponse};
pub use pull::{HttpPeerClient, PeerClient, PullReplicator, ReplicationError, SyncStats};

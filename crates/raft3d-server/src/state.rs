use std::sync::Arc;

use raft3d_core::{FleetStateMachine, NodeId, Role};
use raft3d_db::{RedbLogStore, RedbSnapshotStore};
use raft3d_replication::ReplicatedLog;

/// The replicated log as wired in the server: redb storage under the fleet
/// state machine.
pub type FleetLog = ReplicatedLog<FleetStateMachine, RedbLogStore, RedbSnapshotStore>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub node_id: NodeId,
    pub role: Arc<Role>,
    pub machine: Arc<FleetStateMachine>,
    pub log: Arc<FleetLog>,
}

impl AppState {
    pub fn new(role: Role, log: Arc<FleetLog>) -> Self {
        Self {
            node_id: log.node_id(),
            role: Arc::new(role),
            machine: log.machine().clone(),
            log,
        }
    }
}

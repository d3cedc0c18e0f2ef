use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;

use raft3d_core::{ApplyStats, Role, StateMachine};
use raft3d_replication::LogStatus;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    node_id: u64,
    role: &'static str,
    applied_index: u64,
    stats: ApplyStats,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.0,
        role: state.role.as_str(),
        applied_index: state.machine.last_applied().index,
        stats: state.machine.stats(),
    })
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    node_id: u64,
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    leader: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log: Option<LogStatus>,
    stats: ApplyStats,
}

/// Ready once the log can be read and the state machine has applied
/// everything it holds.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let leader = match state.role.as_ref() {
        Role::Leader => None,
        Role::Follower(leader) => Some(leader.endpoint.clone()),
    };

    let log = match state.log.status() {
        Ok(log) => Some(log),
        Err(e) => {
            tracing::error!(error = %e, "Failed to read log status");
            None
        }
    };
    let ready = log.is_some_and(|l| l.applied_index >= l.last_index);

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(ReadyResponse {
            status: if ready { "ok" } else { "unavailable" },
            node_id: state.node_id.0,
            role: state.role.as_str(),
            leader,
            log,
            stats: state.machine.stats(),
        }),
    )
}

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use raft3d_replication::{PullResponse, SnapshotResponse};

use crate::error::ApiError;
use crate::state::AppState;

const MAX_LIMIT: usize = 1000;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/replication/entries", get(get_entries))
        .route("/replication/snapshot", get(get_snapshot))
}

#[derive(Deserialize)]
pub struct EntriesQuery {
    /// Get entries with index > since_index (default 0).
    #[serde(default)]
    since_index: u64,
    /// Maximum number of entries to return (default 100).
    #[serde(default = "default_limit")]
    limit: usize,
    /// Requesting follower, for logging.
    from_node: Option<u64>,
}

fn default_limit() -> usize {
    100
}

async fn get_entries(
    State(state): State<AppState>,
    Query(query): Query<EntriesQuery>,
) -> Result<Json<PullResponse>, ApiError> {
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let page = state.log.pull_page(query.since_index, limit)?;

    if page.snapshot_required {
        tracing::info!(
            from_node = ?query.from_node,
            since_index = query.since_index,
            "Follower is behind the compacted log"
        );
    }
    Ok(Json(page))
}

async fn get_snapshot(State(state): State<AppState>) -> Result<Json<SnapshotResponse>, ApiError> {
    state
        .log
        .latest_snapshot()?
        .map(Json)
        .ok_or(ApiError::NotFound {
            kind: "Snapshot",
            id: "latest".to_string(),
        })
}

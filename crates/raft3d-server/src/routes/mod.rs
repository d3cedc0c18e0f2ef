pub mod api;
pub mod health;
pub mod replication;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(api::routes())
        .merge(health::routes())
        .merge(replication::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

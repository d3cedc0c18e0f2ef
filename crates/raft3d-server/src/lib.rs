//! raft3d Server - HTTP dispatcher and process wiring for a replica.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod routes;
pub mod state;

pub use config::Config;
pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, FleetLog};

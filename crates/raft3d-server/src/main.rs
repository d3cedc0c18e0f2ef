use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use raft3d_core::{FleetStateMachine, Role};
use raft3d_db::{init_database, RedbLogStore, RedbSnapshotStore};
use raft3d_replication::{HttpPeerClient, PullReplicator, ReplicatedLog};
use raft3d_server::{routes, AppState, Config};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            eprintln!("Required: RAFT3D_NODE_ID=<number>");
            eprintln!(
                "Optional: RAFT3D_LISTEN_ADDR, RAFT3D_DB_PATH, RAFT3D_LEADER, \
                 RAFT3D_PULL_INTERVAL_MS, RAFT3D_SNAPSHOT_THRESHOLD"
            );
            std::process::exit(1);
        }
    };
    let role = config.role();

    tracing::info!(
        node_id = %config.node_id,
        role = role.as_str(),
        listen_addr = %config.listen_addr,
        db_path = %config.db_path.display(),
        "Starting raft3d server"
    );

    // Initialize database
    let db = match init_database(&config.db_path) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };

    let log = Arc::new(
        ReplicatedLog::new(
            config.node_id,
            Arc::new(FleetStateMachine::new()),
            Arc::new(RedbLogStore::new(db.clone())),
            Arc::new(RedbSnapshotStore::new(db)),
        )
        .with_snapshot_threshold(config.snapshot_threshold),
    );

    if let Err(e) = log.recover() {
        eprintln!("Recovery error: {}", e);
        std::process::exit(1);
    }

    // Followers pull the leader's log
    if let Role::Follower(leader) = &role {
        let peer_client = Arc::new(HttpPeerClient::new(leader));
        let replicator = PullReplicator::new(config.node_id, leader.clone(), log.clone(), peer_client);
        let interval = config.pull_interval;
        tokio::spawn(async move {
            replicator.run(interval).await;
        });
    }

    let state = AppState::new(role, log);
    let app = routes::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server running at http://{}", config.listen_addr);

    axum::serve(listener, app).await.expect("Server error");
}

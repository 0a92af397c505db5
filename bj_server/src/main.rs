//! Server entrypoint: config, logging, metrics, store, session manager,
//! lobby, then the HTTP listener. A single root cancel token fans out to
//! every actor; ctrl-c cancels it and the listener drains with a short
//! grace period.

use anyhow::Context;
use bj_server::config::Config;
use bj_server::server::table::TableTimings;
use bj_server::server::{create_router, lobby::LobbyActor, AppState};
use bj_server::{logging, metrics};
use blackjack::auth::{GithubProvider, SessionManager};
use blackjack::game::{GameRules, DEFAULT_MAX_PLAYERS};
use blackjack::store::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env never overrides variables already set in the environment.
    let _ = dotenvy::dotenv();

    let config_path =
        std::env::var("BJ_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    logging::init(&config.log_level);

    let metrics_handle = metrics::install()
        .map_err(|e| anyhow::anyhow!("metrics initialization failed: {e}"))?;

    let store = Store::connect(
        &config.server.sqlite_db_name,
        config.server.sqlite_schema_path.as_deref(),
    )
    .await
    .context("opening the user store")?;
    tracing::info!("user store ready at {}", config.server.sqlite_db_name);

    let root = CancellationToken::new();

    let provider = Arc::new(GithubProvider::new(
        config.server.git_client_id.clone(),
        std::env::var("GIT_STAR_REPO").ok(),
    ));
    let (session_manager, sessions) = SessionManager::new(provider, root.clone());
    let session_task = tokio::spawn(session_manager.run());

    let rules = GameRules {
        stand_on_soft_17: config.stand_on_soft_17,
        deck_count: config.deck_count,
        cut_location: config.cut_location,
        max_players: DEFAULT_MAX_PLAYERS,
    };
    let timings = TableTimings::from_config(&config);
    let (lobby, lobby_task) = LobbyActor::spawn(store.clone(), rules, timings, root.clone());

    let state = AppState {
        lobby,
        sessions,
        store,
        metrics: metrics_handle,
    };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("server listening at http://{addr}, press ctrl-c to stop");

    let signal_token = root.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl-c handler installs");
        tracing::info!("received shutdown signal");
        signal_token.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(root.clone().cancelled_owned())
        .await
        .context("server error")?;

    // The lobby cancels and drains every table; give the actors a bounded
    // window to finish.
    let drain = async {
        let _ = lobby_task.await;
        let _ = session_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        tracing::warn!("actors did not drain within the grace period");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

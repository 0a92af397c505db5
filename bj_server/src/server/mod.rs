//! The HTTP surface and socket onboarding.
//!
//! Routes: health, device-flow login begin/status, Prometheus metrics, and
//! the socket upgrade at `/`. An upgrade requires `?session=<id>` naming an
//! authenticated session; the connection actor is spawned from there and
//! attached to the lobby.

pub mod client;
pub mod lobby;
pub mod middleware;
pub mod rate_limiter;
pub mod table;
pub mod timer;

use axum::extract::ws::WebSocket;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use blackjack::auth::SessionManagerHandle;
use blackjack::protocol::{PopUpDto, ServerMessage, UserStatsDto};
use blackjack::store::{Store, STAR_BONUS};
use client::{read_pump, write_pump, Client, Manager, MAX_MESSAGE_SIZE};
use futures_util::StreamExt;
use lobby::LobbyHandle;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::catch_panic::CatchPanicLayer;

const SOCKET_BUFFER_SIZE: usize = 1024;

/// Shared state for every handler; everything inside is a cheap clone.
#[derive(Clone)]
pub struct AppState {
    pub lobby: LobbyHandle,
    pub sessions: SessionManagerHandle,
    pub store: Store,
    pub metrics: PrometheusHandle,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth", get(begin_auth))
        .route("/auth/status", get(auth_status))
        .route("/metrics", get(render_metrics))
        .route("/", get(serve_ws))
        .layer(axum::middleware::from_fn(middleware::logging))
        .layer(axum::middleware::from_fn(middleware::request_metrics))
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "message": "healthy" }))
}

/// Begin a device-flow login: the client shows the user code and then
/// polls `/auth/status` until the session authenticates.
async fn begin_auth(State(state): State<AppState>) -> Response {
    match state.sessions.begin_login().await {
        Ok(session) => Json(json!({
            "session_id": session.session_id,
            "user_code": session.user_code,
        }))
        .into_response(),
        Err(err) => {
            tracing::error!("unable to begin login: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "InternalServerError" })),
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct StatusQuery {
    #[serde(default)]
    id: String,
}

async fn auth_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Response {
    match state.sessions.get_session(&query.id).await {
        Ok(Some(session)) => Json(json!({
            "authenticated": session.authenticated.to_string(),
            "username": session.username.unwrap_or_default(),
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "session not found" })),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("session lookup failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "InternalServerError" })),
            )
                .into_response()
        }
    }
}

async fn render_metrics(State(state): State<AppState>) -> String {
    state.metrics.render()
}

#[derive(Deserialize)]
struct WsQuery {
    #[serde(default)]
    session: String,
}

/// Upgrade an authenticated session's connection to a socket.
async fn serve_ws(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let session = match state.sessions.get_session(&query.session).await {
        Ok(Some(session)) if session.authenticated => session,
        Ok(_) => {
            return (StatusCode::UNAUTHORIZED, "Authentication Required").into_response();
        }
        Err(err) => {
            tracing::error!("session check failed during upgrade: {err}");
            return (StatusCode::UNAUTHORIZED, "Authentication Required").into_response();
        }
    };

    let Some(username) = session.username.clone() else {
        // Authenticated but the username lookup has not landed yet.
        return (StatusCode::UNAUTHORIZED, "Authentication Required").into_response();
    };

    let session_id = session.session_id.clone();
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .write_buffer_size(SOCKET_BUFFER_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, username, session_id, state))
}

/// Attach the socket to a fresh connection actor, register it with the
/// lobby, then run the login income and star-bonus flow.
async fn handle_socket(socket: WebSocket, username: String, session_id: String, state: AppState) {
    crate::metrics::connected_clients(1);
    let (sink, stream) = socket.split();

    let (client, outbound) = Client::new(username.clone(), Arc::new(state.lobby.clone()));
    tracing::info!(client = %client.id(), username = %username, "socket connected");

    state.lobby.register(client.clone()).await;
    let writer = tokio::spawn(write_pump(client.clone(), sink, outbound));
    let reader = tokio::spawn(read_pump(client.clone(), stream));

    match state.store.process_login(&username).await {
        Ok((user, income)) => {
            let message = format!(
                "Thank you for logging in for {} day(s) in a row! You have earned {} income",
                user.login_streak + 1,
                income
            );
            let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::info(message)));
        }
        Err(err) => tracing::error!("login processing failed for {username}: {err}"),
    }

    match state.sessions.check_starred(&session_id).await {
        Ok(true) => match state.store.update_starred(&username).await {
            Ok(true) => {
                let message = format!(
                    "Thank you for starring the repo! You have earned {STAR_BONUS} bonus"
                );
                let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::info(message)));
            }
            Ok(false) => {}
            Err(err) => tracing::error!("star bonus update failed for {username}: {err}"),
        },
        Ok(false) => {}
        Err(err) => tracing::error!("star check failed for {username}: {err}"),
    }

    let _ = reader.await;
    let _ = writer.await;

    crate::metrics::connected_clients(-1);
    crate::metrics::connection_duration(client.connected_at().elapsed().as_secs_f64());
    tracing::info!(client = %client.id(), username = %username, "socket disconnected");
}

/// Reply with the requester's lifetime stats; both the lobby and tables
/// answer `get_stats`.
pub(crate) async fn send_user_stats(store: &Store, client: &Arc<Client>) {
    match store.get_user(client.username()).await {
        Ok(Some(user)) => {
            let _ = client.try_queue(ServerMessage::UserStats(UserStatsDto::from(&user)));
        }
        Ok(None) => {
            let _ = client.try_queue(ServerMessage::PopUp(PopUpDto::warn(
                "No stats recorded yet",
            )));
        }
        Err(err) => log::error!(
            "unable to load stats for {}: {err}",
            client.username()
        ),
    }
}

mod config;
mod handshake;
mod rooms;
mod session;
mod state;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::ws::WebSocket;
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use futures_util::stream::StreamExt;
use tokio::sync::Mutex;
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use protocol::{HandshakeResponse, HandshakeResult, RoomKind};

use crate::state::AppState;

type Sender = Arc<Mutex<futures_util::stream::SplitSink<WebSocket, axum::extract::ws::Message>>>;

#[tokio::main]
/// Installs structured logging, loads the one-shot `ServerConfig`, then
/// serves the websocket endpoint plus the registry/metrics surface the
/// teacher's `/enlist`+`/reload` pair generalizes into (§4.7's supplemental
/// "Room Registry metrics endpoint"). Listens on `PORT` (default 8080).
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=trace", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        )
        .init();

    let app_state = Arc::new(AppState::from_env());
    let port = app_state.config.port;

    spawn_shutdown_listener(app_state.clone());

    let app = Router::new()
        .route("/rooms", get(rooms_handler))
        .route("/ws", get(websocket_handler))
        .with_state(app_state)
        .fallback_service(ServeDir::new(".").not_found_service(ServeFile::new("index.html")));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await.unwrap();
    tracing::info!(port, "gateway listening");
    axum::serve(listener, app).await.unwrap();
}

/// §9 supplemental "Graceful shutdown": on ctrl-c, drop every room's inbox
/// sender. Each room actor's `run_room` loop sees its inbox close on its
/// next recv, exits its loop, and the spawning task that awaited it then
/// runs the finalize/autosave path — the same path a room takes when it
/// empties out on its own, just triggered by the process exiting instead.
fn spawn_shutdown_listener(state: Arc<AppState>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::info!("shutdown requested, draining rooms");
        let mut rooms = state.rooms.lock().await;
        rooms.clear();
    });
}

/// Lists live rooms by kind and player count — the generalized successor
/// to the teacher's `/enlist` (the HTTP/JSON status surface proper stays
/// out of scope per §1; this is plain text, matching the teacher).
async fn rooms_handler(State(state): State<Arc<AppState>>) -> String {
    let snapshot = state.registry.snapshot();
    let mut lines = vec![format!(
        "total_rooms={} waiting_rooms={} active_rooms={} waiting_players={} total_players={} presence_players={}",
        snapshot.total_rooms,
        snapshot.waiting_rooms,
        snapshot.active_rooms,
        snapshot.waiting_players,
        snapshot.total_players,
        snapshot.presence_players
    )];
    for (room_id, kind, player_count) in state.registry.enlist() {
        lines.push(format!("{room_id:<40} kind={kind:?} players={player_count}"));
    }
    lines.join("\n")
}

async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| websocket(socket, state))
}

/// One websocket connection's whole lifetime: handshake (parse the join
/// request, resolve whichever room kind needs), route to the room actor,
/// then the per-session pump until the socket or the room ends it.
async fn websocket(stream: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = stream.split();
    let sender = Arc::new(Mutex::new(sender));

    let Some(request) = handshake::read_join_request(&mut receiver).await else {
        return;
    };

    let session_id = next_session_id();
    let reason: &'static str = match request.room_kind {
        RoomKind::Combat => {
            if request.address.is_empty() {
                deny(&sender, "address is required").await;
                return;
            }
            let context =
                handshake::resolve_combat_context(&state, &request.address, request.token_id, request.fun_room).await;
            let room_tx = rooms::get_or_create_combat(&state, &request.room_name).await;
            accept(&sender, session_id).await;
            session::run_session(sender.clone(), receiver, session_id, request.address, context, room_tx).await
        }
        RoomKind::Conquest => {
            if request.address.is_empty() {
                deny(&sender, "address is required").await;
                return;
            }
            let room_tx = rooms::get_or_create_conquest(&state, &request.room_name, request.seed).await;
            accept(&sender, session_id).await;
            session::run_session(sender.clone(), receiver, session_id, request.address, (), room_tx).await
        }
        RoomKind::Presence | RoomKind::Chat => {
            // §1 out of scope: external collaborators. The registry still
            // needs to be able to count them (§4.7), but this crate owns
            // neither protocol, so a direct join here is refused rather
            // than silently no-opped.
            deny(&sender, "presence/chat rooms are served by a different collaborator service").await;
            return;
        }
    };

    tracing::info!(session_id, reason, "session ended");
}

fn next_session_id() -> u32 {
    use std::sync::atomic::AtomicU32;
    static NEXT: AtomicU32 = AtomicU32::new(1);
    NEXT.fetch_add(1, Ordering::Relaxed)
}

async fn accept(sender: &Sender, session_id: u32) {
    send_handshake_response(sender, HandshakeResult::Joined { session_id }).await;
}

async fn deny(sender: &Sender, reason: &str) {
    send_handshake_response(sender, HandshakeResult::Denied { reason: reason.to_string() }).await;
}

async fn send_handshake_response(sender: &Sender, result: HandshakeResult) {
    let response = HandshakeResponse { result };
    let Ok(bytes) = postcard::to_stdvec(&response) else {
        tracing::error!("failed to encode handshake response");
        return;
    };
    let mut guard = sender.lock().await;
    let _ = guard.send(axum::extract::ws::Message::Binary(bytes.into())).await;
}

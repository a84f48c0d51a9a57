#![forbid(unsafe_code)]

//! HTTP surface: WebSocket upgrade at `/collab/{boardId}`, plus `/healthz`
//! and `/readyz`. Origin admission happens here, before a connection ever
//! reaches a room.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use board_domain::{BoardId, Limits};
use board_util::AllowedOrigins;
use tower_http::trace::TraceLayer;
use tracing::warn;

use super::registry::RoomRegistry;
use super::session;

/// Readiness flag, flipped once startup has finished.
#[derive(Clone, Default)]
pub struct HealthState {
	ready: Arc<AtomicBool>,
}

impl HealthState {
	pub fn new() -> Self {
		Self { ready: Arc::new(AtomicBool::new(false)) }
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}
}

#[derive(Clone)]
pub struct AppState {
	pub registry: Arc<RoomRegistry>,
	pub allowed_origins: Arc<AllowedOrigins>,
	pub health: HealthState,
	pub limits: Limits,
}

pub fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/collab/{board_id}", get(collab_handler))
		.route("/healthz", get(healthz))
		.route("/readyz", get(readyz))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

async fn collab_handler(
	State(state): State<AppState>,
	Path(board_id): Path<String>,
	ConnectInfo(addr): ConnectInfo<SocketAddr>,
	headers: HeaderMap,
	ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
	let origin = headers.get(axum::http::header::ORIGIN).and_then(|v| v.to_str().ok());
	if !state.allowed_origins.permits(origin) {
		warn!(?origin, board_id, "rejected websocket upgrade: origin not allowed");
		return (StatusCode::FORBIDDEN, "origin not allowed").into_response();
	}

	let board_id = match BoardId::new(board_id) {
		Ok(id) => id,
		Err(err) => {
			warn!(error = %err, "rejected websocket upgrade: malformed board id in path");
			return (StatusCode::NOT_FOUND, "board not found").into_response();
		}
	};

	let ws = match ws {
		Ok(ws) => ws,
		Err(_) => return (StatusCode::UPGRADE_REQUIRED, "expected a websocket upgrade").into_response(),
	};

	let registry = Arc::clone(&state.registry);
	let peer_ip = addr.ip();
	let limits = state.limits;
	ws.on_upgrade(move |socket| async move {
		session::run_session(socket, peer_ip, board_id, registry, limits).await;
	})
}

async fn healthz() -> &'static str {
	"ok"
}

async fn readyz(State(state): State<AppState>) -> Response {
	if state.health.is_ready() {
		(StatusCode::OK, "ready").into_response()
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "not-ready").into_response()
	}
}

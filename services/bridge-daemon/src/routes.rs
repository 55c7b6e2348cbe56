//! Builds the daemon's router: process info, the three WebSocket upgrades,
//! the RFID reader list, and a log-retrieval stub.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use axum::http::StatusCode;
use axum::extract::State;
use bridge_protocol::ReaderList;
use tower_http::trace::TraceLayer;

use crate::origin::{enforce_origin, OriginPolicy};
use crate::process_info;
use crate::state::AppState;
use crate::ws;

pub fn build_router(state: Arc<AppState>) -> Router {
    let policy = OriginPolicy::new(state.config.allowed_origins.clone());

    Router::new()
        .route("/", get(process_info_handler))
        .route("/senso", get(ws::senso_ws))
        .route("/flex", get(ws::flex_ws))
        .route("/rfid", get(ws::rfid_ws))
        .route("/rfid/", get(ws::rfid_ws))
        .route("/rfid/readers", get(readers_handler))
        .route("/log", get(log_handler))
        .layer(axum::middleware::from_fn_with_state(policy, enforce_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn process_info_handler(State(state): State<Arc<AppState>>) -> Json<bridge_protocol::ProcessInfo> {
    Json(process_info::current(&state.machine_id))
}

async fn readers_handler(State(state): State<Arc<AppState>>) -> Json<ReaderList> {
    Json(ReaderList { readers: state.known_readers().await })
}

async fn log_handler() -> StatusCode {
    // Log retrieval from the OS service manager (systemd/launchd) is out of
    // scope for this bridge; the endpoint exists so clients get a clean
    // "not supported" rather than a 404.
    StatusCode::NOT_IMPLEMENTED
}

//! WebSocket endpoints for the gateway

pub mod user;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::state::GatewayState;

/// Create all WebSocket routes
pub fn create_websocket_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/ws", get(user::user_websocket_handler))
}

pub use user::ClientFrame;

//! REST API endpoints for the gateway

pub mod broadcast;
pub mod call;
pub mod health;
pub mod meeting;
pub mod notification;

use axum::Router;
use crate::state::GatewayState;
use std::sync::Arc;

/// Create all authenticated REST API routes (mounted under `/api`)
pub fn create_rest_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        // Notification routes
        .merge(notification::create_notification_routes())
        // Video call routes
        .merge(call::create_call_routes())
        // Meeting routes
        .merge(meeting::create_meeting_routes())
        // Broadcast routes
        .merge(broadcast::create_broadcast_routes())
}

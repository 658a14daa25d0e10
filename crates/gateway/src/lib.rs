//! # Curalink Gateway Crate
//!
//! HTTP REST and WebSocket ingress for Curalink. Authenticates callers,
//! decodes their requests and hands them to the realtime services.
//!
//! ## Architecture
//!
//! - **REST**: notification, meeting, call and broadcast endpoints with OpenAPI documentation
//! - **WebSocket**: `/ws`, one live channel per user
//! - **State**: shared services built around one pool and one connection registry
//! - **Middleware**: session authentication, CORS and request logging
//!
//! ## Usage
//!
//! ```rust,ignore
//! use curalink_gateway::{create_router, GatewayState};
//!
//! let state = GatewayState::new(pool, registry, config.realtime.clone());
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod docs;
pub mod error;
pub mod middleware;
pub mod rest;
pub mod state;
pub mod websocket;

pub use docs::ApiDoc;
pub use error::{ErrorResponse, GatewayError, GatewayResult};
pub use middleware::{auth_middleware, CurrentUser};
pub use state::GatewayState;

pub use create_router as build_router;

use axum::{middleware as axum_middleware, routing::get, Json, Router};
use std::sync::Arc;
use utoipa::OpenApi;

/// Create the main application router with all routes
pub fn create_router(state: GatewayState) -> Router {
    let arc_state = Arc::new(state);

    let authenticated = Router::new()
        .nest("/api", rest::create_rest_routes())
        .merge(websocket::create_websocket_routes())
        .route_layer(axum_middleware::from_fn_with_state(
            arc_state.clone(),
            middleware::auth_middleware,
        ));

    let public = Router::new()
        .route("/health", get(rest::health::health_check))
        .route("/api-docs/openapi.json", get(openapi_document));

    Router::new()
        .merge(public)
        .merge(authenticated)
        .with_state(arc_state)
        .layer(middleware::create_cors_middleware())
        .layer(middleware::create_trace_middleware())
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
}

async fn openapi_document() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

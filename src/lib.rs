//! Marketplace order core: order placement with M-Pesa STK push payment,
//! callback reconciliation, and the vendor-to-rider-to-buyer delivery
//! handoff.

pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::errors::ServiceError;
use crate::events::EventSender;
use crate::handlers::AppServices;

/// Shared state cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: Arc<AppConfig>,
    pub event_sender: Option<Arc<EventSender>>,
    pub services: AppServices,
}

/// Liveness probe; no dependencies touched.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness probe: verifies the database connection is usable.
async fn app_status(State(state): State<AppState>) -> Result<Json<Value>, ServiceError> {
    state.db.ping().await?;
    Ok(Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "database": "connected",
    })))
}

/// Versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(handlers::orders::place_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route("/orders/:id/status", get(handlers::orders::get_order_status))
        .route("/orders/:id/accept", post(handlers::delivery::accept_order))
        .route(
            "/delivery/tasks/available",
            get(handlers::delivery::list_available_tasks),
        )
        .route(
            "/delivery/tasks/mine",
            get(handlers::delivery::list_my_tasks),
        )
        .route(
            "/delivery/tasks/:id/claim",
            post(handlers::delivery::claim_task),
        )
        .route(
            "/delivery/tasks/:id/pickup",
            post(handlers::delivery::confirm_pickup),
        )
        .route(
            "/delivery/tasks/:id/deliver",
            post(handlers::delivery::confirm_delivery),
        )
        .route(
            "/payments/mpesa/callback",
            post(handlers::payment_webhooks::mpesa_callback),
        )
}

/// Builds the full application router over the given state.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(app_status))
        .nest("/api/v1", api_v1_routes())
        .merge(openapi::swagger_ui())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

//! Axum router wiring.

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::{app_state::AppState, ops};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/v1/publish", post(ops::api::publish))
        .route("/v1/send", post(ops::api::send))
        .route("/v1/subscriptions", post(ops::api::subscribe))
        .route("/v1/subscriptions/:subscriber", delete(ops::api::remove_subscriber))
        .route("/v1/subscriptions/:subscriber/messages", get(ops::api::poll))
        .route("/v1/report", get(ops::api::report))
        .route("/v1/bench", post(ops::api::bench))
        .with_state(state)
}

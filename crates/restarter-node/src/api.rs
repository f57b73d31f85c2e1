//! HTTP API for the restarter node.
//!
//! Assembles the resource routes, the health check and the request
//! instrumentation into one router.

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use restarter_storage::ResourceStore;
use tower_http::catch_panic::CatchPanicLayer;

use crate::observability::{instrument, InstrumentSettings, RequestContext};
use crate::resource_api::{handle_panic, resource_routes, ApiError};

/// Application state shared across handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Resource store.
    pub store: ResourceStore,
    /// Settings for the instrumentation middleware.
    pub instrumentation: InstrumentSettings,
}

impl AppState {
    /// Creates state with default instrumentation settings.
    pub fn new(store: ResourceStore) -> Self {
        Self {
            store,
            instrumentation: InstrumentSettings::default(),
        }
    }
}

/// Creates the API router.
///
/// Panics inside handlers become 500 responses before they reach the
/// instrumentation, so they are logged like any other failure.
pub fn create_router(state: AppState) -> Router {
    let instrumentation = state.instrumentation.clone();

    Router::new()
        .route("/health", get(health_check))
        .merge(resource_routes())
        .fallback(route_not_found)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn_with_state(instrumentation, instrument))
        .with_state(state)
}

/// Health check endpoint: 200 when the store answers a ping, 503 otherwise.
async fn health_check(State(state): State<AppState>, ctx: RequestContext) -> Response {
    match state.store.ping(ctx.query()).await {
        Ok(()) => Json(serde_json::json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        }))
        .into_response(),
        Err(e) => {
            ctx.record_error(&e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

/// Fallback for paths no route matches.
async fn route_not_found(ctx: RequestContext, uri: Uri) -> ApiError {
    ctx.record_error(format!("no route for {}", uri.path()));
    ApiError::NotFound
}

//! HTTP endpoints for the `resourceone` resource.
//!
//! ## Endpoints
//!
//! - `POST   /resourceone`      - Create a resource from `{"label": ...}`
//! - `GET    /resourceone`      - List resources updated in the last six days
//! - `GET    /resourceone/{id}` - Get one resource
//! - `PUT    /resourceone/{id}` - Replace a resource's label
//! - `DELETE /resourceone/{id}` - Delete a resource
//!
//! Every failure is recorded in the [`RequestContext`] before the error
//! response is produced, so the access log can report the underlying cause.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Utc};
use restarter_storage::StoreError;
use restarter_types::{LabelInput, ResourceId};
use serde::Serialize;
use std::any::Any;

use crate::api::AppState;
use crate::observability::{ReportedError, RequestContext};

/// How far back the list endpoint looks.
pub const LIST_LOOKBACK_DAYS: i64 = 6;

/// Status text of a 400 response.
pub const INVALID_REQUEST_STATUS: &str = "Invalid request.";
/// Status text of a 404 response.
pub const NOT_FOUND_STATUS: &str = "Resource not found.";
/// Status text of a 500 response.
pub const INTERNAL_STATUS: &str = "Error rendering response.";
/// Error text of a 500 response. The real cause only goes to the access log.
pub const INTERNAL_ERROR_TEXT: &str = "internal error";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The path or body could not be understood.
    #[error("{reason}: {detail}")]
    InvalidRequest {
        reason: &'static str,
        detail: String,
    },
    /// The addressed resource does not exist.
    #[error("no resourceone found")]
    NotFound,
    /// The store failed for any other reason.
    #[error(transparent)]
    Store(StoreError),
    /// The handler failed without a store error, e.g. it panicked.
    #[error("{0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl ApiError {
    fn invalid(reason: &'static str, detail: impl ToString) -> Self {
        ApiError::InvalidRequest {
            reason,
            detail: detail.to_string(),
        }
    }

    /// Status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            // Parser detail only goes to the access log.
            ApiError::InvalidRequest { reason, .. } => ErrorResponse {
                status: INVALID_REQUEST_STATUS,
                error: Some((*reason).to_string()),
            },
            ApiError::NotFound => ErrorResponse {
                status: NOT_FOUND_STATUS,
                error: None,
            },
            ApiError::Store(_) | ApiError::Internal(_) => ErrorResponse {
                status: INTERNAL_STATUS,
                error: Some(INTERNAL_ERROR_TEXT.to_string()),
            },
        };

        (self.status(), Json(body)).into_response()
    }
}

/// Error body: `{"status": ..., "error"?: ...}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Converts a handler panic into a 500 response.
///
/// The panic message travels to the instrumentation in a [`ReportedError`]
/// extension, since the panicking handler never got to record it.
pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "unknown panic payload".to_string()
    };

    let err = ApiError::Internal(format!("handler panicked: {detail}"));
    let reported = ReportedError(err.to_string());
    let mut response = err.into_response();
    response.extensions_mut().insert(reported);
    response
}

/// Creates the resource routes.
pub fn resource_routes() -> Router<AppState> {
    Router::new()
        .route("/resourceone", get(list_resources).post(create_resource))
        .route(
            "/resourceone/{id}",
            get(get_resource)
                .put(update_resource)
                .delete(delete_resource),
        )
}

/// Records `err` in the request context and hands it back.
fn reported(ctx: &RequestContext, err: impl Into<ApiError>) -> ApiError {
    let err = err.into();
    ctx.record_error(&err);
    err
}

fn parse_id(raw: &str) -> Result<ResourceId, ApiError> {
    if raw.is_empty() {
        return Err(ApiError::invalid("invalid id", "empty id"));
    }
    raw.parse::<ResourceId>()
        .map_err(|e| ApiError::invalid("invalid id", e))
}

fn decode_label(body: &[u8]) -> Result<LabelInput, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::invalid("invalid body", e))
}

async fn create_resource(
    State(state): State<AppState>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let input = decode_label(&body).map_err(|e| reported(&ctx, e))?;

    let resource = state
        .store
        .create(ctx.query(), &input.label)
        .await
        // A failed insert is never "not found".
        .map_err(|e| reported(&ctx, ApiError::Store(e)))?;

    tracing::debug!(id = resource.id, "Resource created");
    Ok((StatusCode::CREATED, Json(resource)))
}

async fn list_resources(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<impl IntoResponse, ApiError> {
    let since = Utc::now() - Duration::days(LIST_LOOKBACK_DAYS);
    let resources = state
        .store
        .list_updated_after(ctx.query(), since)
        .await
        .map_err(|e| reported(&ctx, e))?;

    Ok(Json(resources))
}

async fn get_resource(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id).map_err(|e| reported(&ctx, e))?;
    let resource = state
        .store
        .get_by_id(ctx.query(), id)
        .await
        .map_err(|e| reported(&ctx, e))?;

    Ok(Json(resource))
}

async fn update_resource(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id).map_err(|e| reported(&ctx, e))?;
    let input = decode_label(&body).map_err(|e| reported(&ctx, e))?;

    let resource = state
        .store
        .update(ctx.query(), id, &input.label)
        .await
        .map_err(|e| reported(&ctx, e))?;

    Ok(Json(resource))
}

async fn delete_resource(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&raw_id).map_err(|e| reported(&ctx, e))?;
    state
        .store
        .delete(ctx.query(), id)
        .await
        .map_err(|e| reported(&ctx, e))?;

    Ok(StatusCode::NO_CONTENT)
}

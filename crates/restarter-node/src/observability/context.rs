//! Request-scoped context shared by the instrumentation and the handlers.

use axum::{extract::FromRequestParts, http::request::Parts};
use parking_lot::Mutex;
use restarter_storage::QueryContext;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Correlation id assigned to one request.
///
/// UUIDv7: ordered by creation time and unique without coordination.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generates a fresh id for the current instant.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Per-request carrier for the correlation id, the store cancellation
/// context and the single error slot read by the access log.
///
/// Inserted into the request extensions by the instrumentation middleware;
/// clones share the same slot.
#[derive(Clone, Debug)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    request_id: RequestId,
    query: QueryContext,
    error: Mutex<Option<String>>,
}

impl RequestContext {
    /// Creates a context for a new request.
    pub fn new(request_id: RequestId, query: QueryContext) -> Self {
        Self {
            inner: Arc::new(Inner {
                request_id,
                query,
                error: Mutex::new(None),
            }),
        }
    }

    /// Context for a handler invoked without the instrumentation layer.
    pub fn detached() -> Self {
        Self::new(RequestId::generate(), QueryContext::new())
    }

    /// Returns the correlation id.
    pub fn request_id(&self) -> RequestId {
        self.inner.request_id
    }

    /// Returns the cancellation context handed to store calls.
    pub fn query(&self) -> &QueryContext {
        &self.inner.query
    }

    /// Records the error that explains this request's failure.
    ///
    /// One error is expected per request; if several are recorded the last
    /// one wins.
    pub fn record_error(&self, error: impl fmt::Display) {
        *self.inner.error.lock() = Some(error.to_string());
    }

    /// Returns the recorded error text, if any.
    pub fn error(&self) -> Option<String> {
        self.inner.error.lock().clone()
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_else(RequestContext::detached))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_time_ordered() {
        let first = RequestId::generate();
        let second = RequestId::generate();
        assert_ne!(first, second);
        assert!(first < second);
        assert_eq!(first.0.get_version_num(), 7);
    }

    #[test]
    fn test_error_slot_is_shared_and_last_write_wins() {
        let ctx = RequestContext::detached();
        let handler_view = ctx.clone();
        assert_eq!(ctx.error(), None);

        handler_view.record_error("first");
        handler_view.record_error("second");
        assert_eq!(ctx.error().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_extractor_falls_back_to_detached() {
        let (mut parts, _) = axum::http::Request::new(()).into_parts();
        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.error(), None);

        let installed = RequestContext::detached();
        parts.extensions.insert(installed.clone());
        let ctx = RequestContext::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(ctx.request_id(), installed.request_id());
    }
}

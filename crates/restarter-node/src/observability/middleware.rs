//! Request instrumentation.
//!
//! Every request gets a correlation id, a cancellation context for store
//! calls and a Response Observer. One access-log event is emitted per
//! request, after the response body has been sent or abandoned.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use restarter_storage::QueryContext;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{Instrument, Level};

use super::context::{RequestContext, RequestId};
use super::observer::ResponseObserver;

/// Header carrying the correlation id on every response.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tracing target of access-log events.
pub const ACCESS_LOG_TARGET: &str = "access_log";

/// Settings for the instrumentation middleware.
#[derive(Clone, Debug, Default)]
pub struct InstrumentSettings {
    /// Deadline applied to store calls made on behalf of one request.
    pub request_timeout: Option<Duration>,
}

/// Error text attached to a response by a layer that has no access to the
/// request context, such as the panic handler.
#[derive(Clone, Debug)]
pub struct ReportedError(pub String);

/// Instrumentation middleware, installed with
/// `axum::middleware::from_fn_with_state`.
pub async fn instrument(
    State(settings): State<InstrumentSettings>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_id = RequestId::generate();
    let mut query = QueryContext::new();
    if let Some(timeout) = settings.request_timeout {
        query = query.with_timeout(timeout);
    }
    let cancel_on_drop = query.drop_guard();
    let ctx = RequestContext::new(request_id, query);
    request.extensions_mut().insert(ctx.clone());

    let observer = ResponseObserver::new();
    let access = AccessLog::begin(&request, ctx.clone(), observer.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let mut response = next.run(request).instrument(span).await;

    if let Some(ReportedError(error)) = response.extensions_mut().remove::<ReportedError>() {
        ctx.record_error(error);
    }
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    observer.observe(response, (access, cancel_on_drop))
}

/// Resolves the client address: first `X-Forwarded-For` hop, then
/// `X-Real-IP`, then the socket peer. Empty when none is known.
pub fn resolve_client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = forwarded {
        return addr.to_string();
    }

    let real_ip = headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(addr) = real_ip {
        return addr.to_string();
    }

    peer.map(|addr| addr.to_string()).unwrap_or_default()
}

/// Request fields captured before the handler runs.
#[derive(Debug, Default)]
struct RequestFields {
    http_scheme: String,
    http_proto: String,
    http_method: String,
    remote_addr: String,
    user_agent: String,
    uri: String,
}

impl RequestFields {
    fn capture(request: &Request) -> Self {
        let scheme = request.uri().scheme_str().unwrap_or("http").to_string();
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| request.uri().host())
            .unwrap_or_default();
        let path_and_query = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let peer = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            uri: format!("{scheme}://{host}{path_and_query}"),
            http_scheme: scheme,
            http_proto: format!("{:?}", request.version()),
            http_method: request.method().to_string(),
            remote_addr: resolve_client_addr(request.headers(), peer),
            user_agent: request
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        }
    }
}

/// Emits the access-log event for one request when dropped.
struct AccessLog {
    fields: RequestFields,
    ctx: RequestContext,
    observer: ResponseObserver,
    started: Instant,
}

impl AccessLog {
    fn begin(request: &Request, ctx: RequestContext, observer: ResponseObserver) -> Self {
        Self {
            fields: RequestFields::capture(request),
            ctx,
            observer,
            started: Instant::now(),
        }
    }
}

impl Drop for AccessLog {
    fn drop(&mut self) {
        let record = AccessRecord {
            request_id: self.ctx.request_id().to_string(),
            fields: std::mem::take(&mut self.fields),
            process_time_us: self.started.elapsed().as_micros() as u64,
            http_status: self.observer.status(),
            resp_length: self.observer.bytes_written(),
            error: self.ctx.error(),
        };
        record.emit();
    }
}

/// Everything logged for one request.
#[derive(Debug)]
struct AccessRecord {
    request_id: String,
    fields: RequestFields,
    process_time_us: u64,
    http_status: u16,
    resp_length: u64,
    error: Option<String>,
}

macro_rules! access_event {
    ($level:expr, $record:ident, $message:expr) => {
        tracing::event!(
            target: ACCESS_LOG_TARGET,
            $level,
            request_id = %$record.request_id,
            http_scheme = %$record.fields.http_scheme,
            http_proto = %$record.fields.http_proto,
            http_method = %$record.fields.http_method,
            remote_addr = %$record.fields.remote_addr,
            user_agent = %$record.fields.user_agent,
            uri = %$record.fields.uri,
            process_time_us = $record.process_time_us,
            http_status = $record.http_status,
            resp_length = $record.resp_length,
            "{}",
            $message
        )
    };
}

impl AccessRecord {
    /// 404 and 400 are client mistakes and log at WARN whatever was
    /// recorded; otherwise a recorded error logs at ERROR.
    fn level(&self) -> Level {
        let status = self.http_status;
        if status == StatusCode::NOT_FOUND.as_u16() || status == StatusCode::BAD_REQUEST.as_u16() {
            Level::WARN
        } else if self.error.is_some() {
            Level::ERROR
        } else {
            Level::INFO
        }
    }

    fn emit(&self) {
        let level = self.level();
        if level == Level::WARN {
            let message = self.error.as_deref().unwrap_or("request completed");
            access_event!(Level::WARN, self, message);
        } else if level == Level::ERROR {
            access_event!(Level::ERROR, self, self.error.as_deref().unwrap_or_default());
        } else {
            access_event!(Level::INFO, self, "request completed");
        }
    }
}

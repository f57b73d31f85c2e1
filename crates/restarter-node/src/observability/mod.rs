//! # Observability Module
//!
//! Request-scoped observability for the restarter node:
//!
//! - **Correlation ids**: a time-ordered id per request, echoed in `x-request-id`
//! - **Access log**: one structured `tracing` event per request (target `access_log`)
//! - **Error surfacing**: handlers record their failure in the request context
//!   and the access log picks it up after the response is sent
//!
//! ## Usage
//!
//! ```rust,ignore
//! use axum::{middleware, Router};
//! use restarter_node::observability::{init_logging, instrument, InstrumentSettings, LogFormat};
//!
//! init_logging("info", LogFormat::Json);
//!
//! let app: Router<()> = Router::new()
//!     .layer(middleware::from_fn_with_state(InstrumentSettings::default(), instrument));
//! ```

mod context;
mod logging;
pub mod middleware;
pub mod observer;

pub use context::{RequestContext, RequestId};
pub use logging::{default_directives, init_logging, LogFormat};
pub use middleware::{
    instrument, resolve_client_addr, InstrumentSettings, ReportedError, ACCESS_LOG_TARGET,
    REQUEST_ID_HEADER,
};
pub use observer::ResponseObserver;

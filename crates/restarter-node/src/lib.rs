//! # Restarter Node
//!
//! HTTP service exposing the `resourceone` resource with request-scoped
//! observability.
//!
//! ## Architecture
//!
//! ```text
//! request ─► instrument ─► catch panic ─► resource_api ─► ResourceStore ─► SQLite
//!               │                               │
//!               │  correlation id, deadline     │  records failures in
//!               │  Response Observer            │  the RequestContext
//!               ▼                               │
//!          access_log event ◄───────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! cargo run --bin restarter-node -- --http-addr 127.0.0.1:9002
//! ```
//!
//! ## Modules
//!
//! - [`api`] - Router assembly, shared state and the health check
//! - [`resource_api`] - CRUD endpoints and error rendering
//! - [`observability`] - Correlation ids, Response Observer, access log, logging init
//! - [`config`] - Node configuration
//!
//! ## Example: Building the router
//!
//! ```rust,no_run
//! use restarter_node::api::{create_router, AppState};
//! use restarter_storage::{ResourceStore, StoreConfig};
//!
//! # async fn run() -> restarter_storage::Result<()> {
//! let store = ResourceStore::open(StoreConfig::new("./data/restarter.db")).await?;
//! let app = create_router(AppState::new(store));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod observability;
pub mod resource_api;

pub use api::{create_router, AppState};
pub use config::{ConfigError, NodeConfig};
pub use resource_api::ApiError;

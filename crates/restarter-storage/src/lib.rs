//! Persistence for Restarter.
//!
//! This crate owns everything between the HTTP layer and SQLite:
//!
//! - [`filter`] composes `WHERE` predicates and their named parameters
//! - [`pool`] hands out bounded, reusable connections
//! - [`schema`] creates and drops the `resourceone` table
//! - [`ResourceStore`] implements create/read/update/delete on top of them
//!
//! Every store operation takes a [`QueryContext`] whose cancellation and
//! deadline are propagated into the running SQLite statement.

mod context;
mod error;
pub mod filter;
pub mod pool;
pub mod schema;
mod store;

pub use context::QueryContext;
pub use error::{Result, StoreError};
pub use filter::{BuiltQuery, Filter, FilterError};
pub use pool::{ConnectionPool, PoolConfig, PoolError, PoolStats, PooledConnection};
pub use store::{ResourceStore, StoreConfig};

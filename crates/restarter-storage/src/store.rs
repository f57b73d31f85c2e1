//! SQLite-backed resource store.
//!
//! Every operation checks out one pooled connection, runs a single
//! statement on the blocking thread pool and hands the connection back.
//! Cancelling the [`QueryContext`], passing its deadline, or dropping the
//! returned future interrupts the statement in flight. SQLite rolls an
//! interrupted statement back, so a cancelled mutation is never partially
//! visible.

use chrono::{DateTime, Utc};
use restarter_types::{Resource, ResourceId};
use rusqlite::types::Value;
use rusqlite::{Connection, InterruptHandle, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::filter::{self, Filter};
use crate::pool::{ConnectionPool, PoolConfig, PoolError, PoolStats};
use crate::schema::{self, from_micros, to_micros};
use crate::{QueryContext, Result, StoreError};

const SELECT_SQL: &str = "SELECT resourceone_id, label, time_created, time_updated
    FROM resourceone
    WHERE 1 = 1";

const INSERT_SQL: &str = "INSERT INTO resourceone (label, time_created, time_updated)
    VALUES (:label, :now, :now)
    RETURNING resourceone_id, label, time_created, time_updated";

// `time_updated` moves forward by at least one microsecond on every update.
const UPDATE_SQL: &str = "UPDATE resourceone
    SET label = :label,
        time_updated = MAX(:now, time_updated + 1)
    WHERE 1 = 1";

const DELETE_SQL: &str = "DELETE FROM resourceone WHERE 1 = 1";

const RETURNING_SQL: &str = " RETURNING resourceone_id, label, time_created, time_updated";

/// Settings for opening a [`ResourceStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// SQLite database file.
    pub path: PathBuf,
    /// Pool sizing and timeouts.
    pub pool: PoolConfig,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl StoreConfig {
    /// Creates a config for `path` with default pool settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pool: PoolConfig::default(),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// CRUD operations over the `resourceone` table.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct ResourceStore {
    pool: ConnectionPool<Connection>,
}

impl ResourceStore {
    /// Opens the store, checks connectivity and applies the schema.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let path = config.path.clone();
        let busy_timeout = config.busy_timeout;
        let pool = ConnectionPool::new(
            move || open_connection(&path, busy_timeout),
            config.pool,
        );
        let store = Self::with_pool(pool);

        let ctx = QueryContext::new();
        store.ping(&ctx).await?;
        store.migrate_up(&ctx).await?;

        tracing::info!(path = %config.path.display(), "Resource store opened");
        Ok(store)
    }

    /// Wraps an existing pool. The schema is not touched.
    pub fn with_pool(pool: ConnectionPool<Connection>) -> Self {
        Self { pool }
    }

    /// Returns connection pool statistics.
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Checks that a connection can be obtained and answers a trivial query.
    pub async fn ping(&self, ctx: &QueryContext) -> Result<()> {
        self.run(ctx, "ping", |conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }

    /// Creates the table and index if missing.
    pub async fn migrate_up(&self, ctx: &QueryContext) -> Result<()> {
        self.run(ctx, "migrate_up", schema::migrate_up).await
    }

    /// Drops the table and index.
    pub async fn migrate_down(&self, ctx: &QueryContext) -> Result<()> {
        self.run(ctx, "migrate_down", schema::migrate_down).await
    }

    /// Inserts a new resource and returns it with its identity and
    /// timestamps populated.
    pub async fn create(&self, ctx: &QueryContext, label: &str) -> Result<Resource> {
        let label = label.to_owned();
        self.run(ctx, "create", move |conn| {
            let now = to_micros(Utc::now());
            let row = conn.query_row(
                INSERT_SQL,
                rusqlite::named_params! { ":label": label, ":now": now },
                ResourceRow::from_row,
            )?;
            row.into_resource()
        })
        .await
    }

    /// Returns the resource with identity `id`.
    pub async fn get_by_id(&self, ctx: &QueryContext, id: ResourceId) -> Result<Resource> {
        self.select(ctx, vec![Filter::by_id(id)])
            .await?
            .into_iter()
            .next()
            .ok_or(StoreError::NotFound)
    }

    /// Returns every resource updated strictly after `threshold`, in no
    /// particular order.
    ///
    /// An empty result is reported as [`StoreError::NotFound`] rather than
    /// an empty list; HTTP clients depend on the resulting 404.
    pub async fn list_updated_after(
        &self,
        ctx: &QueryContext,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<Resource>> {
        let resources = self
            .select(ctx, vec![Filter::updated_after(threshold)])
            .await?;
        if resources.is_empty() {
            return Err(StoreError::NotFound);
        }
        Ok(resources)
    }

    /// Returns every resource matching all `filters`. An empty result is
    /// not an error here.
    pub async fn select(&self, ctx: &QueryContext, filters: Vec<Filter>) -> Result<Vec<Resource>> {
        let query = filter::build(SELECT_SQL, &filters)?;
        self.run(ctx, "select", move |conn| {
            let mut stmt = conn.prepare_cached(&query.sql)?;
            let rows = stmt
                .query_map(query.named_params().as_slice(), ResourceRow::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.into_iter().map(ResourceRow::into_resource).collect()
        })
        .await
    }

    /// Replaces the label of resource `id` and advances its `time_updated`.
    pub async fn update(&self, ctx: &QueryContext, id: ResourceId, label: &str) -> Result<Resource> {
        let mut query = filter::build(UPDATE_SQL, &[Filter::by_id(id)])?;
        query.sql.push_str(RETURNING_SQL);
        query
            .params
            .push((":label".into(), Value::Text(label.to_owned())));

        self.run(ctx, "update", move |conn| {
            query
                .params
                .push((":now".into(), Value::Integer(to_micros(Utc::now()))));
            let row = conn
                .query_row(
                    &query.sql,
                    query.named_params().as_slice(),
                    ResourceRow::from_row,
                )
                .optional()?;
            row.ok_or(StoreError::NotFound)?.into_resource()
        })
        .await
    }

    /// Removes resource `id`.
    pub async fn delete(&self, ctx: &QueryContext, id: ResourceId) -> Result<()> {
        let query = filter::build(DELETE_SQL, &[Filter::by_id(id)])?;
        self.run(ctx, "delete", move |conn| {
            let affected = conn.execute(&query.sql, query.named_params().as_slice())?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    /// Runs `op` on a pooled connection on the blocking pool, racing it
    /// against the context's cancellation and deadline.
    async fn run<T, F>(&self, ctx: &QueryContext, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        ctx.check()?;
        let started_at = Instant::now();

        let conn = tokio::select! {
            acquired = self.pool.acquire() => acquired?,
            err = ctx.done() => return Err(err),
        };

        let interrupt = InterruptOnDrop::new(conn.get_interrupt_handle());
        let task_ctx = ctx.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let result = task_ctx.check().and_then(|()| f(&*conn));
            // Keep the connection checked out until the caller has stopped
            // interrupting it.
            (conn, result)
        });

        let joined = tokio::select! {
            biased;
            joined = &mut task => joined,
            err = ctx.done() => {
                drop(interrupt);
                tracing::debug!(op, error = %err, "Store operation aborted");
                return Err(err);
            }
        };
        interrupt.disarm();

        let (_conn, result) = joined.map_err(|e| StoreError::Task(e.to_string()))?;

        let duration_us = started_at.elapsed().as_micros() as u64;
        match &result {
            Ok(_) => tracing::debug!(op, duration_us, "Store operation completed"),
            Err(e) => tracing::debug!(op, duration_us, error = %e, "Store operation failed"),
        }
        result
    }
}

/// Interrupts the connection's running statement unless disarmed.
///
/// Covers both explicit cancellation and the caller dropping the store
/// future mid-flight.
struct InterruptOnDrop {
    handle: Option<InterruptHandle>,
}

impl InterruptOnDrop {
    fn new(handle: InterruptHandle) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    fn disarm(mut self) {
        self.handle = None;
    }
}

impl Drop for InterruptOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.interrupt();
        }
    }
}

fn open_connection(path: &Path, busy_timeout: Duration) -> std::result::Result<Connection, PoolError> {
    let connect = |e: rusqlite::Error| PoolError::Connect(e.to_string());

    let conn = Connection::open(path).map_err(connect)?;
    conn.busy_timeout(busy_timeout).map_err(connect)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
        .map_err(connect)?;
    Ok(conn)
}

/// Raw column values of one `resourceone` row.
struct ResourceRow {
    id: i64,
    label: String,
    time_created: i64,
    time_updated: i64,
}

impl ResourceRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            label: row.get(1)?,
            time_created: row.get(2)?,
            time_updated: row.get(3)?,
        })
    }

    fn into_resource(self) -> Result<Resource> {
        Ok(Resource {
            id: self.id,
            label: self.label,
            time_created: from_micros(self.time_created)?,
            time_updated: from_micros(self.time_updated)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (TempDir, ResourceStore) {
        let dir = TempDir::new().unwrap();
        let store = ResourceStore::open(StoreConfig::new(dir.path().join("test.db")))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_create_assigns_identity_and_equal_timestamps() {
        let (_dir, store) = test_store().await;
        let ctx = QueryContext::new();

        let before = Utc::now() - chrono::Duration::seconds(1);
        let resource = store.create(&ctx, "test").await.unwrap();

        assert!(resource.id > 0);
        assert_eq!(resource.label, "test");
        assert_eq!(resource.time_created, resource.time_updated);
        assert!(resource.time_created > before);
    }

    #[tokio::test]
    async fn test_cancelled_context_fails_before_touching_store() {
        let (_dir, store) = test_store().await;
        let ctx = QueryContext::new();
        ctx.cancel();

        let err = store.create(&ctx, "never").await.unwrap_err();
        assert!(matches!(err, StoreError::Cancelled));

        let all = store.select(&QueryContext::new(), vec![]).await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_connections_return_to_pool() {
        let (_dir, store) = test_store().await;
        let ctx = QueryContext::new();
        store.create(&ctx, "a").await.unwrap();
        store.get_by_id(&ctx, 1).await.unwrap();

        let stats = store.pool_stats();
        assert_eq!(stats.active, 0);
        assert!(stats.idle >= 1);
    }

    #[tokio::test]
    async fn test_open_fails_for_unwritable_path() {
        let dir = TempDir::new().unwrap();
        let config = StoreConfig::new(dir.path().join("missing").join("test.db"));
        let err = ResourceStore::open(config).await.unwrap_err();
        assert!(matches!(err, StoreError::Pool(PoolError::Connect(_))));
    }
}

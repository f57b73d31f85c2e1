//! Connection pooling for the resource store.
//!
//! A bounded pool of store connections. Acquisition waits on a semaphore
//! (with a timeout), reuses an idle connection when one is still within
//! its lifetime, and otherwise opens a new one through the pool's factory.
//! Connections go back to the idle queue when their guard is dropped.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Connection pool configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections.
    pub max_connections: usize,
    /// How long `acquire` waits for a free slot.
    pub acquire_timeout: Duration,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 8,
            acquire_timeout: Duration::from_secs(5),
            max_lifetime: Duration::from_secs(3600),
        }
    }
}

/// Statistics for a connection pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Connections currently checked out.
    pub active: usize,
    /// Connections waiting in the idle queue.
    pub idle: usize,
    /// Total number of connections opened.
    pub total_created: u64,
    /// Total number of connections closed.
    pub total_closed: u64,
    /// Number of acquire timeouts.
    pub timeouts: u64,
}

/// Pool error types.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PoolError {
    #[error("connection acquisition timed out")]
    Timeout,
    #[error("pool is closed")]
    Closed,
    #[error("failed to open connection: {0}")]
    Connect(String),
}

/// Opens a fresh connection for the pool.
pub type ConnectionFactory<T> = Arc<dyn Fn() -> Result<T, PoolError> + Send + Sync>;

/// A pooled connection wrapper.
///
/// Dereferences to the underlying connection and returns it to the pool on
/// drop.
pub struct PooledConnection<T> {
    conn: Option<T>,
    pool: Arc<ConnectionPoolInner<T>>,
    created_at: Instant,
}

impl<T> Drop for PooledConnection<T> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_connection(conn, self.created_at);
        }
    }
}

impl<T> std::ops::Deref for PooledConnection<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection is only taken on drop")
    }
}

impl<T> std::ops::DerefMut for PooledConnection<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection is only taken on drop")
    }
}

struct PoolEntry<T> {
    conn: T,
    created_at: Instant,
}

struct ConnectionPoolInner<T> {
    config: PoolConfig,
    available: Mutex<VecDeque<PoolEntry<T>>>,
    semaphore: Semaphore,
    active_count: AtomicUsize,
    total_created: AtomicUsize,
    total_closed: AtomicUsize,
    timeouts: AtomicUsize,
}

impl<T> ConnectionPoolInner<T> {
    fn return_connection(&self, conn: T, created_at: Instant) {
        let mut available = self.available.lock();

        if created_at.elapsed() < self.config.max_lifetime {
            available.push_back(PoolEntry { conn, created_at });
        } else {
            self.total_closed.fetch_add(1, Ordering::Relaxed);
        }

        drop(available);
        self.release_slot();
    }

    fn release_slot(&self) {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.semaphore.add_permits(1);
    }
}

/// A bounded connection pool.
pub struct ConnectionPool<T> {
    inner: Arc<ConnectionPoolInner<T>>,
    factory: ConnectionFactory<T>,
}

impl<T> Clone for ConnectionPool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            factory: Arc::clone(&self.factory),
        }
    }
}

impl<T> fmt::Debug for ConnectionPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> ConnectionPool<T> {
    /// Creates a new connection pool. No connection is opened until the
    /// first `acquire`.
    pub fn new<F>(factory: F, config: PoolConfig) -> Self
    where
        F: Fn() -> Result<T, PoolError> + Send + Sync + 'static,
    {
        let inner = Arc::new(ConnectionPoolInner {
            semaphore: Semaphore::new(config.max_connections),
            config,
            available: Mutex::new(VecDeque::new()),
            active_count: AtomicUsize::new(0),
            total_created: AtomicUsize::new(0),
            total_closed: AtomicUsize::new(0),
            timeouts: AtomicUsize::new(0),
        });

        Self {
            inner,
            factory: Arc::new(factory),
        }
    }

    /// Acquires a connection from the pool.
    pub async fn acquire(&self) -> Result<PooledConnection<T>, PoolError> {
        let permit = tokio::time::timeout(
            self.inner.config.acquire_timeout,
            self.inner.semaphore.acquire(),
        )
        .await
        .map_err(|_| {
            self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
            PoolError::Timeout
        })?
        .map_err(|_| PoolError::Closed)?;

        // The slot is handed back through `release_slot` when the guard drops.
        permit.forget();
        self.inner.active_count.fetch_add(1, Ordering::Relaxed);

        let entry = {
            let mut available = self.inner.available.lock();
            loop {
                match available.pop_front() {
                    Some(entry) if entry.created_at.elapsed() < self.inner.config.max_lifetime => {
                        break Some(entry);
                    }
                    Some(_) => {
                        self.inner.total_closed.fetch_add(1, Ordering::Relaxed);
                    }
                    None => break None,
                }
            }
        };

        let (conn, created_at) = match entry {
            Some(entry) => (entry.conn, entry.created_at),
            None => match (self.factory)() {
                Ok(conn) => {
                    self.inner.total_created.fetch_add(1, Ordering::Relaxed);
                    (conn, Instant::now())
                }
                Err(e) => {
                    self.inner.release_slot();
                    return Err(e);
                }
            },
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            created_at,
        })
    }

    /// Returns pool statistics.
    pub fn stats(&self) -> PoolStats {
        let available = self.inner.available.lock();
        PoolStats {
            active: self.inner.active_count.load(Ordering::Relaxed),
            idle: available.len(),
            total_created: self.inner.total_created.load(Ordering::Relaxed) as u64,
            total_closed: self.inner.total_closed.load(Ordering::Relaxed) as u64,
            timeouts: self.inner.timeouts.load(Ordering::Relaxed) as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn test_pool_acquire_release() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let pool = ConnectionPool::new(
            move || Ok(counter_clone.fetch_add(1, Ordering::Relaxed)),
            PoolConfig {
                max_connections: 2,
                ..Default::default()
            },
        );

        let conn1 = pool.acquire().await.unwrap();
        assert_eq!(*conn1, 0);

        let conn2 = pool.acquire().await.unwrap();
        assert_eq!(*conn2, 1);

        let stats = pool.stats();
        assert_eq!(stats.active, 2);
        assert_eq!(stats.idle, 0);

        drop(conn1);

        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.idle, 1);

        let conn3 = pool.acquire().await.unwrap();
        assert_eq!(*conn3, 0);

        assert_eq!(counter.load(Ordering::Relaxed), 2);
        drop(conn2);
    }

    #[tokio::test]
    async fn test_pool_timeout() {
        let pool = ConnectionPool::new(
            || Ok(42),
            PoolConfig {
                max_connections: 1,
                acquire_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        let _conn = pool.acquire().await.unwrap();

        let result = pool.acquire().await;
        assert!(matches!(result, Err(PoolError::Timeout)));
        assert_eq!(pool.stats().timeouts, 1);
    }

    #[tokio::test]
    async fn test_factory_failure_releases_slot() {
        let attempts = Arc::new(AtomicU32::new(0));
        let attempts_clone = Arc::clone(&attempts);
        let pool = ConnectionPool::new(
            move || {
                if attempts_clone.fetch_add(1, Ordering::Relaxed) == 0 {
                    Err(PoolError::Connect("disk full".into()))
                } else {
                    Ok(())
                }
            },
            PoolConfig {
                max_connections: 1,
                acquire_timeout: Duration::from_millis(50),
                ..Default::default()
            },
        );

        assert!(matches!(pool.acquire().await, Err(PoolError::Connect(_))));
        assert_eq!(pool.stats().active, 0);

        // The failed attempt must not leak its slot.
        let conn = pool.acquire().await.unwrap();
        assert_eq!(pool.stats().active, 1);
        drop(conn);
    }

    #[tokio::test]
    async fn test_expired_connections_are_not_reused() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);
        let pool = ConnectionPool::new(
            move || Ok(counter_clone.fetch_add(1, Ordering::Relaxed)),
            PoolConfig {
                max_lifetime: Duration::ZERO,
                ..Default::default()
            },
        );

        drop(pool.acquire().await.unwrap());
        let conn = pool.acquire().await.unwrap();
        assert_eq!(*conn, 1);
        assert_eq!(pool.stats().total_closed, 1);
    }
}

//! Fixed-size pool of exclusive connection handles.
//!
//! A semaphore with one permit per handle bounds how many handles are out
//! at once; waiters are served in FIFO order. A [`PooledConnection`] puts its
//! handle back when dropped, so every exit path (early return, `?`, task
//! cancellation) returns it.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use quarry_core::AppError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

struct PoolInner<C> {
    idle: Mutex<Vec<C>>,
    permits: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

impl<C> PoolInner<C> {
    fn lock_idle(&self) -> MutexGuard<'_, Vec<C>> {
        self.idle.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Connection pool mutex was poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }
}

/// Bounded pool of homogeneous handles.
pub struct ConnectionPool<C> {
    inner: Arc<PoolInner<C>>,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> ConnectionPool<C> {
    /// Build a pool that owns `connections`. Its size is fixed from here on.
    pub fn from_connections(connections: Vec<C>, acquire_timeout: Duration) -> Result<Self, AppError> {
        if connections.is_empty() {
            return Err(AppError::ConfigError(
                "Connection pool needs at least one connection".into(),
            ));
        }
        let size = connections.len();
        Ok(Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(connections),
                permits: Arc::new(Semaphore::new(size)),
                size,
                acquire_timeout,
            }),
        })
    }

    /// Check out a handle, waiting up to the acquire timeout.
    ///
    /// Fails with [`AppError::PoolExhausted`] when no handle frees up in
    /// time, and with [`AppError::PoolClosed`] once the pool is shut down,
    /// including for callers already waiting.
    pub async fn acquire(&self) -> Result<PooledConnection<C>, AppError> {
        let started = Instant::now();
        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        .map_err(|_| {
            let waited_ms = started.elapsed().as_millis() as u64;
            tracing::warn!(%waited_ms, size = self.inner.size, "Connection pool exhausted");
            AppError::PoolExhausted { waited_ms }
        })?
        .map_err(|_| AppError::PoolClosed)?;

        let conn = self.inner.lock_idle().pop().ok_or(AppError::PoolClosed)?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Handles currently checked out.
    pub fn in_use(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.inner.size - self.inner.permits.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.permits.is_closed()
    }

    /// Shut the pool down and hand back the idle handles.
    ///
    /// Pending and future `acquire` calls fail with `PoolClosed`. Handles
    /// still checked out are dropped when their guard is released.
    pub fn close(&self) -> Vec<C> {
        self.inner.permits.close();
        std::mem::take(&mut *self.inner.lock_idle())
    }
}

/// Exclusive use of one pooled handle for the guard's lifetime.
pub struct PooledConnection<C> {
    conn: Option<C>,
    pool: Arc<PoolInner<C>>,
    // Released after `drop` has put the handle back.
    _permit: OwnedSemaphorePermit,
}

impl<C: std::fmt::Debug> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").field("conn", &self.conn).finish_non_exhaustive()
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `drop` takes the handle out.
        self.conn.as_ref().unwrap_or_else(|| unreachable!("pooled connection already released"))
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("pooled connection already released"))
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        if self.pool.permits.is_closed() {
            return;
        }
        self.pool.lock_idle().push(conn);
    }
}

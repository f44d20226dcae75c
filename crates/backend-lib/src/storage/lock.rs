// ============================
// crates/backend-lib/src/storage/lock.rs
// ============================
//! Named advisory locks.
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::AppError;

/// How long [`MemoryLockManager`] waits before giving up on a lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Holds a named lock until dropped.
pub struct LockGuard {
    key: String,
    _held: Box<dyn Any + Send + Sync>,
}

impl LockGuard {
    pub fn new(key: impl Into<String>, held: impl Any + Send + Sync) -> Self {
        Self {
            key: key.into(),
            _held: Box::new(held),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard").field("key", &self.key).finish()
    }
}

/// Scoped mutual exclusion keyed by name, shared by every request.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Wait for the lock named `key`. It is released when the guard drops.
    async fn lock(&self, key: &str) -> Result<LockGuard, AppError>;
}

/// In-process lock manager backed by one `tokio` mutex per key.
#[derive(Debug, Clone)]
pub struct MemoryLockManager {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    timeout: Duration,
}

impl Default for MemoryLockManager {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl MemoryLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
            timeout,
        }
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn lock(&self, key: &str) -> Result<LockGuard, AppError> {
        // Clone the mutex out so no map shard stays locked while we wait
        let mutex = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let held = tokio::time::timeout(self.timeout, mutex.lock_owned())
            .await
            .map_err(|_| AppError::Lock(format!("timed out waiting for '{key}'")))?;

        Ok(LockGuard::new(key, held))
    }
}

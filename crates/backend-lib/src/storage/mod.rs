// ============================
// crates/backend-lib/src/storage/mod.rs
// ============================
//! Storage abstraction for ephemeral server state.
//!
//! Sessions, outboxes, channels, spectators and matches all live behind this
//! narrow key-value interface. Records are JSON documents; queues are lists;
//! memberships are sets of strings.
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::AppError;

mod lock;
mod memory;

pub use lock::{LockGuard, LockManager, MemoryLockManager};
pub use memory::MemoryStorage;

/// Trait for key-value storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Read a plain value. Expired keys read as missing.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError>;

    /// Write a plain value, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AppError>;

    /// Delete a key of any kind. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, AppError>;

    async fn exists(&self, key: &str) -> Result<bool, AppError>;

    /// Set a key's TTL. Returns false if the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError>;

    /// Atomically increment an integer counter, starting from zero.
    async fn incr(&self, key: &str) -> Result<i64, AppError>;

    /// Keys matching a glob pattern where `*` matches any run of characters.
    ///
    /// The stream is finite and cannot be restarted. Keys written while it is
    /// being consumed may or may not appear.
    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<String, AppError>>;

    /// Append to a list. Returns the new length.
    async fn list_push(&self, key: &str, value: Vec<u8>) -> Result<usize, AppError>;

    /// Atomically take every element of a list, leaving it empty.
    async fn list_drain(&self, key: &str) -> Result<Vec<Vec<u8>>, AppError>;

    async fn list_len(&self, key: &str) -> Result<usize, AppError>;

    /// Add to a set. Returns whether the member was new.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, AppError>;

    /// Remove from a set. Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, AppError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, AppError>;

    async fn set_len(&self, key: &str) -> Result<usize, AppError>;
}

/// Read and deserialize a JSON record.
pub async fn read_json<T: DeserializeOwned>(
    storage: &dyn Storage,
    key: &str,
) -> Result<Option<T>, AppError> {
    match storage.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Serialize and write a JSON record.
pub async fn write_json<T: Serialize + Sync>(
    storage: &dyn Storage,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), AppError> {
    let bytes = serde_json::to_vec(value)?;
    storage.set(key, bytes, ttl).await
}

/// Whether `key` matches `pattern`, where `*` matches any run of characters.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((last, middle)) = parts.split_last() else {
        // No wildcard at all
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(index) => rest = &rest[index + part.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}

/// Storage key layout.
pub mod keys {
    use uuid::Uuid;

    pub const SESSIONS_PATTERN: &str = "bancho:sessions:*";
    pub const MATCHES_PATTERN: &str = "bancho:matches:*";
    pub const CHANNELS_PATTERN: &str = "bancho:channels:*";

    pub fn session(session_id: Uuid) -> String {
        format!("bancho:sessions:{session_id}")
    }

    pub fn outbox(session_id: Uuid) -> String {
        format!("bancho:outbox:{session_id}")
    }

    pub fn channel(channel_id: i64) -> String {
        format!("bancho:channels:{channel_id}")
    }

    pub fn channel_name(name: &str) -> String {
        format!("bancho:channel_names:{name}")
    }

    pub fn channel_members(channel_id: i64) -> String {
        format!("bancho:channel_members:{channel_id}")
    }

    pub fn spectators(host_session_id: Uuid) -> String {
        format!("bancho:spectators:{host_session_id}")
    }

    pub fn multiplayer_match(match_id: u16) -> String {
        format!("bancho:matches:{match_id}")
    }

    pub fn slot(match_id: u16, slot_id: u8) -> String {
        format!("bancho:matches:{match_id}:slots:{slot_id}")
    }

    pub fn id_counter(kind: &str) -> String {
        format!("bancho:ids:{kind}")
    }

    pub fn match_lock(match_id: u16) -> String {
        format!("bancho:locks:match:{match_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("bancho:sessions:*", "bancho:sessions:abc"));
        assert!(glob_match("bancho:sessions:*", "bancho:sessions:"));
        assert!(!glob_match("bancho:sessions:*", "bancho:outbox:abc"));
        assert!(glob_match("bancho:matches:*:slots:*", "bancho:matches:3:slots:15"));
        assert!(!glob_match("bancho:matches:*:slots:*", "bancho:matches:3"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a*a", "aa"));
        assert!(!glob_match("a*a", "a"));
    }
}

// ============================
// crates/backend-lib/src/storage/memory.rs
// ============================
//! In-process implementation of [`Storage`] over `dashmap`.
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{mapref::entry::Entry as MapEntry, DashMap};
use futures_util::stream::{self, BoxStream, StreamExt};

use super::{glob_match, Storage};
use crate::error::AppError;

#[derive(Debug, Clone)]
enum Value {
    Bytes(Vec<u8>),
    List(VecDeque<Vec<u8>>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key-value store held in memory. Expired keys are removed lazily on access.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<DashMap<String, Entry>>,
}

fn wrong_type(key: &str) -> AppError {
    AppError::Storage(format!("key '{key}' holds a value of another type"))
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge_expired(&self, key: &str) {
        let now = Instant::now();
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AppError> {
        self.purge_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Bytes(bytes) => Ok(Some(bytes.clone())),
                _ => Err(wrong_type(key)),
            },
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), AppError> {
        let entry = Entry {
            value: Value::Bytes(value),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, AppError> {
        self.purge_expired(key);
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        self.purge_expired(key);
        Ok(self.entries.contains_key(key))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, AppError> {
        self.purge_expired(key);
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            },
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, AppError> {
        self.purge_expired(key);
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                let Value::Bytes(bytes) = &mut occupied.get_mut().value else {
                    return Err(wrong_type(key));
                };
                let current: i64 = std::str::from_utf8(bytes)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| AppError::Storage(format!("key '{key}' is not a counter")))?;
                let next = current + 1;
                *bytes = next.to_string().into_bytes();
                Ok(next)
            },
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(Value::Bytes(b"1".to_vec())));
                Ok(1)
            },
        }
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, Result<String, AppError>> {
        let now = Instant::now();
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now) && glob_match(pattern, entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        stream::iter(keys.into_iter().map(Ok)).boxed()
    }

    async fn list_push(&self, key: &str, value: Vec<u8>) -> Result<usize, AppError> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));

        match &mut entry.value {
            Value::List(list) => {
                list.push_back(value);
                Ok(list.len())
            },
            _ => Err(wrong_type(key)),
        }
    }

    async fn list_drain(&self, key: &str) -> Result<Vec<Vec<u8>>, AppError> {
        self.purge_expired(key);
        match self.entries.remove(key) {
            Some((_, Entry { value: Value::List(list), .. })) => Ok(list.into()),
            Some((key, entry)) => {
                // Put it back untouched
                self.entries.insert(key.clone(), entry);
                Err(wrong_type(&key))
            },
            None => Ok(Vec::new()),
        }
    }

    async fn list_len(&self, key: &str) -> Result<usize, AppError> {
        self.purge_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(wrong_type(key)),
            },
            None => Ok(0),
        }
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, AppError> {
        self.purge_expired(key);
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::Set(HashSet::new())));

        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(wrong_type(key)),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, AppError> {
        self.purge_expired(key);
        let (removed, now_empty) = match self.entries.get_mut(key) {
            Some(mut entry) => match &mut entry.value {
                Value::Set(set) => {
                    let removed = set.remove(member);
                    (removed, set.is_empty())
                },
                _ => return Err(wrong_type(key)),
            },
            None => return Ok(false),
        };

        // Empty sets do not exist
        if now_empty {
            self.entries
                .remove_if(key, |_, entry| matches!(&entry.value, Value::Set(set) if set.is_empty()));
        }

        Ok(removed)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, AppError> {
        self.purge_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.iter().cloned().collect()),
                _ => Err(wrong_type(key)),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn set_len(&self, key: &str) -> Result<usize, AppError> {
        self.purge_expired(key);
        match self.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len()),
                _ => Err(wrong_type(key)),
            },
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    #[tokio::test]
    async fn test_set_get_delete() {
        let storage = MemoryStorage::new();
        storage.set("a", b"1".to_vec(), None).await.unwrap();

        assert_eq!(storage.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert!(storage.exists("a").await.unwrap());
        assert!(storage.delete("a").await.unwrap());
        assert!(!storage.delete("a").await.unwrap());
        assert_eq!(storage.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_missing() {
        let storage = MemoryStorage::new();
        storage
            .set("session", b"x".to_vec(), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert!(storage.exists("session").await.unwrap());

        assert!(storage.expire("session", Duration::ZERO).await.unwrap());
        assert_eq!(storage.get("session").await.unwrap(), None);
        assert!(!storage.expire("session", Duration::from_secs(1)).await.unwrap());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_incr_counts_from_one() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.incr("ids").await.unwrap(), 1);
        assert_eq!(storage.incr("ids").await.unwrap(), 2);

        storage.set("name", b"abc".to_vec(), None).await.unwrap();
        assert!(storage.incr("name").await.is_err());
    }

    #[tokio::test]
    async fn test_list_drain_preserves_order_and_clears() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.list_push("q", vec![1]).await.unwrap(), 1);
        assert_eq!(storage.list_push("q", vec![2]).await.unwrap(), 2);
        assert_eq!(storage.list_push("q", vec![3]).await.unwrap(), 3);

        assert_eq!(
            storage.list_drain("q").await.unwrap(),
            vec![vec![1], vec![2], vec![3]]
        );
        assert_eq!(storage.list_len("q").await.unwrap(), 0);
        assert!(storage.list_drain("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sets() {
        let storage = MemoryStorage::new();
        assert!(storage.set_add("s", "a").await.unwrap());
        assert!(!storage.set_add("s", "a").await.unwrap());
        assert!(storage.set_add("s", "b").await.unwrap());
        assert_eq!(storage.set_len("s").await.unwrap(), 2);

        let mut members = storage.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a", "b"]);

        assert!(storage.set_remove("s", "a").await.unwrap());
        assert!(!storage.set_remove("s", "a").await.unwrap());
        assert!(storage.set_remove("s", "b").await.unwrap());
        assert!(!storage.exists("s").await.unwrap());
    }

    #[tokio::test]
    async fn test_type_mismatch_is_an_error() {
        let storage = MemoryStorage::new();
        storage.list_push("q", vec![1]).await.unwrap();
        assert!(storage.get("q").await.is_err());
        assert!(storage.set_add("q", "x").await.is_err());
        assert!(storage.list_drain("q").await.is_ok());

        storage.set("plain", vec![0], None).await.unwrap();
        assert!(storage.list_drain("plain").await.is_err());
        assert!(storage.exists("plain").await.unwrap());
    }

    #[tokio::test]
    async fn test_scan_skips_expired_and_unmatched() {
        let storage = MemoryStorage::new();
        storage.set("bancho:sessions:1", vec![], None).await.unwrap();
        storage.set("bancho:sessions:2", vec![], None).await.unwrap();
        storage.set("bancho:outbox:1", vec![], None).await.unwrap();
        storage.expire("bancho:sessions:2", Duration::ZERO).await.unwrap();

        let keys: Vec<String> = storage
            .scan("bancho:sessions:*")
            .try_collect()
            .await
            .unwrap();
        assert_eq!(keys, vec!["bancho:sessions:1".to_string()]);
    }
}

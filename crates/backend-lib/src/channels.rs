// ============================
// crates/backend-lib/src/channels.rs
// ============================
//! Chat channels and their membership sets.
//!
//! The registry only stores channels. Who may join and when temporary
//! channels are torn down is decided by the chat, spectator and multiplayer
//! handlers.
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::privileges::Privileges;
use crate::storage::{keys, read_json, write_json, Storage};

/// Lobby channel whose members receive match listings.
pub const LOBBY_CHANNEL: &str = "#lobby";
/// Client-side alias of the current match channel.
pub const MULTIPLAYER_ALIAS: &str = "#multiplayer";
/// Client-side alias of the current spectator channel.
pub const SPECTATOR_ALIAS: &str = "#spectator";

pub fn match_channel_name(match_id: u16) -> String {
    format!("#mp_{match_id}")
}

pub fn spectator_channel_name(host_session_id: Uuid) -> String {
    format!("#spec_{host_session_id}")
}

/// Name the client knows a channel by. Match and spectator channels appear
/// under their aliases.
pub fn client_channel_name(name: &str) -> &str {
    if name.starts_with("#mp_") {
        MULTIPLAYER_ALIAS
    } else if name.starts_with("#spec_") {
        SPECTATOR_ALIAS
    } else {
        name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub channel_id: i64,
    pub name: String,
    pub topic: String,
    pub read_privileges: Privileges,
    pub write_privileges: Privileges,
    pub auto_join: bool,
    /// Created on demand for a match or spectator group.
    pub temporary: bool,
    pub created_at: DateTime<Utc>,
}

impl Channel {
    pub fn can_read(&self, privileges: Privileges) -> bool {
        privileges.satisfies(self.read_privileges)
    }

    pub fn can_write(&self, privileges: Privileges) -> bool {
        privileges.satisfies(self.write_privileges)
    }
}

#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub topic: String,
    pub read_privileges: Privileges,
    pub write_privileges: Privileges,
    pub auto_join: bool,
    pub temporary: bool,
}

#[derive(Clone)]
pub struct ChannelRegistry {
    storage: Arc<dyn Storage>,
}

impl ChannelRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Create a channel. Fails if the name is already taken.
    pub async fn create(&self, new: NewChannel) -> Result<Channel, AppError> {
        let name_key = keys::channel_name(&new.name);
        if self.storage.exists(&name_key).await? {
            return Err(AppError::Storage(format!("channel {} already exists", new.name)));
        }

        let channel = Channel {
            channel_id: self.storage.incr(&keys::id_counter("channels")).await?,
            name: new.name,
            topic: new.topic,
            read_privileges: new.read_privileges,
            write_privileges: new.write_privileges,
            auto_join: new.auto_join,
            temporary: new.temporary,
            created_at: Utc::now(),
        };

        write_json(
            self.storage.as_ref(),
            &keys::channel(channel.channel_id),
            &channel,
            None,
        )
        .await?;
        self.storage
            .set(&name_key, channel.channel_id.to_string().into_bytes(), None)
            .await?;

        Ok(channel)
    }

    pub async fn fetch_by_id(&self, channel_id: i64) -> Result<Option<Channel>, AppError> {
        read_json(self.storage.as_ref(), &keys::channel(channel_id)).await
    }

    pub async fn fetch_by_name(&self, name: &str) -> Result<Option<Channel>, AppError> {
        let Some(raw) = self.storage.get(&keys::channel_name(name)).await? else {
            return Ok(None);
        };

        let channel_id = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| i64::from_str(s).ok())
            .ok_or_else(|| AppError::Storage(format!("corrupt channel index for {name}")))?;

        self.fetch_by_id(channel_id).await
    }

    /// Every channel, optionally only those readable with `privileges`.
    pub async fn fetch_many(&self, privileges: Option<Privileges>) -> Result<Vec<Channel>, AppError> {
        let channel_keys: Vec<String> =
            self.storage.scan(keys::CHANNELS_PATTERN).try_collect().await?;

        let mut channels = Vec::with_capacity(channel_keys.len());
        for key in channel_keys {
            let Some(channel) = read_json::<Channel>(self.storage.as_ref(), &key).await? else {
                continue;
            };
            if privileges.map_or(true, |p| channel.can_read(p)) {
                channels.push(channel);
            }
        }

        channels.sort_by_key(|c| c.channel_id);
        Ok(channels)
    }

    /// Delete a channel together with its name index and membership.
    pub async fn delete(&self, channel_id: i64) -> Result<bool, AppError> {
        let Some(channel) = self.fetch_by_id(channel_id).await? else {
            return Ok(false);
        };

        self.storage.delete(&keys::channel_members(channel_id)).await?;
        self.storage.delete(&keys::channel_name(&channel.name)).await?;
        self.storage.delete(&keys::channel(channel_id)).await
    }

    /// Add a member. Returns whether the session was not already a member.
    pub async fn add_member(&self, channel_id: i64, session_id: Uuid) -> Result<bool, AppError> {
        self.storage
            .set_add(&keys::channel_members(channel_id), &session_id.to_string())
            .await
    }

    pub async fn remove_member(&self, channel_id: i64, session_id: Uuid) -> Result<bool, AppError> {
        self.storage
            .set_remove(&keys::channel_members(channel_id), &session_id.to_string())
            .await
    }

    pub async fn members(&self, channel_id: i64) -> Result<Vec<Uuid>, AppError> {
        let raw = self
            .storage
            .set_members(&keys::channel_members(channel_id))
            .await?;

        Ok(raw
            .iter()
            .filter_map(|member| match Uuid::parse_str(member) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(channel_id, member = %member, "ignoring malformed channel member");
                    None
                },
            })
            .collect())
    }

    pub async fn is_member(&self, channel_id: i64, session_id: Uuid) -> Result<bool, AppError> {
        Ok(self.members(channel_id).await?.contains(&session_id))
    }

    pub async fn member_count(&self, channel_id: i64) -> Result<usize, AppError> {
        self.storage.set_len(&keys::channel_members(channel_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(Arc::new(MemoryStorage::new()))
    }

    fn channel(name: &str, read: Privileges) -> NewChannel {
        NewChannel {
            name: name.to_string(),
            topic: String::new(),
            read_privileges: read,
            write_privileges: Privileges::empty(),
            auto_join: false,
            temporary: false,
        }
    }

    #[tokio::test]
    async fn test_create_and_fetch_by_name() {
        let registry = registry();
        let created = registry.create(channel("#osu", Privileges::empty())).await.unwrap();

        let fetched = registry.fetch_by_name("#osu").await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(registry.fetch_by_name("#nope").await.unwrap().is_none());
        assert!(registry.create(channel("#osu", Privileges::empty())).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_many_filters_unreadable() {
        let registry = registry();
        registry.create(channel("#osu", Privileges::empty())).await.unwrap();
        registry.create(channel("#staff", Privileges::STAFF)).await.unwrap();

        let all = registry.fetch_many(None).await.unwrap();
        assert_eq!(all.len(), 2);

        let visible = registry
            .fetch_many(Some(Privileges::UNRESTRICTED))
            .await
            .unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "#osu");
    }

    #[tokio::test]
    async fn test_membership() {
        let registry = registry();
        let osu = registry.create(channel("#osu", Privileges::empty())).await.unwrap();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(registry.add_member(osu.channel_id, a).await.unwrap());
        assert!(!registry.add_member(osu.channel_id, a).await.unwrap());
        registry.add_member(osu.channel_id, b).await.unwrap();
        assert_eq!(registry.member_count(osu.channel_id).await.unwrap(), 2);

        assert!(registry.remove_member(osu.channel_id, a).await.unwrap());
        assert_eq!(registry.members(osu.channel_id).await.unwrap(), vec![b]);
        assert!(registry.is_member(osu.channel_id, b).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_removes_index_and_members() {
        let registry = registry();
        let temp = registry.create(channel("#mp_1", Privileges::empty())).await.unwrap();
        registry.add_member(temp.channel_id, Uuid::new_v4()).await.unwrap();

        assert!(registry.delete(temp.channel_id).await.unwrap());
        assert!(registry.fetch_by_name("#mp_1").await.unwrap().is_none());
        assert_eq!(registry.member_count(temp.channel_id).await.unwrap(), 0);
        assert!(!registry.delete(temp.channel_id).await.unwrap());

        // The name can be reused
        assert!(registry.create(channel("#mp_1", Privileges::empty())).await.is_ok());
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(match_channel_name(12), "#mp_12");
        let host = Uuid::nil();
        assert_eq!(
            spectator_channel_name(host),
            "#spec_00000000-0000-0000-0000-000000000000"
        );

        assert_eq!(client_channel_name("#mp_12"), MULTIPLAYER_ALIAS);
        assert_eq!(client_channel_name(&spectator_channel_name(host)), SPECTATOR_ALIAS);
        assert_eq!(client_channel_name("#osu"), "#osu");
    }
}

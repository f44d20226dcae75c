// ============================
// crates/backend-lib/src/sessions.rs
// ============================
//! Session records and their store.
//!
//! A session is created at login, extended by every poll and deleted on
//! logout or expiry. A missing key always means the session has ended.
use std::sync::Arc;
use std::time::Duration;

use bancho_common::{Action, GameMode, Mods};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::accounts::safe_name;
use crate::error::AppError;
use crate::metrics::{SESSIONS_CREATED, SESSIONS_DELETED};
use crate::privileges::Privileges;
use crate::storage::{keys, read_json, write_json, Storage};

/// One connected client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: Uuid,
    pub account_id: i32,
    pub username: String,
    pub privileges: Privileges,

    pub action: Action,
    pub info_text: String,
    pub beatmap_md5: String,
    pub beatmap_id: i32,
    pub mods: Mods,
    /// Base ruleset; see [`Session::computed_mode`] for the leaderboard mode.
    pub game_mode: GameMode,

    pub country: String,
    pub country_code: u8,
    pub latitude: f32,
    pub longitude: f32,
    pub utc_offset: i8,

    pub spectator_host_session_id: Option<Uuid>,
    pub away_message: Option<String>,
    pub multiplayer_match_id: Option<u16>,
    pub receive_match_updates: bool,
    pub block_non_friend_dms: bool,
    /// The canonical session of the account. Set at creation, never changed.
    pub primary: bool,

    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Mode id including relax/autopilot leaderboards.
    pub fn computed_mode(&self) -> u8 {
        self.game_mode.with_modifier(self.mods)
    }

    pub fn is_tournament_client(&self) -> bool {
        !self.primary
    }
}

/// Fields supplied when a session is created.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub account_id: i32,
    pub username: String,
    pub privileges: Privileges,
    pub country: String,
    pub country_code: u8,
    pub latitude: f32,
    pub longitude: f32,
    pub utc_offset: i8,
    pub block_non_friend_dms: bool,
    pub primary: bool,
}

/// Partial update of a session. `None` leaves a field unchanged; nullable
/// fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub action: Option<Action>,
    pub info_text: Option<String>,
    pub beatmap_md5: Option<String>,
    pub beatmap_id: Option<i32>,
    pub mods: Option<Mods>,
    pub game_mode: Option<GameMode>,
    pub spectator_host_session_id: Option<Option<Uuid>>,
    pub away_message: Option<Option<String>>,
    pub multiplayer_match_id: Option<Option<u16>>,
    pub receive_match_updates: Option<bool>,
    pub block_non_friend_dms: Option<bool>,
    pub last_seen_at: Option<DateTime<Utc>>,
    /// New expiry; the backing TTL is reset to match.
    pub expires_at: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    fn apply(self, session: &mut Session) {
        if let Some(action) = self.action {
            session.action = action;
        }
        if let Some(info_text) = self.info_text {
            session.info_text = info_text;
        }
        if let Some(beatmap_md5) = self.beatmap_md5 {
            session.beatmap_md5 = beatmap_md5;
        }
        if let Some(beatmap_id) = self.beatmap_id {
            session.beatmap_id = beatmap_id;
        }
        if let Some(mods) = self.mods {
            session.mods = mods;
        }
        if let Some(game_mode) = self.game_mode {
            session.game_mode = game_mode;
        }
        if let Some(host) = self.spectator_host_session_id {
            session.spectator_host_session_id = host;
        }
        if let Some(away_message) = self.away_message {
            session.away_message = away_message;
        }
        if let Some(match_id) = self.multiplayer_match_id {
            session.multiplayer_match_id = match_id;
        }
        if let Some(receive) = self.receive_match_updates {
            session.receive_match_updates = receive;
        }
        if let Some(block) = self.block_non_friend_dms {
            session.block_non_friend_dms = block;
        }
        if let Some(last_seen_at) = self.last_seen_at {
            session.last_seen_at = last_seen_at;
        }
        if let Some(expires_at) = self.expires_at {
            session.expires_at = expires_at;
        }
    }
}

/// Store of [`Session`] records.
#[derive(Clone)]
pub struct SessionStore {
    storage: Arc<dyn Storage>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn Storage>, ttl: Duration) -> Self {
        Self { storage, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expiry of a session refreshed now.
    pub fn next_expiry(&self) -> DateTime<Utc> {
        Utc::now() + chrono::Duration::seconds(self.ttl.as_secs() as i64)
    }

    pub async fn create(&self, new: NewSession) -> Result<Session, AppError> {
        let now = Utc::now();
        let session = Session {
            session_id: Uuid::new_v4(),
            account_id: new.account_id,
            username: new.username,
            privileges: new.privileges,
            action: Action::Idle,
            info_text: String::new(),
            beatmap_md5: String::new(),
            beatmap_id: 0,
            mods: Mods::empty(),
            game_mode: GameMode::Standard,
            country: new.country,
            country_code: new.country_code,
            latitude: new.latitude,
            longitude: new.longitude,
            utc_offset: new.utc_offset,
            spectator_host_session_id: None,
            away_message: None,
            multiplayer_match_id: None,
            receive_match_updates: false,
            block_non_friend_dms: new.block_non_friend_dms,
            primary: new.primary,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
            expires_at: self.next_expiry(),
        };

        write_json(
            self.storage.as_ref(),
            &keys::session(session.session_id),
            &session,
            Some(self.ttl),
        )
        .await?;

        counter!(SESSIONS_CREATED).increment(1);
        debug!(session_id = %session.session_id, account_id = session.account_id, "session created");
        Ok(session)
    }

    pub async fn fetch_by_id(&self, session_id: Uuid) -> Result<Option<Session>, AppError> {
        read_json(self.storage.as_ref(), &keys::session(session_id)).await
    }

    /// Every live session, optionally only those holding any of `privileges`.
    pub async fn fetch_all(&self, privileges: Option<Privileges>) -> Result<Vec<Session>, AppError> {
        let session_keys: Vec<String> =
            self.storage.scan(keys::SESSIONS_PATTERN).try_collect().await?;

        let mut sessions = Vec::with_capacity(session_keys.len());
        for key in session_keys {
            // Expired between scan and read
            let Some(session) = read_json::<Session>(self.storage.as_ref(), &key).await? else {
                continue;
            };
            if privileges.map_or(true, |p| session.privileges.intersects(p)) {
                sessions.push(session);
            }
        }

        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    pub async fn fetch_primary_by_account_id(
        &self,
        account_id: i32,
    ) -> Result<Option<Session>, AppError> {
        Ok(self
            .fetch_all(None)
            .await?
            .into_iter()
            .find(|s| s.primary && s.account_id == account_id))
    }

    pub async fn fetch_primary_by_username(
        &self,
        username: &str,
    ) -> Result<Option<Session>, AppError> {
        let wanted = safe_name(username);
        Ok(self
            .fetch_all(None)
            .await?
            .into_iter()
            .find(|s| s.primary && safe_name(&s.username) == wanted))
    }

    /// Read-modify-write. Returns `None` if the session no longer exists.
    pub async fn partial_update(
        &self,
        session_id: Uuid,
        update: SessionUpdate,
    ) -> Result<Option<Session>, AppError> {
        let key = keys::session(session_id);
        let Some(mut session) = read_json::<Session>(self.storage.as_ref(), &key).await? else {
            return Ok(None);
        };

        update.apply(&mut session);
        let now = Utc::now();
        session.updated_at = now;

        // Keep the backing TTL in step with `expires_at`
        let remaining = (session.expires_at - now).to_std().unwrap_or(Duration::ZERO);
        write_json(self.storage.as_ref(), &key, &session, Some(remaining)).await?;

        Ok(Some(session))
    }

    pub async fn delete_by_id(&self, session_id: Uuid) -> Result<bool, AppError> {
        let deleted = self.storage.delete(&keys::session(session_id)).await?;
        if deleted {
            counter!(SESSIONS_DELETED).increment(1);
        }
        Ok(deleted)
    }
}

// ============================
// crates/backend-lib/src/matches/mod.rs
// ============================
//! Multiplayer match records.
//!
//! A match always owns exactly [`MATCH_SLOT_COUNT`] slots. They are created
//! with the match and deleted with it.
use std::sync::Arc;

use bancho_common::{
    GameMode, MatchDescriptor, MatchTeamType, MatchWinCondition, Mods, SlotStatus, SlotTeam,
    MATCH_SLOT_COUNT,
};
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::AppError;
use crate::storage::{keys, read_json, write_json, Storage};

mod slots;

pub use slots::{Slot, SlotUpdate};

/// Whether a match is between maps or mid-play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    #[default]
    Waiting,
    Playing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub match_id: u16,
    pub name: String,
    /// Empty means no password.
    pub password: String,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub host_account_id: i32,
    pub mode: GameMode,
    pub mods: Mods,
    pub win_condition: MatchWinCondition,
    pub team_type: MatchTeamType,
    pub freemods: bool,
    pub random_seed: i32,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Match {
    pub fn is_host(&self, account_id: i32) -> bool {
        self.host_account_id == account_id
    }

    pub fn in_progress(&self) -> bool {
        self.status == MatchStatus::Playing
    }

    /// Wire form of the match. `slots` must be the match's slots in id order.
    pub fn descriptor(&self, slots: &[Slot]) -> MatchDescriptor {
        let mut slot_statuses = [SlotStatus::OPEN; MATCH_SLOT_COUNT];
        let mut slot_teams = [SlotTeam::Neutral; MATCH_SLOT_COUNT];
        let mut slot_mods = [Mods::empty(); MATCH_SLOT_COUNT];
        let mut slot_account_ids = Vec::new();

        for slot in slots.iter().take(MATCH_SLOT_COUNT) {
            let index = usize::from(slot.slot_id);
            slot_statuses[index] = slot.status;
            slot_teams[index] = slot.team;
            slot_mods[index] = slot.mods;
        }

        // Account ids only for slots the client will read one for
        for (index, status) in slot_statuses.iter().enumerate() {
            if status.has_player() {
                let account_id = slots
                    .iter()
                    .find(|s| usize::from(s.slot_id) == index)
                    .and_then(|s| s.account_id)
                    .unwrap_or(-1);
                slot_account_ids.push(account_id);
            }
        }

        MatchDescriptor {
            id: self.match_id,
            in_progress: self.in_progress(),
            powerplay: 0,
            mods: self.mods,
            name: self.name.clone(),
            password: self.password.clone(),
            beatmap_name: self.beatmap_name.clone(),
            beatmap_id: self.beatmap_id,
            beatmap_md5: self.beatmap_md5.clone(),
            slot_statuses,
            slot_teams,
            slot_account_ids,
            host_account_id: self.host_account_id,
            mode: self.mode,
            win_condition: self.win_condition,
            team_type: self.team_type,
            freemods: self.freemods,
            slot_mods: self.freemods.then_some(slot_mods),
            seed: self.random_seed,
        }
    }
}

/// Fields supplied when a match is created.
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub name: String,
    pub password: String,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub host_account_id: i32,
    pub mode: GameMode,
    pub mods: Mods,
    pub win_condition: MatchWinCondition,
    pub team_type: MatchTeamType,
    pub freemods: bool,
    pub random_seed: i32,
}

impl NewMatch {
    /// Settings requested by a client's create packet.
    pub fn from_descriptor(descriptor: &MatchDescriptor, host_account_id: i32) -> Self {
        Self {
            name: descriptor.name.clone(),
            password: descriptor.password.clone(),
            beatmap_name: descriptor.beatmap_name.clone(),
            beatmap_id: descriptor.beatmap_id,
            beatmap_md5: descriptor.beatmap_md5.clone(),
            host_account_id,
            mode: descriptor.mode,
            mods: descriptor.mods,
            win_condition: descriptor.win_condition,
            team_type: descriptor.team_type,
            freemods: descriptor.freemods,
            random_seed: descriptor.seed,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MatchUpdate {
    pub name: Option<String>,
    pub password: Option<String>,
    pub beatmap_name: Option<String>,
    pub beatmap_id: Option<i32>,
    pub beatmap_md5: Option<String>,
    pub host_account_id: Option<i32>,
    pub mode: Option<GameMode>,
    pub mods: Option<Mods>,
    pub win_condition: Option<MatchWinCondition>,
    pub team_type: Option<MatchTeamType>,
    pub freemods: Option<bool>,
    pub random_seed: Option<i32>,
    pub status: Option<MatchStatus>,
}

impl MatchUpdate {
    fn apply(self, m: &mut Match) {
        if let Some(name) = self.name {
            m.name = name;
        }
        if let Some(password) = self.password {
            m.password = password;
        }
        if let Some(beatmap_name) = self.beatmap_name {
            m.beatmap_name = beatmap_name;
        }
        if let Some(beatmap_id) = self.beatmap_id {
            m.beatmap_id = beatmap_id;
        }
        if let Some(beatmap_md5) = self.beatmap_md5 {
            m.beatmap_md5 = beatmap_md5;
        }
        if let Some(host) = self.host_account_id {
            m.host_account_id = host;
        }
        if let Some(mode) = self.mode {
            m.mode = mode;
        }
        if let Some(mods) = self.mods {
            m.mods = mods;
        }
        if let Some(win_condition) = self.win_condition {
            m.win_condition = win_condition;
        }
        if let Some(team_type) = self.team_type {
            m.team_type = team_type;
        }
        if let Some(freemods) = self.freemods {
            m.freemods = freemods;
        }
        if let Some(seed) = self.random_seed {
            m.random_seed = seed;
        }
        if let Some(status) = self.status {
            m.status = status;
        }
    }
}

/// Store of matches and their slots.
#[derive(Clone)]
pub struct MatchRegistry {
    storage: Arc<dyn Storage>,
}

impl MatchRegistry {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Next free match id. Ids wrap inside `1..=u16::MAX`.
    async fn allocate_id(&self) -> Result<u16, AppError> {
        for _ in 0..u16::MAX {
            let n = self.storage.incr(&keys::id_counter("matches")).await?;
            let id = ((n - 1).rem_euclid(i64::from(u16::MAX)) + 1) as u16;
            if !self.storage.exists(&keys::multiplayer_match(id)).await? {
                return Ok(id);
            }
        }
        Err(AppError::Storage("no free match id".to_string()))
    }

    /// Persist a match and its slots. Either everything is written or nothing is.
    pub async fn create(&self, new: NewMatch) -> Result<Match, AppError> {
        let now = Utc::now();
        let m = Match {
            match_id: self.allocate_id().await?,
            name: new.name,
            password: new.password,
            beatmap_name: new.beatmap_name,
            beatmap_id: new.beatmap_id,
            beatmap_md5: new.beatmap_md5,
            host_account_id: new.host_account_id,
            mode: new.mode,
            mods: new.mods,
            win_condition: new.win_condition,
            team_type: new.team_type,
            freemods: new.freemods,
            random_seed: new.random_seed,
            status: MatchStatus::Waiting,
            created_at: now,
            updated_at: now,
        };

        if let Err(e) = self.write_new(&m).await {
            error!(match_id = m.match_id, error = %e, "match creation failed, rolling back");
            if let Err(cleanup) = self.delete(m.match_id).await {
                warn!(match_id = m.match_id, error = %cleanup, "rollback left keys behind");
            }
            return Err(e);
        }

        Ok(m)
    }

    async fn write_new(&self, m: &Match) -> Result<(), AppError> {
        // Slots first so a visible match always has all of them
        for slot_id in 0..MATCH_SLOT_COUNT as u8 {
            let slot = Slot::empty(m.match_id, slot_id);
            write_json(
                self.storage.as_ref(),
                &keys::slot(m.match_id, slot_id),
                &slot,
                None,
            )
            .await?;
        }
        write_json(
            self.storage.as_ref(),
            &keys::multiplayer_match(m.match_id),
            m,
            None,
        )
        .await
    }

    pub async fn fetch_one(&self, match_id: u16) -> Result<Option<Match>, AppError> {
        read_json(self.storage.as_ref(), &keys::multiplayer_match(match_id)).await
    }

    /// Every match, by id.
    pub async fn fetch_all(&self) -> Result<Vec<Match>, AppError> {
        let match_keys: Vec<String> =
            self.storage.scan(keys::MATCHES_PATTERN).try_collect().await?;

        let mut matches = Vec::new();
        for key in match_keys {
            // Slot keys share the prefix
            let is_match_key = key
                .rsplit(':')
                .next()
                .is_some_and(|id| id.parse::<u16>().is_ok())
                && !key.contains(":slots:");
            if !is_match_key {
                continue;
            }
            if let Some(m) = read_json::<Match>(self.storage.as_ref(), &key).await? {
                matches.push(m);
            }
        }

        matches.sort_by_key(|m| m.match_id);
        Ok(matches)
    }

    pub async fn partial_update(
        &self,
        match_id: u16,
        update: MatchUpdate,
    ) -> Result<Option<Match>, AppError> {
        let key = keys::multiplayer_match(match_id);
        let Some(mut m) = read_json::<Match>(self.storage.as_ref(), &key).await? else {
            return Ok(None);
        };

        update.apply(&mut m);
        m.updated_at = Utc::now();
        write_json(self.storage.as_ref(), &key, &m, None).await?;
        Ok(Some(m))
    }

    /// Delete a match and all of its slots.
    pub async fn delete(&self, match_id: u16) -> Result<bool, AppError> {
        let existed = self
            .storage
            .delete(&keys::multiplayer_match(match_id))
            .await?;
        for slot_id in 0..MATCH_SLOT_COUNT as u8 {
            self.storage.delete(&keys::slot(match_id, slot_id)).await?;
        }
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    pub(super) fn new_match(host: i32) -> NewMatch {
        NewMatch {
            name: "test".to_string(),
            password: String::new(),
            beatmap_name: "X".to_string(),
            beatmap_id: 1,
            beatmap_md5: "md5".to_string(),
            host_account_id: host,
            mode: GameMode::Standard,
            mods: Mods::empty(),
            win_condition: MatchWinCondition::Score,
            team_type: MatchTeamType::HeadToHead,
            freemods: false,
            random_seed: 7,
        }
    }

    #[tokio::test]
    async fn test_create_allocates_sixteen_open_slots() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = MatchRegistry::new(storage.clone());

        let m = registry.create(new_match(1000)).await.unwrap();
        assert_eq!(m.match_id, 1);
        assert_eq!(m.status, MatchStatus::Waiting);

        let slots = registry.fetch_slots(m.match_id).await.unwrap();
        assert_eq!(slots.len(), MATCH_SLOT_COUNT);
        for (index, slot) in slots.iter().enumerate() {
            assert_eq!(usize::from(slot.slot_id), index);
            assert_eq!(slot.status, SlotStatus::OPEN);
            assert_eq!(slot.team, SlotTeam::Neutral);
            assert!(slot.account_id.is_none());
        }

        let second = registry.create(new_match(1001)).await.unwrap();
        assert_eq!(second.match_id, 2);
        assert_eq!(registry.fetch_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_slots() {
        let storage = Arc::new(MemoryStorage::new());
        let registry = MatchRegistry::new(storage.clone());
        let m = registry.create(new_match(1000)).await.unwrap();

        assert!(registry.delete(m.match_id).await.unwrap());
        assert!(registry.fetch_one(m.match_id).await.unwrap().is_none());
        assert!(registry.fetch_slots(m.match_id).await.unwrap().is_empty());
        // Only the id counter remains
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_partial_update() {
        let registry = MatchRegistry::new(Arc::new(MemoryStorage::new()));
        let m = registry.create(new_match(1000)).await.unwrap();

        let updated = registry
            .partial_update(
                m.match_id,
                MatchUpdate {
                    host_account_id: Some(1001),
                    status: Some(MatchStatus::Playing),
                    ..MatchUpdate::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.host_account_id, 1001);
        assert!(updated.in_progress());
        assert_eq!(updated.name, "test");

        assert!(registry
            .partial_update(999, MatchUpdate::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_descriptor_lists_occupied_slots_in_order() {
        let registry = MatchRegistry::new(Arc::new(MemoryStorage::new()));
        let m = registry.create(new_match(1000)).await.unwrap();
        let mut slots = registry.fetch_slots(m.match_id).await.unwrap();

        slots[3].account_id = Some(1001);
        slots[3].status = SlotStatus::READY;
        slots[0].account_id = Some(1000);
        slots[0].status = SlotStatus::NOT_READY;
        slots[5].status = SlotStatus::LOCKED;

        let descriptor = m.descriptor(&slots);
        assert_eq!(descriptor.slot_account_ids, vec![1000, 1001]);
        assert_eq!(descriptor.slot_statuses[5], SlotStatus::LOCKED);
        assert!(descriptor.slot_mods.is_none());
    }
}

// ============================
// crates/backend-lib/src/matches/slots.rs
// ============================
//! The sixteen player positions of a match.
use bancho_common::{Mods, SlotStatus, SlotTeam, MATCH_SLOT_COUNT};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MatchRegistry;
use crate::error::AppError;
use crate::storage::{keys, read_json, write_json};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub match_id: u16,
    pub slot_id: u8,
    /// Occupying account, `None` when empty.
    pub account_id: Option<i32>,
    /// Occupying session, `None` when empty.
    pub session_id: Option<Uuid>,
    pub status: SlotStatus,
    pub team: SlotTeam,
    /// Only meaningful while the match has freemods on.
    pub mods: Mods,
    pub loaded: bool,
    pub skipped: bool,
}

impl Slot {
    pub fn empty(match_id: u16, slot_id: u8) -> Self {
        Self {
            match_id,
            slot_id,
            account_id: None,
            session_id: None,
            status: SlotStatus::OPEN,
            team: SlotTeam::Neutral,
            mods: Mods::empty(),
            loaded: false,
            skipped: false,
        }
    }

    pub fn has_player(&self) -> bool {
        self.status.has_player()
    }

    pub fn is_occupied(&self) -> bool {
        self.account_id.is_some()
    }

    pub fn is_claimable(&self) -> bool {
        self.status == SlotStatus::OPEN && !self.is_occupied()
    }

    pub fn is_playing(&self) -> bool {
        self.status == SlotStatus::PLAYING
    }
}

/// Partial update of a slot. Occupant fields use `Some(None)` to clear.
#[derive(Debug, Clone, Default)]
pub struct SlotUpdate {
    pub account_id: Option<Option<i32>>,
    pub session_id: Option<Option<Uuid>>,
    pub status: Option<SlotStatus>,
    pub team: Option<SlotTeam>,
    pub mods: Option<Mods>,
    pub loaded: Option<bool>,
    pub skipped: Option<bool>,
}

impl SlotUpdate {
    /// Back to OPEN, neutral, no mods, unloaded, unskipped, no occupant.
    pub fn reset() -> Self {
        Self {
            account_id: Some(None),
            session_id: Some(None),
            status: Some(SlotStatus::OPEN),
            team: Some(SlotTeam::Neutral),
            mods: Some(Mods::empty()),
            loaded: Some(false),
            skipped: Some(false),
        }
    }

    /// Seat a player with a fresh not-ready status.
    pub fn occupy(account_id: i32, session_id: Uuid, team: SlotTeam) -> Self {
        Self {
            account_id: Some(Some(account_id)),
            session_id: Some(Some(session_id)),
            status: Some(SlotStatus::NOT_READY),
            team: Some(team),
            mods: Some(Mods::empty()),
            loaded: Some(false),
            skipped: Some(false),
        }
    }

    pub fn status(status: SlotStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    fn apply(self, slot: &mut Slot) {
        if let Some(account_id) = self.account_id {
            slot.account_id = account_id;
        }
        if let Some(session_id) = self.session_id {
            slot.session_id = session_id;
        }
        if let Some(status) = self.status {
            slot.status = status;
        }
        if let Some(team) = self.team {
            slot.team = team;
        }
        if let Some(mods) = self.mods {
            slot.mods = mods;
        }
        if let Some(loaded) = self.loaded {
            slot.loaded = loaded;
        }
        if let Some(skipped) = self.skipped {
            slot.skipped = skipped;
        }
    }
}

impl MatchRegistry {
    pub async fn fetch_slot(&self, match_id: u16, slot_id: u8) -> Result<Option<Slot>, AppError> {
        if usize::from(slot_id) >= MATCH_SLOT_COUNT {
            return Ok(None);
        }
        read_json(self.storage.as_ref(), &keys::slot(match_id, slot_id)).await
    }

    /// All slots of a match, sorted by slot id. Empty if the match is gone.
    pub async fn fetch_slots(&self, match_id: u16) -> Result<Vec<Slot>, AppError> {
        let mut slots = Vec::with_capacity(MATCH_SLOT_COUNT);
        for slot_id in 0..MATCH_SLOT_COUNT as u8 {
            if let Some(slot) = self.fetch_slot(match_id, slot_id).await? {
                slots.push(slot);
            }
        }
        Ok(slots)
    }

    pub async fn fetch_slot_by_session(
        &self,
        match_id: u16,
        session_id: Uuid,
    ) -> Result<Option<Slot>, AppError> {
        Ok(self
            .fetch_slots(match_id)
            .await?
            .into_iter()
            .find(|s| s.session_id == Some(session_id)))
    }

    pub async fn fetch_slot_by_account(
        &self,
        match_id: u16,
        account_id: i32,
    ) -> Result<Option<Slot>, AppError> {
        Ok(self
            .fetch_slots(match_id)
            .await?
            .into_iter()
            .find(|s| s.account_id == Some(account_id)))
    }

    pub async fn update_slot(
        &self,
        match_id: u16,
        slot_id: u8,
        update: SlotUpdate,
    ) -> Result<Option<Slot>, AppError> {
        let Some(mut slot) = self.fetch_slot(match_id, slot_id).await? else {
            return Ok(None);
        };

        update.apply(&mut slot);
        write_json(
            self.storage.as_ref(),
            &keys::slot(match_id, slot_id),
            &slot,
            None,
        )
        .await?;
        Ok(Some(slot))
    }

    /// First open, unoccupied slot. Callers hold the match lock until they
    /// have written their claim.
    pub async fn claim_slot_id(&self, match_id: u16) -> Result<Option<u8>, AppError> {
        Ok(self
            .fetch_slots(match_id)
            .await?
            .into_iter()
            .find(Slot::is_claimable)
            .map(|s| s.slot_id))
    }
}

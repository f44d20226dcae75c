// ============================
// crates/backend-lib/src/spectators.rs
// ============================
//! Host to spectators relation.
//!
//! Only the host side is stored here. Each spectator's session carries its
//! host id, and the spectator handlers update both sides together.
use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::storage::{keys, Storage};

#[derive(Clone)]
pub struct SpectatorGraph {
    storage: Arc<dyn Storage>,
}

impl SpectatorGraph {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn add(&self, host_session_id: Uuid, spectator_session_id: Uuid) -> Result<bool, AppError> {
        self.storage
            .set_add(
                &keys::spectators(host_session_id),
                &spectator_session_id.to_string(),
            )
            .await
    }

    pub async fn remove(
        &self,
        host_session_id: Uuid,
        spectator_session_id: Uuid,
    ) -> Result<bool, AppError> {
        self.storage
            .set_remove(
                &keys::spectators(host_session_id),
                &spectator_session_id.to_string(),
            )
            .await
    }

    pub async fn members(&self, host_session_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let raw = self
            .storage
            .set_members(&keys::spectators(host_session_id))
            .await?;

        Ok(raw
            .iter()
            .filter_map(|member| match Uuid::parse_str(member) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(host_session_id = %host_session_id, member = %member, "ignoring malformed spectator");
                    None
                },
            })
            .collect())
    }

    pub async fn clear(&self, host_session_id: Uuid) -> Result<(), AppError> {
        self.storage.delete(&keys::spectators(host_session_id)).await?;
        Ok(())
    }
}

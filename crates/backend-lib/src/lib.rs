// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core of the Bancho server: sessions, chat, spectating and multiplayer
//! over the osu! HTTP polling protocol.

pub mod accounts;
pub mod auth;
pub mod channels;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod matches;
pub mod metrics;
pub mod multiplayer;
pub mod outbox;
pub mod presence;
pub mod privileges;
pub mod router;
pub mod sessions;
pub mod spectators;
pub mod storage;

use std::sync::Arc;

use tracing::info;

use crate::accounts::{AccountRepository, StatsRepository};
use crate::auth::AuthService;
use crate::channels::{ChannelRegistry, NewChannel};
use crate::config::Settings;
use crate::dispatch::PacketHandlers;
use crate::error::AppError;
use crate::matches::MatchRegistry;
use crate::outbox::PacketOutbox;
use crate::sessions::SessionStore;
use crate::spectators::SpectatorGraph;
use crate::storage::{LockManager, Storage};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub storage: Arc<dyn Storage>,
    pub locks: Arc<dyn LockManager>,
    pub sessions: SessionStore,
    pub outbox: PacketOutbox,
    pub channels: ChannelRegistry,
    pub spectators: SpectatorGraph,
    pub matches: MatchRegistry,
    pub accounts: Arc<dyn AccountRepository>,
    pub stats: Arc<dyn StatsRepository>,
    pub auth: Arc<dyn AuthService>,
    pub handlers: Arc<PacketHandlers>,
}

impl AppState {
    /// Wire the stores over one storage backend.
    pub fn new(
        settings: Settings,
        storage: Arc<dyn Storage>,
        locks: Arc<dyn LockManager>,
        accounts: Arc<dyn AccountRepository>,
        stats: Arc<dyn StatsRepository>,
        auth: Arc<dyn AuthService>,
    ) -> Self {
        let ttl = settings.session_ttl();

        Self {
            sessions: SessionStore::new(storage.clone(), ttl),
            outbox: PacketOutbox::new(storage.clone(), settings.outbox.soft_limit, ttl),
            channels: ChannelRegistry::new(storage.clone()),
            spectators: SpectatorGraph::new(storage.clone()),
            matches: MatchRegistry::new(storage.clone()),
            settings: Arc::new(settings),
            storage,
            locks,
            accounts,
            stats,
            auth,
            handlers: Arc::new(PacketHandlers::standard()),
        }
    }

    /// Create the configured persistent channels that do not exist yet.
    pub async fn seed_channels(&self) -> Result<(), AppError> {
        for seed in &self.settings.channels {
            if self.channels.fetch_by_name(&seed.name).await?.is_some() {
                continue;
            }
            let channel = self
                .channels
                .create(NewChannel {
                    name: seed.name.clone(),
                    topic: seed.topic.clone(),
                    read_privileges: seed.read_privileges,
                    write_privileges: seed.write_privileges,
                    auto_join: seed.auto_join,
                    temporary: false,
                })
                .await?;
            info!(channel = %channel.name, channel_id = channel.channel_id, "channel seeded");
        }
        Ok(())
    }
}

// ============================
// crates/backend-lib/src/accounts.rs
// ============================
//! Account and statistics repositories.
//!
//! Accounts and scores live in a relational store owned by another service.
//! The core only reads them through these traits.
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::privileges::Privileges;

/// A registered player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: i32,
    pub username: String,
    pub privileges: Privileges,
    /// ISO 3166-1 alpha-2 code, e.g. `"ca"`.
    pub country: String,
    /// osu! numeric country code sent in presence packets.
    pub country_code: u8,
}

/// Per-mode statistics of an account.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct UserStatistics {
    pub ranked_score: i64,
    pub total_score: i64,
    /// Accuracy in percent, `0.0..=100.0`.
    pub accuracy: f32,
    pub play_count: i32,
    pub pp: i32,
    pub global_rank: i32,
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn fetch_by_id(&self, account_id: i32) -> Result<Option<Account>, AppError>;
    async fn fetch_by_username(&self, username: &str) -> Result<Option<Account>, AppError>;
}

#[async_trait]
pub trait StatsRepository: Send + Sync {
    /// Statistics for a modified mode id (vanilla 0-3, relax 4-6, autopilot 8).
    async fn fetch(&self, account_id: i32, game_mode: u8)
        -> Result<Option<UserStatistics>, AppError>;
}

/// Case-insensitive lookup key for usernames. Spaces and underscores are interchangeable.
pub fn safe_name(username: &str) -> String {
    username.trim().to_lowercase().replace(' ', "_")
}

/// Accounts and statistics held in memory, for tests and development.
#[derive(Debug, Default)]
pub struct MemoryAccounts {
    accounts: DashMap<i32, Account>,
    stats: DashMap<(i32, u8), UserStatistics>,
}

impl MemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.accounts.insert(account.account_id, account);
    }

    pub fn insert_stats(&self, account_id: i32, game_mode: u8, stats: UserStatistics) {
        self.stats.insert((account_id, game_mode), stats);
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn fetch_by_id(&self, account_id: i32) -> Result<Option<Account>, AppError> {
        Ok(self.accounts.get(&account_id).map(|a| a.clone()))
    }

    async fn fetch_by_username(&self, username: &str) -> Result<Option<Account>, AppError> {
        let wanted = safe_name(username);
        Ok(self
            .accounts
            .iter()
            .find(|a| safe_name(&a.username) == wanted)
            .map(|a| a.clone()))
    }
}

#[async_trait]
impl StatsRepository for MemoryAccounts {
    async fn fetch(
        &self,
        account_id: i32,
        game_mode: u8,
    ) -> Result<Option<UserStatistics>, AppError> {
        Ok(self.stats.get(&(account_id, game_mode)).map(|s| *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(id: i32, name: &str) -> Account {
        Account {
            account_id: id,
            username: name.to_string(),
            privileges: Privileges::UNRESTRICTED,
            country: "ca".to_string(),
            country_code: 38,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_name_ignores_case_and_spaces() {
        let accounts = MemoryAccounts::new();
        accounts.insert(account(3, "Cookie Zi"));

        let found = accounts.fetch_by_username("cookie_zi").await.unwrap();
        assert_eq!(found.map(|a| a.account_id), Some(3));
        assert!(accounts.fetch_by_username("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_are_per_mode() {
        let accounts = MemoryAccounts::new();
        let stats = UserStatistics {
            pp: 700,
            ..UserStatistics::default()
        };
        accounts.insert_stats(3, 4, stats);

        assert_eq!(accounts.fetch(3, 4).await.unwrap(), Some(stats));
        assert_eq!(accounts.fetch(3, 0).await.unwrap(), None);
    }
}

// ============================
// crates/backend-lib/src/auth/service.rs
// ============================
//! Credential verification.
use async_trait::async_trait;
use dashmap::DashMap;

use crate::accounts::Account;
use crate::error::AppError;

/// Checks a client's password against the account store.
///
/// The osu! client only ever sends the MD5 hex digest of the password.
/// How that digest is stored and compared is up to the implementation.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn verify_credentials(&self, account: &Account, password_md5: &str)
        -> Result<bool, AppError>;
}

/// Password digests held in memory, for tests and development.
#[derive(Debug, Default)]
pub struct MemoryAuth {
    digests: DashMap<i32, String>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_password(&self, account_id: i32, password_md5: impl Into<String>) {
        self.digests
            .insert(account_id, password_md5.into().to_ascii_lowercase());
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    async fn verify_credentials(
        &self,
        account: &Account,
        password_md5: &str,
    ) -> Result<bool, AppError> {
        Ok(self
            .digests
            .get(&account.account_id)
            .is_some_and(|stored| stored.eq_ignore_ascii_case(password_md5)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::privileges::Privileges;

    #[tokio::test]
    async fn test_verify_credentials() {
        let auth = MemoryAuth::new();
        let account = Account {
            account_id: 1000,
            username: "alice".to_string(),
            privileges: Privileges::UNRESTRICTED,
            country: "ca".to_string(),
            country_code: 38,
        };

        assert!(!auth.verify_credentials(&account, "abc").await.unwrap());
        auth.set_password(1000, "ABC123");
        assert!(auth.verify_credentials(&account, "abc123").await.unwrap());
        assert!(!auth.verify_credentials(&account, "wrong").await.unwrap());
    }
}

// ============================
// crates/backend-lib/src/auth/mod.rs
// ============================
//! Login and credential checks.

pub mod login;
mod service;

pub use login::{login, LoginOutcome, LoginRequest, FAILED_LOGIN_TOKEN};
pub use service::{AuthService, MemoryAuth};

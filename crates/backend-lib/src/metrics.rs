// ==============
// crates/backend-lib/src/metrics.rs

//! Central place for metric keys
pub const PACKETS_HANDLED: &str = "bancho.packets.handled";
pub const PACKETS_UNHANDLED: &str = "bancho.packets.unhandled";
pub const LOGINS: &str = "bancho.logins";
pub const LOGIN_FAILURES: &str = "bancho.logins.failed";
pub const SESSIONS_CREATED: &str = "bancho.sessions.created";
pub const SESSIONS_DELETED: &str = "bancho.sessions.deleted";
pub const OUTBOX_DEPTH: &str = "bancho.outbox.depth";
pub const OUTBOX_OVER_LIMIT: &str = "bancho.outbox.over_limit";
pub const MATCHES_CREATED: &str = "bancho.matches.created";
pub const MATCHES_DISPOSED: &str = "bancho.matches.disposed";
pub const CHAT_MESSAGES: &str = "bancho.chat.messages";

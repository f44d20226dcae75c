// ============================
// crates/backend-lib/src/handlers/mod.rs
// ============================
//! Client packet handlers.
//!
//! Every handler has the same shape, `(state, session, body)`, and is wired
//! to its packet id in [`crate::dispatch::PacketHandlers::standard`].

pub mod chat;
pub mod lobby;
pub mod multiplayer;
pub mod presence;
pub mod spectate;

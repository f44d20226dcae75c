// ================
// crates/common/src/lib.rs
// ================
//! Bancho wire protocol shared between the backend and its tests.
//!
//! This crate knows nothing about sessions or storage. It turns bytes into
//! typed osu! structures and back.

pub mod codec;
pub mod ids;
pub mod packet;
pub mod server;
pub mod types;
pub mod wire;

pub use codec::{Decode, DecodeError, Encode, PacketReader, PacketWriter};
pub use ids::{ClientPacketId, ServerPacketId};
pub use packet::{decode_stream, encode_packet, RawPacket, HEADER_LEN};
pub use types::{
    Action, ClientPrivileges, GameMode, MatchTeamType, MatchWinCondition, Mods, ReplayAction,
    SlotStatus, SlotTeam,
};
pub use wire::{
    ActionChange, ChannelInfo, ChatMessage, MatchDescriptor, ReplayFrame, ReplayFrameBundle,
    ScoreFrame, ScoreV2Portions, UserPresence, UserStats, MATCH_SLOT_COUNT,
};

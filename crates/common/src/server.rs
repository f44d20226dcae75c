// ================
// crates/common/src/server.rs
// ================
//! Builders for every packet the server sends.
//!
//! Each function returns one fully framed packet, ready to be appended to an
//! outbox.

use crate::codec::Encode;
use crate::ids::ServerPacketId;
use crate::packet::{build_packet, encode_packet, encode_value};
use crate::types::ClientPrivileges;
use crate::wire::{
    ChannelInfo, ChatMessage, MatchDescriptor, ReplayFrameBundle, ScoreFrame, UserPresence,
    UserStats,
};

/// Protocol version announced at login.
pub const PROTOCOL_VERSION: i32 = 19;

/// Login reply values that are not account ids.
pub mod login_reply {
    pub const AUTHENTICATION_FAILED: i32 = -1;
    pub const OLD_CLIENT: i32 = -2;
    pub const BANNED: i32 = -3;
    pub const ERROR: i32 = -5;
    pub const REQUIRES_VERIFICATION: i32 = -8;
}

pub fn user_id(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::UserId, |w| {
        w.write_i32(account_id);
    })
}

pub fn protocol_version(version: i32) -> Vec<u8> {
    build_packet(ServerPacketId::ProtocolVersion, |w| {
        w.write_i32(version);
    })
}

pub fn privileges(privileges: ClientPrivileges) -> Vec<u8> {
    build_packet(ServerPacketId::Privileges, |w| {
        w.write_i32(i32::from(privileges.bits()));
    })
}

pub fn pong() -> Vec<u8> {
    encode_packet(ServerPacketId::Pong, &[])
}

pub fn restart(delay_ms: i32) -> Vec<u8> {
    build_packet(ServerPacketId::Restart, |w| {
        w.write_i32(delay_ms);
    })
}

pub fn notification(text: &str) -> Vec<u8> {
    build_packet(ServerPacketId::Notification, |w| {
        w.write_string(text);
    })
}

pub fn send_message(message: &ChatMessage) -> Vec<u8> {
    encode_value(ServerPacketId::SendMessage, message)
}

pub fn user_dm_blocked(recipient: &str) -> Vec<u8> {
    let message = ChatMessage {
        recipient: recipient.to_string(),
        ..ChatMessage::default()
    };
    encode_value(ServerPacketId::UserDmBlocked, &message)
}

pub fn target_is_silenced(recipient: &str) -> Vec<u8> {
    let message = ChatMessage {
        recipient: recipient.to_string(),
        ..ChatMessage::default()
    };
    encode_value(ServerPacketId::TargetIsSilenced, &message)
}

pub fn silence_end(seconds: i32) -> Vec<u8> {
    build_packet(ServerPacketId::SilenceEnd, |w| {
        w.write_i32(seconds);
    })
}

pub fn friends_list(account_ids: &[i32]) -> Vec<u8> {
    build_packet(ServerPacketId::FriendsList, |w| {
        w.write_i32_list(account_ids);
    })
}

pub fn user_presence(presence: &UserPresence) -> Vec<u8> {
    encode_value(ServerPacketId::UserPresence, presence)
}

pub fn user_stats(stats: &UserStats) -> Vec<u8> {
    encode_value(ServerPacketId::UserStats, stats)
}

pub fn user_logout(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::UserLogout, |w| {
        w.write_i32(account_id).write_u8(0);
    })
}

pub fn channel_info(info: &ChannelInfo) -> Vec<u8> {
    encode_value(ServerPacketId::ChannelInfo, info)
}

pub fn channel_auto_join(info: &ChannelInfo) -> Vec<u8> {
    encode_value(ServerPacketId::ChannelAutoJoin, info)
}

pub fn channel_info_end() -> Vec<u8> {
    encode_packet(ServerPacketId::ChannelInfoEnd, &[])
}

pub fn channel_join_success(name: &str) -> Vec<u8> {
    build_packet(ServerPacketId::ChannelJoinSuccess, |w| {
        w.write_string(name);
    })
}

pub fn channel_kick(name: &str) -> Vec<u8> {
    build_packet(ServerPacketId::ChannelKick, |w| {
        w.write_string(name);
    })
}

pub fn spectator_joined(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::SpectatorJoined, |w| {
        w.write_i32(account_id);
    })
}

pub fn spectator_left(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::SpectatorLeft, |w| {
        w.write_i32(account_id);
    })
}

pub fn fellow_spectator_joined(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::FellowSpectatorJoined, |w| {
        w.write_i32(account_id);
    })
}

pub fn fellow_spectator_left(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::FellowSpectatorLeft, |w| {
        w.write_i32(account_id);
    })
}

pub fn spectator_cant_spectate(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::SpectatorCantSpectate, |w| {
        w.write_i32(account_id);
    })
}

pub fn spectate_frames(bundle: &ReplayFrameBundle) -> Vec<u8> {
    encode_value(ServerPacketId::SpectateFrames, bundle)
}

/// Relay spectator frames exactly as the host sent them.
pub fn spectate_frames_raw(body: &[u8]) -> Vec<u8> {
    encode_packet(ServerPacketId::SpectateFrames, body)
}

pub fn new_match(descriptor: &MatchDescriptor, show_password: bool) -> Vec<u8> {
    build_packet(ServerPacketId::NewMatch, |w| {
        descriptor.encode_with(w, show_password)
    })
}

pub fn update_match(descriptor: &MatchDescriptor, show_password: bool) -> Vec<u8> {
    build_packet(ServerPacketId::UpdateMatch, |w| {
        descriptor.encode_with(w, show_password)
    })
}

pub fn match_join_success(descriptor: &MatchDescriptor) -> Vec<u8> {
    build_packet(ServerPacketId::MatchJoinSuccess, |w| {
        descriptor.encode_with(w, true)
    })
}

pub fn match_join_fail() -> Vec<u8> {
    encode_packet(ServerPacketId::MatchJoinFail, &[])
}

pub fn dispose_match(match_id: u16) -> Vec<u8> {
    build_packet(ServerPacketId::DisposeMatch, |w| {
        w.write_i32(i32::from(match_id));
    })
}

pub fn match_start(descriptor: &MatchDescriptor) -> Vec<u8> {
    build_packet(ServerPacketId::MatchStart, |w| {
        descriptor.encode_with(w, true)
    })
}

/// Score update relayed to the rest of the match, tagged with the sender's slot.
pub fn match_score_update(slot_id: u8, frame: &ScoreFrame) -> Vec<u8> {
    let mut frame = frame.clone();
    frame.id = slot_id;
    build_packet(ServerPacketId::MatchScoreUpdate, |w| frame.encode(w))
}

pub fn match_transfer_host() -> Vec<u8> {
    encode_packet(ServerPacketId::MatchTransferHost, &[])
}

pub fn match_all_players_loaded() -> Vec<u8> {
    encode_packet(ServerPacketId::MatchAllPlayersLoaded, &[])
}

pub fn match_player_failed(slot_id: u8) -> Vec<u8> {
    build_packet(ServerPacketId::MatchPlayerFailed, |w| {
        w.write_i32(i32::from(slot_id));
    })
}

pub fn match_complete() -> Vec<u8> {
    encode_packet(ServerPacketId::MatchComplete, &[])
}

pub fn match_skip() -> Vec<u8> {
    encode_packet(ServerPacketId::MatchSkip, &[])
}

pub fn match_player_skipped(slot_id: u8) -> Vec<u8> {
    build_packet(ServerPacketId::MatchPlayerSkipped, |w| {
        w.write_i32(i32::from(slot_id));
    })
}

pub fn match_invite(message: &ChatMessage) -> Vec<u8> {
    encode_value(ServerPacketId::MatchInvite, message)
}

pub fn match_change_password(password: &str) -> Vec<u8> {
    build_packet(ServerPacketId::MatchChangePassword, |w| {
        w.write_string(password);
    })
}

pub fn match_abort() -> Vec<u8> {
    encode_packet(ServerPacketId::MatchAbort, &[])
}

pub fn toggle_block_non_friend_dms(blocked: bool) -> Vec<u8> {
    build_packet(ServerPacketId::ToggleBlockNonFriendDms, |w| {
        w.write_i32(i32::from(blocked));
    })
}

pub fn get_attention() -> Vec<u8> {
    encode_packet(ServerPacketId::GetAttention, &[])
}

pub fn account_restricted() -> Vec<u8> {
    encode_packet(ServerPacketId::AccountRestricted, &[])
}

pub fn version_update() -> Vec<u8> {
    encode_packet(ServerPacketId::VersionUpdate, &[])
}

pub fn version_update_forced() -> Vec<u8> {
    encode_packet(ServerPacketId::VersionUpdateForced, &[])
}

pub fn switch_server(delay_ms: i32) -> Vec<u8> {
    build_packet(ServerPacketId::SwitchServer, |w| {
        w.write_i32(delay_ms);
    })
}

pub fn main_menu_icon(image_url: &str, click_url: &str) -> Vec<u8> {
    build_packet(ServerPacketId::MainMenuIcon, |w| {
        w.write_string(&format!("{image_url}|{click_url}"));
    })
}

pub fn user_presence_single(account_id: i32) -> Vec<u8> {
    build_packet(ServerPacketId::UserPresenceSingle, |w| {
        w.write_i32(account_id);
    })
}

pub fn user_presence_bundle(account_ids: &[i32]) -> Vec<u8> {
    build_packet(ServerPacketId::UserPresenceBundle, |w| {
        w.write_i32_list(account_ids);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Decode;
    use crate::packet::decode_stream;

    #[test]
    fn test_user_id_packet() {
        assert_eq!(user_id(-1), vec![5, 0, 0, 4, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_empty_packets_have_no_body() {
        for packet in [pong(), channel_info_end(), match_join_fail(), match_abort()] {
            assert_eq!(packet.len(), crate::packet::HEADER_LEN);
        }
    }

    #[test]
    fn test_lobby_copy_hides_password() {
        let descriptor = MatchDescriptor {
            id: 3,
            name: "room".to_string(),
            password: "secret".to_string(),
            ..MatchDescriptor::default()
        };

        let lobby = new_match(&descriptor, false);
        let member = new_match(&descriptor, true);
        let lobby = decode_stream(&lobby).unwrap();
        let member = decode_stream(&member).unwrap();

        assert_eq!(MatchDescriptor::from_body(lobby[0].body).unwrap().password, "");
        assert_eq!(
            MatchDescriptor::from_body(member[0].body).unwrap().password,
            "secret"
        );
    }

    #[test]
    fn test_score_update_is_tagged_with_slot() {
        let frame = ScoreFrame {
            id: 0,
            total_score: 500,
            ..ScoreFrame::default()
        };
        let packet = match_score_update(4, &frame);
        let packets = decode_stream(&packet).unwrap();
        let relayed = ScoreFrame::from_body(packets[0].body).unwrap();
        assert_eq!(relayed.id, 4);
        assert_eq!(relayed.total_score, 500);
    }
}

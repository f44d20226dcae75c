// ============================
// crates/backend-lib/src/dispatch.rs
// ============================
//! Packet id to handler table.
use std::collections::HashMap;

use bancho_common::{decode_stream, ClientPacketId, RawPacket};
use futures_util::future::BoxFuture;
use metrics::counter;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::handlers::{chat, lobby, multiplayer, presence, spectate};
use crate::metrics::{PACKETS_HANDLED, PACKETS_UNHANDLED};
use crate::sessions::Session;
use crate::AppState;

/// A packet handler. Receives the packet body without its header.
pub type Handler =
    for<'a> fn(&'a AppState, &'a Session, &'a [u8]) -> BoxFuture<'a, Result<(), AppError>>;

macro_rules! handler {
    ($f:path) => {{
        fn boxed<'a>(
            state: &'a AppState,
            session: &'a Session,
            body: &'a [u8],
        ) -> BoxFuture<'a, Result<(), AppError>> {
            Box::pin($f(state, session, body))
        }
        boxed as Handler
    }};
}

/// Table from client packet id to handler, built once at startup.
pub struct PacketHandlers {
    table: HashMap<u16, Handler>,
}

impl PacketHandlers {
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Every handler the server implements.
    pub fn standard() -> Self {
        use ClientPacketId as Id;

        let mut handlers = Self::empty();

        handlers.register(Id::ChangeAction, handler!(presence::change_action));
        handlers.register(Id::RequestStatusUpdate, handler!(presence::request_status_update));
        handlers.register(Id::Ping, handler!(presence::ping));
        handlers.register(Id::Logout, handler!(presence::logout));
        handlers.register(Id::UserStatsRequest, handler!(presence::user_stats_request));
        handlers.register(Id::UserPresenceRequest, handler!(presence::user_presence_request));
        handlers.register(
            Id::UserPresenceRequestAll,
            handler!(presence::user_presence_request_all),
        );
        handlers.register(Id::SetAwayMessage, handler!(presence::set_away_message));
        handlers.register(
            Id::ToggleBlockNonFriendDms,
            handler!(presence::toggle_block_non_friend_dms),
        );

        handlers.register(Id::SendPublicMessage, handler!(chat::send_public_message));
        handlers.register(Id::SendPrivateMessage, handler!(chat::send_private_message));
        handlers.register(Id::ChannelJoin, handler!(chat::channel_join));
        handlers.register(Id::ChannelPart, handler!(chat::channel_part));

        handlers.register(Id::JoinLobby, handler!(lobby::join_lobby));
        handlers.register(Id::PartLobby, handler!(lobby::part_lobby));

        handlers.register(Id::StartSpectating, handler!(spectate::start_spectating));
        handlers.register(Id::StopSpectating, handler!(spectate::stop_spectating_handler));
        handlers.register(Id::SpectateFrames, handler!(spectate::spectate_frames));
        handlers.register(Id::CantSpectate, handler!(spectate::cant_spectate));

        handlers.register(Id::CreateMatch, handler!(multiplayer::create_match));
        handlers.register(Id::JoinMatch, handler!(multiplayer::join_match));
        handlers.register(Id::PartMatch, handler!(multiplayer::part_match));
        handlers.register(Id::MatchChangeSlot, handler!(multiplayer::change_slot));
        handlers.register(Id::MatchReady, handler!(multiplayer::ready));
        handlers.register(Id::MatchLock, handler!(multiplayer::lock));
        handlers.register(Id::MatchChangeSettings, handler!(multiplayer::change_settings));
        handlers.register(Id::MatchStart, handler!(multiplayer::start));
        handlers.register(Id::MatchScoreUpdate, handler!(multiplayer::score_update));
        handlers.register(Id::MatchComplete, handler!(multiplayer::complete));
        handlers.register(Id::MatchChangeMods, handler!(multiplayer::change_mods));
        handlers.register(Id::MatchLoadComplete, handler!(multiplayer::load_complete));
        handlers.register(Id::MatchNoBeatmap, handler!(multiplayer::no_beatmap));
        handlers.register(Id::MatchNotReady, handler!(multiplayer::not_ready));
        handlers.register(Id::MatchFailed, handler!(multiplayer::failed));
        handlers.register(Id::MatchHasBeatmap, handler!(multiplayer::has_beatmap));
        handlers.register(Id::MatchSkipRequest, handler!(multiplayer::skip_request));
        handlers.register(Id::MatchTransferHost, handler!(multiplayer::transfer_host));
        handlers.register(Id::MatchChangeTeam, handler!(multiplayer::change_team));
        handlers.register(Id::MatchInvite, handler!(multiplayer::invite));
        handlers.register(Id::MatchChangePassword, handler!(multiplayer::change_password));
        handlers.register(
            Id::TournamentMatchInfoRequest,
            handler!(multiplayer::tournament_match_info_request),
        );
        handlers.register(
            Id::TournamentJoinMatchChannel,
            handler!(multiplayer::tournament_join_match_channel),
        );
        handlers.register(
            Id::TournamentLeaveMatchChannel,
            handler!(multiplayer::tournament_leave_match_channel),
        );

        handlers
    }

    pub fn register(&mut self, id: ClientPacketId, handler: Handler) {
        self.table.insert(u16::from(id), handler);
    }

    pub fn get(&self, id: u16) -> Option<Handler> {
        self.table.get(&id).copied()
    }

    /// Run the handler for one packet. Packets without a handler are skipped.
    pub async fn dispatch(
        &self,
        state: &AppState,
        session: &Session,
        packet: RawPacket<'_>,
    ) -> Result<(), AppError> {
        let name = match ClientPacketId::try_from(packet.id) {
            Ok(id) => id.name(),
            Err(id) => {
                counter!(PACKETS_UNHANDLED, "packet" => "unknown").increment(1);
                warn!(session_id = %session.session_id, packet_id = id, "unknown packet id");
                return Ok(());
            },
        };

        let Some(handler) = self.get(packet.id) else {
            counter!(PACKETS_UNHANDLED, "packet" => name).increment(1);
            debug!(session_id = %session.session_id, packet = name, "no handler for packet");
            return Ok(());
        };

        counter!(PACKETS_HANDLED, "packet" => name).increment(1);
        debug!(
            session_id = %session.session_id,
            packet = name,
            len = packet.body.len(),
            "handling packet"
        );
        handler(state, session, packet.body).await
    }
}

impl Default for PacketHandlers {
    fn default() -> Self {
        Self::standard()
    }
}

/// Decode a request body and handle its packets in order.
///
/// The session is re-read before every packet so each handler sees the
/// previous one's changes. Processing stops if the session is gone.
pub async fn process_packets(
    state: &AppState,
    session_id: Uuid,
    body: &[u8],
) -> Result<(), AppError> {
    let packets = decode_stream(body)?;

    for packet in packets {
        let Some(session) = state.sessions.fetch_by_id(session_id).await? else {
            debug!(session_id = %session_id, "session ended mid-request");
            break;
        };
        state.handlers.dispatch(state, &session, packet).await?;
    }
    Ok(())
}

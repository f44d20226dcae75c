// ================
// crates/common/src/wire.rs
// ================
//! Composite osu! structures carried inside packet bodies.

use crate::codec::{Decode, DecodeError, Encode, PacketReader, PacketWriter};
use crate::types::{
    Action, ClientPrivileges, GameMode, MatchTeamType, MatchWinCondition, Mods, ReplayAction,
    SlotStatus, SlotTeam,
};

/// Number of slots in every multiplayer match.
pub const MATCH_SLOT_COUNT: usize = 16;

/// A chat message, used for public, private and invite messages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChatMessage {
    pub sender: String,
    pub content: String,
    pub recipient: String,
    pub sender_id: i32,
}

impl Decode for ChatMessage {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            sender: reader.read_string()?,
            content: reader.read_string()?,
            recipient: reader.read_string()?,
            sender_id: reader.read_i32()?,
        })
    }
}

impl Encode for ChatMessage {
    fn encode(&self, writer: &mut PacketWriter) {
        writer
            .write_string(&self.sender)
            .write_string(&self.content)
            .write_string(&self.recipient)
            .write_i32(self.sender_id);
    }
}

/// Full description of a multiplayer match as the client sees it.
///
/// `slot_account_ids` lists the occupants of every slot whose status has a
/// player, in slot order. `slot_mods` is present exactly when `freemods` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDescriptor {
    pub id: u16,
    pub in_progress: bool,
    pub powerplay: u8,
    pub mods: Mods,
    pub name: String,
    pub password: String,
    pub beatmap_name: String,
    pub beatmap_id: i32,
    pub beatmap_md5: String,
    pub slot_statuses: [SlotStatus; MATCH_SLOT_COUNT],
    pub slot_teams: [SlotTeam; MATCH_SLOT_COUNT],
    pub slot_account_ids: Vec<i32>,
    pub host_account_id: i32,
    pub mode: GameMode,
    pub win_condition: MatchWinCondition,
    pub team_type: MatchTeamType,
    pub freemods: bool,
    pub slot_mods: Option<[Mods; MATCH_SLOT_COUNT]>,
    pub seed: i32,
}

impl Default for MatchDescriptor {
    fn default() -> Self {
        Self {
            id: 0,
            in_progress: false,
            powerplay: 0,
            mods: Mods::empty(),
            name: String::new(),
            password: String::new(),
            beatmap_name: String::new(),
            beatmap_id: 0,
            beatmap_md5: String::new(),
            slot_statuses: [SlotStatus::OPEN; MATCH_SLOT_COUNT],
            slot_teams: [SlotTeam::Neutral; MATCH_SLOT_COUNT],
            slot_account_ids: Vec::new(),
            host_account_id: 0,
            mode: GameMode::Standard,
            win_condition: MatchWinCondition::Score,
            team_type: MatchTeamType::HeadToHead,
            freemods: false,
            slot_mods: None,
            seed: 0,
        }
    }
}

impl MatchDescriptor {
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }

    /// Write the descriptor, optionally hiding the password.
    ///
    /// A hidden non-empty password is written as `0x0b 0x00`, a present
    /// zero-length string, so the client still shows the match as locked.
    pub fn encode_with(&self, writer: &mut PacketWriter, show_password: bool) {
        writer
            .write_u16(self.id)
            .write_bool(self.in_progress)
            .write_u8(self.powerplay);
        self.mods.encode(writer);
        writer.write_string(&self.name);

        if self.password.is_empty() || show_password {
            writer.write_string(&self.password);
        } else {
            writer.write_bytes(&[crate::codec::STRING_MARKER, 0x00]);
        }

        writer
            .write_string(&self.beatmap_name)
            .write_i32(self.beatmap_id)
            .write_string(&self.beatmap_md5);

        for status in &self.slot_statuses {
            status.encode(writer);
        }
        for team in &self.slot_teams {
            team.encode(writer);
        }
        for account_id in &self.slot_account_ids {
            writer.write_i32(*account_id);
        }

        writer.write_i32(self.host_account_id);
        self.mode.encode(writer);
        self.win_condition.encode(writer);
        self.team_type.encode(writer);
        writer.write_bool(self.freemods);

        if self.freemods {
            let slot_mods = self.slot_mods.unwrap_or([Mods::empty(); MATCH_SLOT_COUNT]);
            for mods in &slot_mods {
                mods.encode(writer);
            }
        }

        writer.write_i32(self.seed);
    }
}

impl Encode for MatchDescriptor {
    fn encode(&self, writer: &mut PacketWriter) {
        self.encode_with(writer, true);
    }
}

impl Decode for MatchDescriptor {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let id = reader.read_u16()?;
        let in_progress = reader.read_bool()?;
        let powerplay = reader.read_u8()?;
        let mods = Mods::decode(reader)?;
        let name = reader.read_string()?;
        let password = reader.read_string()?;
        let beatmap_name = reader.read_string()?;
        let beatmap_id = reader.read_i32()?;
        let beatmap_md5 = reader.read_string()?;

        let mut slot_statuses = [SlotStatus::OPEN; MATCH_SLOT_COUNT];
        for status in slot_statuses.iter_mut() {
            *status = SlotStatus::decode(reader)?;
        }
        let mut slot_teams = [SlotTeam::Neutral; MATCH_SLOT_COUNT];
        for team in slot_teams.iter_mut() {
            *team = SlotTeam::decode(reader)?;
        }

        let occupied = slot_statuses.iter().filter(|s| s.has_player()).count();
        let slot_account_ids = (0..occupied)
            .map(|_| reader.read_i32())
            .collect::<Result<Vec<_>, _>>()?;

        let host_account_id = reader.read_i32()?;
        let mode = GameMode::decode(reader)?;
        let win_condition = MatchWinCondition::decode(reader)?;
        let team_type = MatchTeamType::decode(reader)?;
        let freemods = reader.read_bool()?;

        let slot_mods = if freemods {
            let mut slot_mods = [Mods::empty(); MATCH_SLOT_COUNT];
            for mods in slot_mods.iter_mut() {
                *mods = Mods::decode(reader)?;
            }
            Some(slot_mods)
        } else {
            None
        };

        let seed = reader.read_i32()?;

        Ok(Self {
            id,
            in_progress,
            powerplay,
            mods,
            name,
            password,
            beatmap_name,
            beatmap_id,
            beatmap_md5,
            slot_statuses,
            slot_teams,
            slot_account_ids,
            host_account_id,
            mode,
            win_condition,
            team_type,
            freemods,
            slot_mods,
            seed,
        })
    }
}

/// Extra score-v2 values carried by a score frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreV2Portions {
    pub combo_portion: f64,
    pub bonus_portion: f64,
}

/// Live score state of one player.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreFrame {
    pub time: i32,
    pub id: u8,
    pub num300: u16,
    pub num100: u16,
    pub num50: u16,
    pub num_geki: u16,
    pub num_katu: u16,
    pub num_miss: u16,
    pub total_score: i32,
    pub max_combo: u16,
    pub current_combo: u16,
    pub perfect: bool,
    pub current_hp: u8,
    pub tag_byte: u8,
    pub score_v2: Option<ScoreV2Portions>,
}

impl Decode for ScoreFrame {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let mut frame = Self {
            time: reader.read_i32()?,
            id: reader.read_u8()?,
            num300: reader.read_u16()?,
            num100: reader.read_u16()?,
            num50: reader.read_u16()?,
            num_geki: reader.read_u16()?,
            num_katu: reader.read_u16()?,
            num_miss: reader.read_u16()?,
            total_score: reader.read_i32()?,
            max_combo: reader.read_u16()?,
            current_combo: reader.read_u16()?,
            perfect: reader.read_bool()?,
            current_hp: reader.read_u8()?,
            tag_byte: reader.read_u8()?,
            score_v2: None,
        };

        if reader.read_bool()? {
            frame.score_v2 = Some(ScoreV2Portions {
                combo_portion: reader.read_f64()?,
                bonus_portion: reader.read_f64()?,
            });
        }

        Ok(frame)
    }
}

impl Encode for ScoreFrame {
    fn encode(&self, writer: &mut PacketWriter) {
        writer
            .write_i32(self.time)
            .write_u8(self.id)
            .write_u16(self.num300)
            .write_u16(self.num100)
            .write_u16(self.num50)
            .write_u16(self.num_geki)
            .write_u16(self.num_katu)
            .write_u16(self.num_miss)
            .write_i32(self.total_score)
            .write_u16(self.max_combo)
            .write_u16(self.current_combo)
            .write_bool(self.perfect)
            .write_u8(self.current_hp)
            .write_u8(self.tag_byte)
            .write_bool(self.score_v2.is_some());

        if let Some(portions) = self.score_v2 {
            writer
                .write_f64(portions.combo_portion)
                .write_f64(portions.bonus_portion);
        }
    }
}

/// One cursor/keypress sample of a replay stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ReplayFrame {
    pub button_state: u8,
    pub taiko_byte: u8,
    pub x: f32,
    pub y: f32,
    pub time: i32,
}

impl Decode for ReplayFrame {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            button_state: reader.read_u8()?,
            taiko_byte: reader.read_u8()?,
            x: reader.read_f32()?,
            y: reader.read_f32()?,
            time: reader.read_i32()?,
        })
    }
}

impl Encode for ReplayFrame {
    fn encode(&self, writer: &mut PacketWriter) {
        writer
            .write_u8(self.button_state)
            .write_u8(self.taiko_byte)
            .write_f32(self.x)
            .write_f32(self.y)
            .write_i32(self.time);
    }
}

/// Batch of replay frames relayed from a spectated player.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrameBundle {
    pub extra: i32,
    pub frames: Vec<ReplayFrame>,
    pub action: ReplayAction,
    pub score_frame: ScoreFrame,
    pub sequence: u16,
}

impl Decode for ReplayFrameBundle {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let extra = reader.read_i32()?;
        let count = reader.read_u16()?;
        let frames = (0..count)
            .map(|_| ReplayFrame::decode(reader))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extra,
            frames,
            action: ReplayAction::decode(reader)?,
            score_frame: ScoreFrame::decode(reader)?,
            sequence: reader.read_u16()?,
        })
    }
}

impl Encode for ReplayFrameBundle {
    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.extra);
        let count = self.frames.len().min(u16::MAX as usize);
        writer.write_u16(count as u16);
        for frame in &self.frames[..count] {
            frame.encode(writer);
        }
        self.action.encode(writer);
        self.score_frame.encode(writer);
        writer.write_u16(self.sequence);
    }
}

/// Body of the client's status change packet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActionChange {
    pub action: Action,
    pub info_text: String,
    pub beatmap_md5: String,
    pub mods: Mods,
    pub mode: GameMode,
    pub beatmap_id: i32,
}

impl Decode for ActionChange {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            action: Action::decode(reader)?,
            info_text: reader.read_string()?,
            beatmap_md5: reader.read_string()?,
            mods: Mods::decode(reader)?,
            mode: GameMode::decode(reader)?,
            beatmap_id: reader.read_i32()?,
        })
    }
}

impl Encode for ActionChange {
    fn encode(&self, writer: &mut PacketWriter) {
        self.action.encode(writer);
        writer
            .write_string(&self.info_text)
            .write_string(&self.beatmap_md5);
        self.mods.encode(writer);
        self.mode.encode(writer);
        writer.write_i32(self.beatmap_id);
    }
}

/// Static part of a player's presence (name, location, rank).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserPresence {
    pub account_id: i32,
    pub username: String,
    pub utc_offset: i8,
    pub country_code: u8,
    pub privileges: ClientPrivileges,
    pub mode: GameMode,
    pub longitude: f32,
    pub latitude: f32,
    pub global_rank: i32,
}

impl Decode for UserPresence {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        let account_id = reader.read_i32()?;
        let username = reader.read_string()?;
        let utc_offset = (i16::from(reader.read_u8()?) - 24) as i8;
        let country_code = reader.read_u8()?;
        let packed = reader.read_u8()?;

        Ok(Self {
            account_id,
            username,
            utc_offset,
            country_code,
            privileges: ClientPrivileges::from_bits_retain(packed & 0x1f),
            mode: GameMode::try_from(packed >> 5)?,
            longitude: reader.read_f32()?,
            latitude: reader.read_f32()?,
            global_rank: reader.read_i32()?,
        })
    }
}

impl Encode for UserPresence {
    fn encode(&self, writer: &mut PacketWriter) {
        let packed = (self.privileges.bits() & 0x1f) | (u8::from(self.mode) << 5);
        writer
            .write_i32(self.account_id)
            .write_string(&self.username)
            .write_u8((i16::from(self.utc_offset) + 24) as u8)
            .write_u8(self.country_code)
            .write_u8(packed)
            .write_f32(self.longitude)
            .write_f32(self.latitude)
            .write_i32(self.global_rank);
    }
}

/// Dynamic part of a player's presence (status and statistics).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UserStats {
    pub account_id: i32,
    pub action: Action,
    pub info_text: String,
    pub beatmap_md5: String,
    pub mods: Mods,
    pub mode: GameMode,
    pub beatmap_id: i32,
    pub ranked_score: i64,
    /// Accuracy in `0.0..=1.0`.
    pub accuracy: f32,
    pub play_count: i32,
    pub total_score: i64,
    pub global_rank: i32,
    pub pp: i16,
}

impl Decode for UserStats {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            account_id: reader.read_i32()?,
            action: Action::decode(reader)?,
            info_text: reader.read_string()?,
            beatmap_md5: reader.read_string()?,
            mods: Mods::decode(reader)?,
            mode: GameMode::decode(reader)?,
            beatmap_id: reader.read_i32()?,
            ranked_score: reader.read_i64()?,
            accuracy: reader.read_f32()?,
            play_count: reader.read_i32()?,
            total_score: reader.read_i64()?,
            global_rank: reader.read_i32()?,
            pp: reader.read_i16()?,
        })
    }
}

impl Encode for UserStats {
    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_i32(self.account_id);
        self.action.encode(writer);
        writer
            .write_string(&self.info_text)
            .write_string(&self.beatmap_md5);
        self.mods.encode(writer);
        self.mode.encode(writer);
        writer
            .write_i32(self.beatmap_id)
            .write_i64(self.ranked_score)
            .write_f32(self.accuracy)
            .write_i32(self.play_count)
            .write_i64(self.total_score)
            .write_i32(self.global_rank)
            .write_i16(self.pp);
    }
}

/// Channel listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: String,
    pub player_count: u16,
}

impl Decode for ChannelInfo {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            name: reader.read_string()?,
            topic: reader.read_string()?,
            player_count: reader.read_u16()?,
        })
    }
}

impl Encode for ChannelInfo {
    fn encode(&self, writer: &mut PacketWriter) {
        writer
            .write_string(&self.name)
            .write_string(&self.topic)
            .write_u16(self.player_count);
    }
}

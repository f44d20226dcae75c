// ================
// crates/common/src/types.rs
// ================
//! osu! enums and bit sets shared by the wire format and the server state.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::codec::{Decode, DecodeError, Encode, PacketReader, PacketWriter};

macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident : $kind:literal {
            $($(#[$vmeta:meta])* $variant:ident = $value:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value),*
        }

        impl TryFrom<u8> for $name {
            type Error = DecodeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)*
                    other => Err(DecodeError::InvalidValue {
                        kind: $kind,
                        value: i64::from(other),
                    }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> u8 {
                value as u8
            }
        }

        impl Decode for $name {
            fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
                Self::try_from(reader.read_u8()?)
            }
        }

        impl Encode for $name {
            fn encode(&self, writer: &mut PacketWriter) {
                writer.write_u8(u8::from(*self));
            }
        }
    };
}

wire_enum! {
    /// What a player is currently doing, shown next to their name.
    #[derive(Default)]
    pub enum Action: "action" {
        #[default]
        Idle = 0,
        Afk = 1,
        Playing = 2,
        Editing = 3,
        Modding = 4,
        Multiplayer = 5,
        Watching = 6,
        Unknown = 7,
        Testing = 8,
        Submitting = 9,
        Paused = 10,
        Lobby = 11,
        Multiplaying = 12,
        OsuDirect = 13,
    }
}

wire_enum! {
    /// Base ruleset.
    #[derive(Default)]
    pub enum GameMode: "game mode" {
        #[default]
        Standard = 0,
        Taiko = 1,
        Catch = 2,
        Mania = 3,
    }
}

impl GameMode {
    /// Mode id including the relax (+4) / autopilot (+8) leaderboards.
    /// Relax has no mania leaderboard and autopilot only exists for standard.
    pub fn with_modifier(self, mods: Mods) -> u8 {
        let base = u8::from(self);
        if mods.contains(Mods::RELAX) && self != GameMode::Mania {
            base + 4
        } else if mods.contains(Mods::AUTOPILOT) && self == GameMode::Standard {
            8
        } else {
            base
        }
    }

    /// Base mode of a modified mode id. Unknown ids fall back to standard.
    pub fn from_modified(mode: u8) -> Self {
        match mode {
            0..=6 => GameMode::try_from(mode % 4).unwrap_or_default(),
            _ => GameMode::Standard,
        }
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum SlotTeam: "slot team" {
        #[default]
        Neutral = 0,
        Blue = 1,
        Red = 2,
    }
}

impl SlotTeam {
    /// Team a player switches to when asking to change sides.
    pub fn opposite(self) -> Self {
        match self {
            SlotTeam::Blue => SlotTeam::Red,
            SlotTeam::Red | SlotTeam::Neutral => SlotTeam::Blue,
        }
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum MatchTeamType: "team type" {
        #[default]
        HeadToHead = 0,
        TagCoop = 1,
        TeamVs = 2,
        TagTeamVs = 3,
    }
}

impl MatchTeamType {
    pub fn is_versus(self) -> bool {
        matches!(self, MatchTeamType::TeamVs | MatchTeamType::TagTeamVs)
    }

    /// Team a player is placed on when joining under this team type.
    pub fn default_team(self) -> SlotTeam {
        if self.is_versus() {
            SlotTeam::Red
        } else {
            SlotTeam::Neutral
        }
    }
}

wire_enum! {
    #[derive(Default)]
    pub enum MatchWinCondition: "win condition" {
        #[default]
        Score = 0,
        Accuracy = 1,
        Combo = 2,
        ScoreV2 = 3,
    }
}

wire_enum! {
    /// Spectator replay stream action.
    pub enum ReplayAction: "replay action" {
        Standard = 0,
        NewSong = 1,
        Skip = 2,
        Completion = 3,
        Fail = 4,
        Pause = 5,
        Unpause = 6,
        SongSelect = 7,
        WatchingOther = 8,
    }
}

bitflags! {
    /// Gameplay modifiers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mods: u32 {
        const NO_FAIL = 1 << 0;
        const EASY = 1 << 1;
        const TOUCH_DEVICE = 1 << 2;
        const HIDDEN = 1 << 3;
        const HARD_ROCK = 1 << 4;
        const SUDDEN_DEATH = 1 << 5;
        const DOUBLE_TIME = 1 << 6;
        const RELAX = 1 << 7;
        const HALF_TIME = 1 << 8;
        const NIGHTCORE = 1 << 9;
        const FLASHLIGHT = 1 << 10;
        const AUTOPLAY = 1 << 11;
        const SPUN_OUT = 1 << 12;
        const AUTOPILOT = 1 << 13;
        const PERFECT = 1 << 14;
        const KEY4 = 1 << 15;
        const KEY5 = 1 << 16;
        const KEY6 = 1 << 17;
        const KEY7 = 1 << 18;
        const KEY8 = 1 << 19;
        const FADE_IN = 1 << 20;
        const RANDOM = 1 << 21;
        const CINEMA = 1 << 22;
        const TARGET = 1 << 23;
        const KEY9 = 1 << 24;
        const KEY_COOP = 1 << 25;
        const KEY1 = 1 << 26;
        const KEY3 = 1 << 27;
        const KEY2 = 1 << 28;
        const SCORE_V2 = 1 << 29;
        const MIRROR = 1 << 30;

        /// Mods that change playback speed. They stay match-wide under freemods.
        const SPEED_CHANGING = Self::DOUBLE_TIME.bits() | Self::HALF_TIME.bits() | Self::NIGHTCORE.bits();
    }
}

impl Mods {
    /// Split into (speed-changing, everything else).
    pub fn split_speed(self) -> (Mods, Mods) {
        let speed = self & Mods::SPEED_CHANGING;
        (speed, self - speed)
    }
}

impl Decode for Mods {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(Mods::from_bits_retain(reader.read_u32()?))
    }
}

impl Encode for Mods {
    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_u32(self.bits());
    }
}

bitflags! {
    /// State of a multiplayer slot.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SlotStatus: u8 {
        const OPEN = 1 << 0;
        const LOCKED = 1 << 1;
        const NOT_READY = 1 << 2;
        const READY = 1 << 3;
        const NO_BEATMAP = 1 << 4;
        const PLAYING = 1 << 5;
        /// Finished playing, waiting for the rest of the match.
        const COMPLETE = 1 << 6;
        const QUIT = 1 << 7;

        const HAS_PLAYER = Self::NOT_READY.bits()
            | Self::READY.bits()
            | Self::NO_BEATMAP.bits()
            | Self::PLAYING.bits()
            | Self::COMPLETE.bits();
    }
}

impl Default for SlotStatus {
    fn default() -> Self {
        SlotStatus::OPEN
    }
}

impl SlotStatus {
    pub fn has_player(self) -> bool {
        self.intersects(SlotStatus::HAS_PLAYER)
    }
}

impl Decode for SlotStatus {
    fn decode(reader: &mut PacketReader<'_>) -> Result<Self, DecodeError> {
        Ok(SlotStatus::from_bits_retain(reader.read_u8()?))
    }
}

impl Encode for SlotStatus {
    fn encode(&self, writer: &mut PacketWriter) {
        writer.write_u8(self.bits());
    }
}

bitflags! {
    /// Privileges as understood by the osu! client.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClientPrivileges: u8 {
        const PLAYER = 1 << 0;
        const MODERATOR = 1 << 1;
        const SUPPORTER = 1 << 2;
        const OWNER = 1 << 3;
        const DEVELOPER = 1 << 4;
        const TOURNAMENT = 1 << 5;
    }
}

// Flags are stored as their raw bits so unknown bits survive a round trip.
macro_rules! serde_bits {
    ($($name:ident => $bits:ty),* $(,)?) => {
        $(
            impl Serialize for $name {
                fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                    self.bits().serialize(serializer)
                }
            }

            impl<'de> Deserialize<'de> for $name {
                fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                    <$bits>::deserialize(deserializer).map($name::from_bits_retain)
                }
            }
        )*
    };
}

serde_bits! {
    Mods => u32,
    SlotStatus => u8,
    ClientPrivileges => u8,
}

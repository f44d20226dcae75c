// ================
// crates/common/src/ids.rs
// ================
//! Numeric packet identifiers.

macro_rules! packet_ids {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $($variant:ident = $value:literal),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        $vis enum $name {
            $($variant = $value),*
        }

        impl $name {
            /// Every known id, in ascending order.
            pub const ALL: &'static [$name] = &[$($name::$variant),*];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant)),*
                }
            }
        }

        impl TryFrom<u16> for $name {
            type Error = u16;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)*
                    other => Err(other),
                }
            }
        }

        impl From<$name> for u16 {
            fn from(id: $name) -> u16 {
                id as u16
            }
        }
    };
}

packet_ids! {
    /// Packets sent by the osu! client.
    pub enum ClientPacketId {
        ChangeAction = 0,
        SendPublicMessage = 1,
        Logout = 2,
        RequestStatusUpdate = 3,
        Ping = 4,
        StartSpectating = 16,
        StopSpectating = 17,
        SpectateFrames = 18,
        ErrorReport = 20,
        CantSpectate = 21,
        SendPrivateMessage = 25,
        PartLobby = 29,
        JoinLobby = 30,
        CreateMatch = 31,
        JoinMatch = 32,
        PartMatch = 33,
        MatchChangeSlot = 38,
        MatchReady = 39,
        MatchLock = 40,
        MatchChangeSettings = 41,
        MatchStart = 44,
        MatchScoreUpdate = 47,
        MatchComplete = 49,
        MatchChangeMods = 51,
        MatchLoadComplete = 52,
        MatchNoBeatmap = 54,
        MatchNotReady = 55,
        MatchFailed = 56,
        MatchHasBeatmap = 59,
        MatchSkipRequest = 60,
        ChannelJoin = 63,
        BeatmapInfoRequest = 68,
        MatchTransferHost = 70,
        FriendAdd = 73,
        FriendRemove = 74,
        MatchChangeTeam = 77,
        ChannelPart = 78,
        ReceiveUpdates = 79,
        SetAwayMessage = 82,
        IrcOnly = 84,
        UserStatsRequest = 85,
        MatchInvite = 87,
        MatchChangePassword = 90,
        TournamentMatchInfoRequest = 93,
        UserPresenceRequest = 97,
        UserPresenceRequestAll = 98,
        ToggleBlockNonFriendDms = 99,
        TournamentJoinMatchChannel = 108,
        TournamentLeaveMatchChannel = 109,
    }
}

packet_ids! {
    /// Packets sent by the server.
    pub enum ServerPacketId {
        UserId = 5,
        SendMessage = 7,
        Pong = 8,
        UserStats = 11,
        UserLogout = 12,
        SpectatorJoined = 13,
        SpectatorLeft = 14,
        SpectateFrames = 15,
        VersionUpdate = 19,
        SpectatorCantSpectate = 22,
        GetAttention = 23,
        Notification = 24,
        UpdateMatch = 26,
        NewMatch = 27,
        DisposeMatch = 28,
        ToggleBlockNonFriendDms = 34,
        MatchJoinSuccess = 36,
        MatchJoinFail = 37,
        FellowSpectatorJoined = 42,
        FellowSpectatorLeft = 43,
        MatchStart = 46,
        MatchScoreUpdate = 48,
        MatchTransferHost = 50,
        MatchAllPlayersLoaded = 53,
        MatchPlayerFailed = 57,
        MatchComplete = 58,
        MatchSkip = 61,
        ChannelJoinSuccess = 64,
        ChannelInfo = 65,
        ChannelKick = 66,
        ChannelAutoJoin = 67,
        Privileges = 71,
        FriendsList = 72,
        ProtocolVersion = 75,
        MainMenuIcon = 76,
        MatchPlayerSkipped = 81,
        UserPresence = 83,
        Restart = 86,
        MatchInvite = 88,
        ChannelInfoEnd = 89,
        MatchChangePassword = 91,
        SilenceEnd = 92,
        UserSilenced = 94,
        UserPresenceSingle = 95,
        UserPresenceBundle = 96,
        UserDmBlocked = 100,
        TargetIsSilenced = 101,
        VersionUpdateForced = 102,
        SwitchServer = 103,
        AccountRestricted = 104,
        MatchAbort = 106,
    }
}

// ============================
// crates/backend-lib/src/privileges.rs
// ============================
//! Server-side account privileges and their client-facing projection.
use bancho_common::ClientPrivileges;
use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Privileges held by an account. Channel read/write masks use the same bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Privileges: i32 {
        /// Not restricted. Restricted accounts lose this bit only.
        const UNRESTRICTED = 1 << 0;
        const VERIFIED = 1 << 1;
        const WHITELISTED = 1 << 2;
        const SUPPORTER = 1 << 4;
        const PREMIUM = 1 << 5;
        const ALUMNI = 1 << 7;
        const TOURNAMENT = 1 << 10;
        const NOMINATOR = 1 << 11;
        const MODERATOR = 1 << 12;
        const ADMINISTRATOR = 1 << 13;
        const DEVELOPER = 1 << 14;

        const DONATOR = Self::SUPPORTER.bits() | Self::PREMIUM.bits();
        const STAFF = Self::MODERATOR.bits() | Self::ADMINISTRATOR.bits() | Self::DEVELOPER.bits();
    }
}

impl Privileges {
    /// Whether these privileges satisfy a channel mask. An empty mask admits everyone.
    pub fn satisfies(self, mask: Privileges) -> bool {
        mask.is_empty() || self.intersects(mask)
    }

    /// Privileges as shown to the osu! client.
    pub fn to_client(self) -> ClientPrivileges {
        let mut client = ClientPrivileges::empty();

        if self.contains(Privileges::UNRESTRICTED) {
            client |= ClientPrivileges::PLAYER;
        }
        if self.intersects(Privileges::DONATOR) {
            client |= ClientPrivileges::SUPPORTER;
        }
        if self.contains(Privileges::MODERATOR) {
            client |= ClientPrivileges::MODERATOR;
        }
        if self.contains(Privileges::ADMINISTRATOR) {
            client |= ClientPrivileges::DEVELOPER;
        }
        if self.contains(Privileges::DEVELOPER) {
            client |= ClientPrivileges::OWNER;
        }
        if self.contains(Privileges::TOURNAMENT) {
            client |= ClientPrivileges::TOURNAMENT;
        }

        client
    }
}

impl Serialize for Privileges {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Privileges {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i32::deserialize(deserializer).map(Privileges::from_bits_retain)
    }
}

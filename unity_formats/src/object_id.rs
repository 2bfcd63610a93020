use std::fmt;

use serde::Serialize;

/// Compound `(world, screen, id)` identity of any game entity.
///
/// Any component equal to `0xff` marks the identity as absent. The on-disk
/// encoding carries a fourth, always-zero byte which is not part of the
/// identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ObjectId {
    pub world: u8,
    pub screen: u8,
    pub id: u8,
}

impl ObjectId {
    pub const NONE: ObjectId = ObjectId {
        world: 0xff,
        screen: 0xff,
        id: 0xff,
    };

    /// Condition target meaning "only when no other object was supplied".
    pub const OTHER_ABSENT: ObjectId = ObjectId {
        world: 0xff,
        screen: 0xff,
        id: 0xfe,
    };

    /// Speaker/actor wildcard for "any member of the away team".
    pub const ANY_AWAY_TEAM: ObjectId = ObjectId {
        world: 0,
        screen: 0,
        id: 0x10,
    };

    pub const fn new(world: u8, screen: u8, id: u8) -> Self {
        Self { world, screen, id }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self.id == 0xff || self.screen == 0xff || self.world == 0xff
    }

    #[inline]
    pub fn is_some(self) -> bool {
        !self.is_none()
    }

    /// Numeric key used for object tables.
    #[inline]
    pub fn key(self) -> u32 {
        u32::from(self.id) + (u32::from(self.screen) << 8) + (u32::from(self.world) << 16)
    }

    /// Bridge crew are addressed with ids `0x20..=0x28` in conversation
    /// targets; fold them back onto their crew slots `0x00..=0x08`.
    pub fn remap_bridge_crew(self) -> Self {
        if self.world == 0 && self.screen == 0 && (0x20..=0x28).contains(&self.id) {
            Self::new(0, 0, self.id - 0x20)
        } else {
            self
        }
    }

    /// Object record file name, `o_WWSSII.bst`.
    pub fn object_file_name(self) -> String {
        format!("o_{:02x}{:02x}{:02x}.bst", self.world, self.screen, self.id)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "<none>")
        } else {
            write!(f, "{:02x}:{:02x}:{:02x}", self.world, self.screen, self.id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_packs_world_screen_id() {
        let id = ObjectId::new(0x5f, 0x02, 0x11);
        assert_eq!(id.key(), 0x11 + (0x02 << 8) + (0x5f << 16));
    }

    #[test]
    fn any_component_ff_is_absent() {
        assert!(ObjectId::NONE.is_none());
        assert!(ObjectId::new(1, 0xff, 3).is_none());
        assert!(ObjectId::OTHER_ABSENT.is_none());
        assert!(ObjectId::new(0, 0, 0).is_some());
    }

    #[test]
    fn bridge_crew_remap_only_touches_crew_range() {
        assert_eq!(
            ObjectId::new(0, 0, 0x23).remap_bridge_crew(),
            ObjectId::new(0, 0, 0x03)
        );
        assert_eq!(
            ObjectId::new(0, 0, 0x29).remap_bridge_crew(),
            ObjectId::new(0, 0, 0x29)
        );
        assert_eq!(
            ObjectId::new(1, 0, 0x20).remap_bridge_crew(),
            ObjectId::new(1, 0, 0x20)
        );
    }

    #[test]
    fn file_name_is_hex() {
        assert_eq!(ObjectId::new(0x5f, 0x01, 0x2a).object_file_name(), "o_5f012a.bst");
    }
}

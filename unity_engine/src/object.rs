use log::warn;
use serde::Serialize;
use unity_formats::conversation::VOICE_GROUP_NONE;
use unity_formats::entry::NONE_U16;
use unity_formats::object::{OBJFLAG_ACTIVE, OBJFLAG_STUNNED};
use unity_formats::{Description, EntryList, ObjectId, ObjectRecord};

use crate::action::ActionType;

/// Animation request recorded by an alter block. The renderer is not part of
/// this crate, so the object only remembers the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", content = "index", rename_all = "snake_case")]
pub enum AnimationChange {
    Start(u16),
    StartOnce(u16),
    Hold(u16),
}

impl AnimationChange {
    /// Decode the banded `alter_anim` value. The 30000 band is reserved.
    pub fn from_alter(anim: u16) -> Option<Self> {
        match anim {
            NONE_U16 => None,
            0..=28999 => Some(AnimationChange::Start(anim)),
            29000..=29999 => Some(AnimationChange::StartOnce(anim - 29000)),
            30000..=30999 => {
                warn!("animation {anim} is in the reserved 30000 band; ignored");
                None
            }
            _ => Some(AnimationChange::Hold(anim - 31000)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Voice {
    pub group: u8,
    pub subgroup: u8,
    pub id: u16,
}

impl Voice {
    pub fn file_name(self) -> Option<String> {
        if self.group == VOICE_GROUP_NONE {
            return None;
        }
        Some(format!("{:02x}{:02x}{:04x}.vac", self.group, self.subgroup, self.id))
    }
}

/// Live object state: the parsed record plus what scripts attached to it at
/// run time.
#[derive(Debug, Clone, Serialize)]
pub struct Object {
    pub record: ObjectRecord,
    pub hail: Option<String>,
    pub voice: Option<Voice>,
    pub animation: Option<AnimationChange>,
}

impl Object {
    pub fn new(record: ObjectRecord) -> Self {
        Self {
            record,
            hail: None,
            voice: None,
            animation: None,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.record.id
    }

    pub fn is_active(&self) -> bool {
        self.record.flags & OBJFLAG_ACTIVE != 0
    }

    pub fn is_stunned(&self) -> bool {
        self.record.flags & OBJFLAG_STUNNED != 0
    }

    /// Set or clear `bits`, reporting whether anything changed.
    pub fn set_flags(&mut self, bits: u16, on: bool) -> bool {
        let before = self.record.flags;
        if on {
            self.record.flags |= bits;
        } else {
            self.record.flags &= !bits;
        }
        before != self.record.flags
    }

    pub fn description(&self, index: u8) -> Option<&Description> {
        self.record.descriptions.get(usize::from(index))
    }

    /// Voice clip for a description. A voice set by an alter block wins over
    /// the one stored with the text.
    pub fn description_voice(&self, description: &Description) -> Option<String> {
        self.voice
            .unwrap_or(Voice {
                group: description.voice_group,
                subgroup: description.voice_subgroup,
                id: description.voice_id,
            })
            .file_name()
    }

    pub(crate) fn entries_mut(&mut self, verb: ActionType) -> Option<&mut Option<EntryList>> {
        match verb {
            ActionType::Use => Some(&mut self.record.use_entries),
            ActionType::Get => Some(&mut self.record.get_entries),
            ActionType::Look => Some(&mut self.record.look_entries),
            ActionType::Timer => Some(&mut self.record.timer_entries),
            ActionType::Talk | ActionType::Walk => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn animation_bands() {
        assert_eq!(AnimationChange::from_alter(12), Some(AnimationChange::Start(12)));
        assert_eq!(AnimationChange::from_alter(28999), Some(AnimationChange::Start(28999)));
        assert_eq!(AnimationChange::from_alter(29000), Some(AnimationChange::StartOnce(0)));
        assert_eq!(AnimationChange::from_alter(29999), Some(AnimationChange::StartOnce(999)));
        assert_eq!(AnimationChange::from_alter(30000), None);
        assert_eq!(AnimationChange::from_alter(30999), None);
        assert_eq!(AnimationChange::from_alter(31004), Some(AnimationChange::Hold(4)));
        assert_eq!(AnimationChange::from_alter(0xffff), None);
    }

    #[test]
    fn flags_report_changes() {
        let mut object = Object::new(ObjectRecord::new(ObjectId::new(1, 2, 3), "door"));
        assert!(object.is_active());
        assert!(!object.set_flags(OBJFLAG_ACTIVE, true));
        assert!(object.set_flags(OBJFLAG_ACTIVE, false));
        assert!(!object.is_active());
        assert!(object.set_flags(OBJFLAG_STUNNED, true));
        assert!(object.is_stunned());
    }

    #[test]
    fn silent_voice_group_has_no_file() {
        let voice = Voice {
            group: VOICE_GROUP_NONE,
            subgroup: 1,
            id: 2,
        };
        assert_eq!(voice.file_name(), None);
        let voice = Voice {
            group: 0x12,
            subgroup: 0x03,
            id: 0x0045,
        };
        assert_eq!(voice.file_name().as_deref(), Some("12030045.vac"));
    }
}

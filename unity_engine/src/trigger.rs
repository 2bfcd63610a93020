//! Timer and proximity triggers.

use serde::Serialize;
use unity_formats::{ObjectId, TriggerRecord, TriggerType};

/// Where an object currently stands, as far as proximity is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub world: u8,
    pub screen: u8,
    pub x: i16,
    pub y: i16,
}

impl Placement {
    /// Whole-pixel distance on the screen, or `None` when the two are not on
    /// the same screen.
    pub fn distance_to(&self, other: &Placement) -> Option<u32> {
        if self.world != other.world || self.screen != other.screen {
            return None;
        }
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        Some(((dx * dx + dy * dy) as f64).sqrt() as u32)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trigger {
    pub record: TriggerRecord,
}

impl Trigger {
    pub fn new(record: TriggerRecord) -> Self {
        Self { record }
    }

    pub fn id(&self) -> u32 {
        self.record.id
    }

    pub fn target(&self) -> ObjectId {
        self.record.target
    }

    pub fn is_proximity(&self) -> bool {
        self.record.trigger_type == TriggerType::Proximity
    }

    /// Advance to `now` (milliseconds). `placements` is the (from, to) pair
    /// for proximity triggers; the caller resolves it since objects load
    /// lazily. Returns true when the trigger fires.
    pub fn tick(&mut self, now: u32, placements: Option<(Placement, Placement)>) -> bool {
        let record = &mut self.record;
        if !record.enabled {
            return false;
        }
        match record.trigger_type {
            TriggerType::Normal | TriggerType::Unused => false,
            TriggerType::Timer => {
                if record.timer_start == 0 {
                    record.timer_start = now;
                    return false;
                }
                if now.wrapping_sub(record.timer_start) < record.target_time {
                    return false;
                }
                record.timer_start = 0;
                true
            }
            TriggerType::Proximity => {
                let Some((from, to)) = placements else {
                    return false;
                };
                let Some(distance) = from.distance_to(&to) else {
                    return false;
                };
                let dist = u32::from(record.dist);
                let fired = if record.reversed {
                    distance >= dist
                } else {
                    distance <= dist
                };
                if fired && !record.instant {
                    record.enabled = false;
                }
                fired
            }
        }
    }
}

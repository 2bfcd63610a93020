//! Bitmask returned by every check and block execution.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign};

use serde::Serialize;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ResultType(pub u32);

impl ResultType {
    pub const EMPTY: ResultType = ResultType(0);
    pub const AWAYTEAM: ResultType = ResultType(0x01);
    pub const FAILOTHER: ResultType = ResultType(0x02);
    pub const COUNTER_DOWHEN: ResultType = ResultType(0x04);
    pub const COUNTER_DOUNTIL: ResultType = ResultType(0x08);
    pub const WALKING: ResultType = ResultType(0x10);
    pub const MATCHOTHER: ResultType = ResultType(0x20);
    pub const DIDSOMETHING: ResultType = ResultType(0x40);
    pub const STOPPED: ResultType = ResultType(0x80);
    pub const FAILCONDITION: ResultType = ResultType(0x100);

    /// Bits that make a condition check skip its branch.
    pub const FAILURES: ResultType = ResultType(0x01 | 0x02 | 0x04 | 0x08 | 0x100);

    /// Bits remembered from one branch attempt to the next.
    pub const CARRIED: ResultType = ResultType(0x10 | 0x20 | 0x40);

    const NAMES: [(ResultType, &'static str); 9] = [
        (Self::AWAYTEAM, "AWAYTEAM"),
        (Self::FAILOTHER, "FAILOTHER"),
        (Self::COUNTER_DOWHEN, "COUNTER_DOWHEN"),
        (Self::COUNTER_DOUNTIL, "COUNTER_DOUNTIL"),
        (Self::WALKING, "WALKING"),
        (Self::MATCHOTHER, "MATCHOTHER"),
        (Self::DIDSOMETHING, "DIDSOMETHING"),
        (Self::STOPPED, "STOPPED"),
        (Self::FAILCONDITION, "FAILCONDITION"),
    ];

    pub fn contains(self, other: ResultType) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    pub fn intersects(self, other: ResultType) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn failed(self) -> bool {
        self.intersects(Self::FAILURES)
    }
}

impl BitOr for ResultType {
    type Output = ResultType;

    fn bitor(self, rhs: ResultType) -> ResultType {
        ResultType(self.0 | rhs.0)
    }
}

impl BitOrAssign for ResultType {
    fn bitor_assign(&mut self, rhs: ResultType) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ResultType {
    type Output = ResultType;

    fn bitand(self, rhs: ResultType) -> ResultType {
        ResultType(self.0 & rhs.0)
    }
}

impl BitAndAssign for ResultType {
    fn bitand_assign(&mut self, rhs: ResultType) {
        self.0 &= rhs.0;
    }
}

impl fmt::Debug for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("EMPTY");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}

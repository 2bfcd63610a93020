use std::fmt;

use serde::Serialize;
use unity_formats::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Use,
    Get,
    Look,
    Talk,
    Walk,
    Timer,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionType::Use => "use",
            ActionType::Get => "get",
            ActionType::Look => "look",
            ActionType::Talk => "talk",
            ActionType::Walk => "walk",
            ActionType::Timer => "timer",
        };
        f.write_str(name)
    }
}

/// What the player (or a script) is doing: `who` performs `verb` on
/// `target`, optionally with `other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Action {
    pub verb: ActionType,
    pub target: ObjectId,
    pub who: ObjectId,
    pub other: ObjectId,
    pub x: Option<u16>,
    pub y: Option<u16>,
}

impl Action {
    pub fn new(verb: ActionType, target: ObjectId) -> Self {
        Self {
            verb,
            target,
            who: ObjectId::NONE,
            other: ObjectId::NONE,
            x: None,
            y: None,
        }
    }

    pub fn by(mut self, who: ObjectId) -> Self {
        self.who = who;
        self
    }

    pub fn with(mut self, other: ObjectId) -> Self {
        self.other = other;
        self
    }

    pub fn at(mut self, x: u16, y: u16) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.verb, self.target)?;
        if self.other.is_some() {
            write!(f, " with {}", self.other)?;
        }
        if self.who.is_some() {
            write!(f, " by {}", self.who)?;
        }
        Ok(())
    }
}

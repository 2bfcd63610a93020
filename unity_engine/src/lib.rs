pub mod action;
pub mod cli;
pub mod conversation;
pub mod dialog_bridge;
pub mod error;
pub mod interpreter;
pub mod object;
pub mod requests;
pub mod result;
pub mod trigger;
pub mod video;
pub mod world;

pub use action::{Action, ActionType};
pub use conversation::{Conversation, ConversationStart};
pub use dialog_bridge::{DialogChoice, DialogEvent, DialogHost, DialogLine, RecordingDialogHost};
pub use error::{script_error, ScriptError};
pub use object::{AnimationChange, Object};
pub use requests::{RequestQueue, WorldRequest};
pub use result::ResultType;
pub use trigger::{Placement, Trigger};
pub use video::{play_movie, MoviePlayer, MovieSink, PlaybackSummary, PlayerPoll};
pub use world::{Advice, CurrentScreen, World};

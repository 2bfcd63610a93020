use thiserror::Error;
use unity_formats::ObjectId;

/// Inconsistencies in the script graph itself. The assets parsed fine but
/// refer to something that does not exist or is not reachable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("conversation {conversation} of world {world} does not exist")]
    MissingConversation { world: u8, conversation: u16 },

    #[error("conversation {conversation}: no response {response}/{state}")]
    MissingResponse {
        conversation: u16,
        response: u16,
        state: u16,
    },

    #[error("conversation {conversation}: no enabled response {response} for speaker {speaker}")]
    NoEnabledResponse {
        conversation: u16,
        response: u16,
        speaker: ObjectId,
    },

    #[error("trigger {0} does not exist")]
    MissingTrigger(u32),

    #[error("dialog host chose state {chosen}, offered {offered:?}")]
    InvalidChoice { chosen: u16, offered: Vec<u16> },

    #[error("object {object} has no description {index}")]
    MissingDescription { object: ObjectId, index: u8 },

    #[error("world id {0} is out of range")]
    WorldOutOfRange(u16),
}

/// True when `err` carries a [`ScriptError`] anywhere in its chain.
pub fn script_error(err: &anyhow::Error) -> Option<&ScriptError> {
    err.chain().find_map(|cause| cause.downcast_ref::<ScriptError>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn script_error_survives_context() {
        let err = Err::<(), _>(ScriptError::MissingTrigger(7))
            .context("running trigger block")
            .unwrap_err();
        assert_eq!(script_error(&err), Some(&ScriptError::MissingTrigger(7)));
        assert!(script_error(&anyhow::anyhow!("plain")).is_none());
    }

    #[test]
    fn messages_name_the_missing_piece() {
        let err = ScriptError::MissingResponse {
            conversation: 3,
            response: 5,
            state: 1,
        };
        assert_eq!(err.to_string(), "conversation 3: no response 5/1");
    }
}

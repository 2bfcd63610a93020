//! Conversation state machine: response lookup, who-can-say filtering and
//! the traversal loop that drives the dialog host.

use anyhow::{Context, Result};
use log::{debug, warn};
use unity_formats::entry::{NONE_U16, NONE_U8};
use unity_formats::{ConversationFile, ObjectId, ResponseBlock, ResponseRecord, ResponseState};

use crate::action::{Action, ActionType};
use crate::dialog_bridge::{DialogChoice, DialogLine};
use crate::error::ScriptError;
use crate::interpreter;
use crate::result::ResultType;
use crate::world::World;

/// A loaded conversation file with mutable response states.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub world: u8,
    pub id: u16,
    file: ConversationFile,
}

/// Where a traversal begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationStart {
    /// First enabled response of this situation the speaker may say.
    Situation(u16),
    /// Exactly this `(response, state)`, whatever its enabled state.
    Response { id: u16, state: u16 },
}

impl Conversation {
    pub fn new(world: u8, id: u16, file: ConversationFile) -> Self {
        Self { world, id, file }
    }

    pub fn responses(&self) -> &[ResponseRecord] {
        &self.file.responses
    }

    fn position(&self, id: u16, state: u16) -> Option<usize> {
        self.file
            .responses
            .iter()
            .position(|response| response.id == id && response.state == state)
    }

    pub fn get_response(&self, id: u16, state: u16) -> Option<&ResponseRecord> {
        self.position(id, state).map(|index| &self.file.responses[index])
    }

    fn enabled_position(
        &self,
        id: u16,
        speaker: ObjectId,
        away_team: &[ObjectId],
    ) -> Option<usize> {
        self.file.responses.iter().position(|response| {
            response.id == id && response.is_enabled() && can_say(response, speaker, away_team)
        })
    }

    pub fn get_enabled_response(
        &self,
        id: u16,
        speaker: ObjectId,
        away_team: &[ObjectId],
    ) -> Option<&ResponseRecord> {
        self.enabled_position(id, speaker, away_team)
            .map(|index| &self.file.responses[index])
    }

    pub fn set_response_state(
        &mut self,
        id: u16,
        state: u16,
        enabled: bool,
    ) -> Result<(), ScriptError> {
        let index = self.position(id, state).ok_or(ScriptError::MissingResponse {
            conversation: self.id,
            response: id,
            state,
        })?;
        self.file.responses[index].response_state = if enabled {
            ResponseState::Enabled
        } else {
            ResponseState::Disabled
        };
        Ok(())
    }

    /// States of `id` the speaker could continue with, in file order.
    fn choices(&self, id: u16, speaker: ObjectId, away_team: &[ObjectId]) -> Vec<DialogChoice> {
        self.file
            .responses
            .iter()
            .filter(|response| {
                response.id == id && response.is_enabled() && can_say(response, speaker, away_team)
            })
            .map(|response| DialogChoice {
                state: response.state,
                text: response.text.text.clone(),
            })
            .collect()
    }
}

/// A speaker id of `0xff` skips the who-can-say filter.
fn can_say(response: &ResponseRecord, speaker: ObjectId, away_team: &[ObjectId]) -> bool {
    if speaker.id == NONE_U8 {
        return true;
    }
    response
        .who_can_say
        .iter()
        .any(|&entry| who_can_say_matches(entry, speaker, away_team))
}

pub fn who_can_say_matches(entry: ObjectId, speaker: ObjectId, away_team: &[ObjectId]) -> bool {
    if entry.world != speaker.world || entry.screen != speaker.screen {
        return false;
    }
    if entry == ObjectId::ANY_AWAY_TEAM {
        return away_team.contains(&speaker);
    }
    entry.id == speaker.id
}

/// Run a conversation from `start` until a response ends it or no
/// continuation is available.
pub fn run_conversation(
    world: &mut World,
    world_id: u8,
    conversation_id: u16,
    start: ConversationStart,
    speaker: ObjectId,
) -> Result<ResultType> {
    let away_team = world.away_team().to_vec();
    let conversation = world.conversation_mut(world_id, conversation_id)?;
    let mut index = match start {
        ConversationStart::Situation(id) => conversation
            .enabled_position(id, speaker, &away_team)
            .ok_or(ScriptError::NoEnabledResponse {
                conversation: conversation_id,
                response: id,
                speaker,
            })?,
        ConversationStart::Response { id, state } => {
            conversation
                .position(id, state)
                .ok_or(ScriptError::MissingResponse {
                    conversation: conversation_id,
                    response: id,
                    state,
                })?
        }
    };

    let mut result = ResultType::EMPTY;
    loop {
        let (response_id, state, target, next, block_count, line) = {
            let conversation = world.conversation_mut(world_id, conversation_id)?;
            let response = &conversation.file.responses[index];
            let target = response.target.remap_bridge_crew();
            let line = (!response.text.text.is_empty()).then(|| DialogLine {
                speaker: if target.is_some() { target } else { speaker },
                text: response.text.text.clone(),
                voice_file: response.text.voice_file(),
            });
            (
                response.id,
                response.state,
                target,
                response.next_situation,
                response.blocks.len(),
                line,
            )
        };
        debug!("conversation {world_id}/{conversation_id}: response {response_id}/{state}");
        if let Some(line) = &line {
            if world.dialog().run_dialog(line).is_break() {
                debug!("conversation {conversation_id}: quit at response {response_id}/{state}");
                break;
            }
        }

        for block_index in 0..block_count {
            result |= run_response_block(
                world,
                world_id,
                conversation_id,
                index,
                block_index,
                target,
                speaker,
            )
            .with_context(|| format!("response {response_id}/{state} block {block_index}"))?;
        }

        if next == NONE_U16 {
            break;
        }
        let conversation = world.conversation_mut(world_id, conversation_id)?;
        let mut choices = conversation.choices(next, speaker, &away_team);
        let chosen = match choices.len() {
            0 => {
                warn!(
                    "conversation {conversation_id}: nothing enabled for situation {next}; ending"
                );
                break;
            }
            1 => choices.remove(0).state,
            _ => {
                let Some(chosen) = world.dialog().run_dialog_choice(&choices) else {
                    debug!("conversation {conversation_id}: quit at situation {next}");
                    break;
                };
                if !choices.iter().any(|choice| choice.state == chosen) {
                    return Err(ScriptError::InvalidChoice {
                        chosen,
                        offered: choices.iter().map(|choice| choice.state).collect(),
                    }
                    .into());
                }
                chosen
            }
        };
        let conversation = world.conversation_mut(world_id, conversation_id)?;
        index = conversation
            .position(next, chosen)
            .ok_or(ScriptError::MissingResponse {
                conversation: conversation_id,
                response: next,
                state: chosen,
            })?;
    }
    Ok(result)
}

fn run_response_block(
    world: &mut World,
    world_id: u8,
    conversation_id: u16,
    index: usize,
    block_index: usize,
    target: ObjectId,
    speaker: ObjectId,
) -> Result<ResultType> {
    let conversation = world.conversation_mut(world_id, conversation_id)?;
    match &mut conversation.file.responses[index].blocks[block_index] {
        ResponseBlock::ChangeAction(change) => {
            let change = change.clone();
            if change.is_same_conversation() {
                conversation.set_response_state(
                    change.response_id,
                    change.state_id,
                    change.enable,
                )?;
            } else {
                world
                    .conversation_mut(world_id, change.conversation_id)?
                    .set_response_state(change.response_id, change.state_id, change.enable)?;
            }
            Ok(ResultType::EMPTY)
        }
        ResponseBlock::Result(list) => {
            let mut list = std::mem::take(list);
            let action = Action::new(ActionType::Talk, target).by(speaker);
            let outcome = interpreter::execute_list(world, &mut list, &action);
            if let Ok(conversation) = world.conversation_mut(world_id, conversation_id) {
                if let Some(ResponseBlock::Result(slot)) =
                    conversation.file.responses[index].blocks.get_mut(block_index)
                {
                    *slot = list;
                }
            }
            outcome
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unity_formats::TextBlock;

    fn response(id: u16, state: u16, enabled: bool, who: &[ObjectId]) -> ResponseRecord {
        ResponseRecord {
            id,
            state,
            response_state: if enabled {
                ResponseState::Enabled
            } else {
                ResponseState::Disabled
            },
            next_situation: 0xffff,
            target: ObjectId::NONE,
            who_can_say: who.to_vec(),
            text: TextBlock {
                text: format!("{id}/{state}"),
                voice_group: 0xcc,
                voice_subgroup: 0,
                voice_speaker: 0,
                voice_id: 0,
            },
            blocks: Vec::new(),
        }
    }

    const KIRK: ObjectId = ObjectId::new(0, 0, 0);
    const SPOCK: ObjectId = ObjectId::new(0, 0, 1);

    fn conversation() -> Conversation {
        Conversation::new(
            1,
            2,
            ConversationFile {
                responses: vec![
                    response(1, 0, false, &[]),
                    response(1, 1, true, &[SPOCK]),
                    response(1, 2, true, &[KIRK]),
                    response(2, 0, true, &[ObjectId::ANY_AWAY_TEAM]),
                ],
            },
        )
    }

    #[test]
    fn enabled_response_respects_state_and_speaker() {
        let conversation = conversation();
        let found = conversation.get_enabled_response(1, KIRK, &[]).unwrap();
        assert_eq!(found.state, 2);
        assert!(found.is_enabled());
        let found = conversation.get_enabled_response(1, SPOCK, &[]).unwrap();
        assert_eq!(found.state, 1);
        let anyone = ObjectId::new(0, 0, 0xff);
        assert_eq!(conversation.get_enabled_response(1, anyone, &[]).unwrap().state, 1);
        assert!(conversation.get_enabled_response(3, KIRK, &[]).is_none());
    }

    #[test]
    fn away_team_wildcard_needs_membership() {
        let conversation = conversation();
        assert!(conversation.get_enabled_response(2, SPOCK, &[]).is_none());
        assert!(conversation.get_enabled_response(2, SPOCK, &[KIRK, SPOCK]).is_some());
        assert!(!who_can_say_matches(ObjectId::new(0, 1, 1), SPOCK, &[]));
    }

    #[test]
    fn state_changes_flip_enabled() {
        let mut conversation = conversation();
        conversation.set_response_state(1, 0, true).unwrap();
        assert!(conversation.get_response(1, 0).unwrap().is_enabled());
        conversation.set_response_state(1, 1, false).unwrap();
        assert!(!conversation.get_response(1, 1).unwrap().is_enabled());
        assert_eq!(
            conversation.set_response_state(9, 9, true),
            Err(ScriptError::MissingResponse {
                conversation: 2,
                response: 9,
                state: 9
            })
        );
    }
}

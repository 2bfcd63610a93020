//! Conversation files (`wWWWcIII.bst`): a flat list of response records, each
//! with its speaker restrictions, spoken text and follow-up actions.

use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::block::*;
use crate::entry::{EntryList, NONE_U16};
use crate::object_id::ObjectId;

/// Voice group meaning "this line has no recorded audio".
pub const VOICE_GROUP_NONE: u8 = 0xcc;

pub fn conversation_file_name(world: u8, id: u16) -> String {
    format!("w{world:03}c{id:03}.bst")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseState {
    Enabled,
    Disabled,
    Unknown,
}

impl ResponseState {
    fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => ResponseState::Enabled,
            1 => ResponseState::Disabled,
            2 => ResponseState::Unknown,
            other => bail!(corrupt!("response state {other} out of range")),
        })
    }

    fn raw(self) -> u8 {
        match self {
            ResponseState::Enabled => 0,
            ResponseState::Disabled => 1,
            ResponseState::Unknown => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextBlock {
    pub text: String,
    pub voice_group: u8,
    pub voice_subgroup: u8,
    pub voice_speaker: u8,
    pub voice_id: u8,
}

impl TextBlock {
    /// Voice clip name, or `None` for silent lines.
    pub fn voice_file(&self) -> Option<String> {
        if self.voice_group == VOICE_GROUP_NONE {
            return None;
        }
        Some(format!(
            "{:02x}{:02x}{:02x}{:02x}.vac",
            self.voice_group, self.voice_subgroup, self.voice_speaker, self.voice_id
        ))
    }
}

/// Enables or disables another response once this one has been spoken.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeAction {
    pub enable: bool,
    /// `0xffff` refers to the conversation containing this block.
    pub conversation_id: u16,
    pub response_id: u16,
    pub state_id: u16,
}

impl ChangeAction {
    pub fn is_same_conversation(&self) -> bool {
        self.conversation_id == NONE_U16
    }
}

/// Ordered actions performed after a response's text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBlock {
    ChangeAction(ChangeAction),
    Result(EntryList),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseRecord {
    pub id: u16,
    pub state: u16,
    pub response_state: ResponseState,
    pub next_situation: u16,
    pub target: ObjectId,
    pub who_can_say: Vec<ObjectId>,
    pub text: TextBlock,
    pub blocks: Vec<ResponseBlock>,
}

impl ResponseRecord {
    pub fn is_enabled(&self) -> bool {
        self.response_state == ResponseState::Enabled
    }

    pub fn ends_conversation(&self) -> bool {
        self.next_situation == NONE_U16
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConversationFile {
    pub responses: Vec<ResponseRecord>,
}

impl ConversationFile {
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BlockReader::new(reader);
        let mut responses = Vec::new();
        while let Some(tag) = reader.read_block_header()? {
            if tag != BLOCK_CONV_RESPONSE {
                bail!(corrupt!(
                    "expected a response record, found {} block ({:#04x}) at offset {}",
                    block_name(tag),
                    tag,
                    reader.offset()
                ));
            }
            let index = responses.len();
            let response =
                read_response(&mut reader).with_context(|| format!("reading response #{index}"))?;
            responses.push(response);
        }
        Ok(Self { responses })
    }

    pub fn write_to(&self, writer: &mut BlockWriter) -> Result<()> {
        for response in &self.responses {
            write_response(response, writer)
                .with_context(|| format!("writing response {}/{}", response.id, response.state))?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BlockWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

fn read_response<R: Read>(reader: &mut BlockReader<R>) -> Result<ResponseRecord> {
    let id = reader.read_u16("response id")?;
    let state = reader.read_u16("response state id")?;
    let response_state = ResponseState::from_raw(reader.read_u8("response state")?)?;
    reader.expect_zero_u8("response reserved byte")?;
    let next_situation = reader.read_u16("next situation")?;
    let target = reader.read_object_id("response target")?;

    let mut who_can_say = Vec::new();
    let mut text = None;
    let mut blocks = Vec::new();
    loop {
        let tag = reader.expect_block_header("response sub-block")?;
        match tag {
            BLOCK_END_BLOCK => break,
            BLOCK_CONV_WHOCANSAY => who_can_say.push(reader.read_object_id("who can say")?),
            BLOCK_CONV_TEXT => {
                if text.is_some() {
                    bail!(corrupt!("response {id}/{state} has more than one text block"));
                }
                text = Some(TextBlock {
                    text: reader.read_cstring("response text")?,
                    voice_group: reader.read_u8("voice group")?,
                    voice_subgroup: reader.read_u8("voice subgroup")?,
                    voice_speaker: reader.read_u8("voice speaker")?,
                    voice_id: reader.read_u8("voice id")?,
                });
            }
            BLOCK_CONV_CHANGEACT_DISABLE | BLOCK_CONV_CHANGEACT_ENABLE => {
                blocks.push(ResponseBlock::ChangeAction(ChangeAction {
                    enable: tag == BLOCK_CONV_CHANGEACT_ENABLE,
                    conversation_id: reader.read_u16("change action conversation")?,
                    response_id: reader.read_u16("change action response")?,
                    state_id: reader.read_u16("change action state")?,
                }));
            }
            BLOCK_CONV_RESULT => {
                let list = EntryList::read_from(reader).context("reading response result")?;
                blocks.push(ResponseBlock::Result(list));
            }
            other => bail!(corrupt!(
                "unexpected {} block ({:#04x}) in response {}/{}",
                block_name(other),
                other,
                id,
                state
            )),
        }
    }

    let Some(text) = text else {
        bail!(corrupt!("response {id}/{state} has no text block"));
    };

    Ok(ResponseRecord {
        id,
        state,
        response_state,
        next_situation,
        target,
        who_can_say,
        text,
        blocks,
    })
}

fn write_response(response: &ResponseRecord, writer: &mut BlockWriter) -> Result<()> {
    writer.write_block_header(BLOCK_CONV_RESPONSE);
    writer.write_u16(response.id);
    writer.write_u16(response.state);
    writer.write_u8(response.response_state.raw());
    writer.write_u8(0);
    writer.write_u16(response.next_situation);
    writer.write_object_id(response.target);

    for who in &response.who_can_say {
        writer.write_block_header(BLOCK_CONV_WHOCANSAY);
        writer.write_object_id(*who);
    }

    writer.write_block_header(BLOCK_CONV_TEXT);
    writer.write_cstring(&response.text.text)?;
    writer.write_u8(response.text.voice_group);
    writer.write_u8(response.text.voice_subgroup);
    writer.write_u8(response.text.voice_speaker);
    writer.write_u8(response.text.voice_id);

    for block in &response.blocks {
        match block {
            ResponseBlock::ChangeAction(change) => {
                let tag = if change.enable {
                    BLOCK_CONV_CHANGEACT_ENABLE
                } else {
                    BLOCK_CONV_CHANGEACT_DISABLE
                };
                writer.write_block_header(tag);
                writer.write_u16(change.conversation_id);
                writer.write_u16(change.response_id);
                writer.write_u16(change.state_id);
            }
            ResponseBlock::Result(list) => {
                writer.write_block_header(BLOCK_CONV_RESULT);
                list.write_to(writer)?;
            }
        }
    }
    writer.write_block_header(BLOCK_END_BLOCK);
    Ok(())
}

//! Scripted behaviour blocks (conditions, alters, commands, ...) and the
//! entry lists that group them into alternative branches.

use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::block::*;
use crate::object_id::ObjectId;

pub const NONE_U8: u8 = 0xff;
pub const NONE_U16: u16 = 0xffff;
pub const NONE_U32: u32 = 0xffff_ffff;
pub const NONE_I16: i16 = -1;
pub const NONE_I32: i32 = -1;

pub const CONDITION_LEN: u16 = 116;
pub const ALTER_LEN: u16 = 154;
pub const REACTION_LEN: u16 = 16;
pub const COMMAND_LEN: u16 = 16;
pub const SCREEN_LEN: u16 = 30;
pub const PATH_LEN: u16 = 10;
pub const GENERAL_LEN: u16 = 6;
pub const CONVERSATION_LEN: u16 = 12;
pub const BEAM_LEN: u16 = 6;
pub const TRIGGER_LEN: u16 = 8;
pub const COMMUNICATE_LEN: u16 = 12;
pub const CHOICE_LEN: u16 = 6;

pub const COUNTER_DO_UNTIL: u8 = 0;
pub const COUNTER_DO_WHEN: u8 = 1;

pub const ALTER_ACTIVATE: u8 = 0x01;
pub const ALTER_DROP: u8 = 0x02;
pub const ALTER_GET: u8 = 0x04;
pub const ALTER_STUN: u8 = 0x08;
pub const ALTER_UNSTUN: u8 = 0x10;
pub const ALTER_DEACTIVATE: u8 = 0x20;

pub const COMMAND_USE: u8 = 0;
pub const COMMAND_GET: u8 = 1;
pub const COMMAND_LOOK: u8 = 2;
pub const COMMAND_TALK: u8 = 3;
pub const COMMAND_WALK: u8 = 4;

pub const CONVERSATION_ACTION_ENABLE: u16 = 0;
pub const CONVERSATION_ACTION_DISABLE: u16 = 1;
pub const CONVERSATION_ACTION_START: u16 = 2;

const NAME_LEN: usize = 20;
const HAIL_LEN: usize = 100;

/// Fixed-layout entry block: header, declared length, `stop_here`, reserved
/// byte, then the type specific payload.
trait FixedBlock: Sized {
    const TAG: u8;
    const LEN: u16;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self>;
    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()>;
    fn stop_here(&self) -> bool;
}

fn read_fixed<B: FixedBlock, R: Read>(reader: &mut BlockReader<R>) -> Result<B> {
    let start = reader.expect_length(B::TAG, B::LEN)?;
    let stop_here = reader.read_bool("stop_here flag")?;
    reader.expect_zero_u8("entry reserved byte")?;
    let block = B::read_payload(reader, stop_here)
        .with_context(|| format!("reading {} block", block_name(B::TAG)))?;
    reader.finish_payload(B::TAG, start, B::LEN)?;
    Ok(block)
}

fn write_fixed<B: FixedBlock>(block: &B, writer: &mut BlockWriter) -> Result<()> {
    writer.write_block_header(B::TAG);
    let at = writer.begin_payload();
    writer.write_bool(block.stop_here());
    writer.write_u8(0);
    block.write_payload(writer)?;
    writer.end_payload(B::TAG, at, B::LEN)
}

/// Read the remaining blocks of a repeating run whose first header has
/// already been consumed. The run must end with `END_BLOCK`.
fn read_run<B: FixedBlock, R: Read>(reader: &mut BlockReader<R>) -> Result<Vec<B>> {
    let mut blocks = vec![read_fixed::<B, R>(reader)?];
    loop {
        let tag = reader.expect_block_header("end of block run")?;
        if tag == BLOCK_END_BLOCK {
            return Ok(blocks);
        }
        if tag != B::TAG {
            bail!(corrupt!(
                "{} block ({:#04x}) interrupts a run of {} blocks",
                block_name(tag),
                tag,
                block_name(B::TAG)
            ));
        }
        blocks.push(read_fixed::<B, R>(reader)?);
    }
}

fn write_run<B: FixedBlock>(blocks: &[B], writer: &mut BlockWriter) -> Result<()> {
    if blocks.is_empty() {
        bail!("cannot serialise an empty run of {} blocks", block_name(B::TAG));
    }
    for block in blocks {
        write_fixed(block, writer)?;
    }
    writer.write_block_header(BLOCK_END_BLOCK);
    Ok(())
}

/// One of the four auxiliary object-state checks of a condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectCheck {
    pub object: ObjectId,
    pub check_state: u8,
    pub check_status: u8,
    pub check_has: u8,
    pub check_screen: u8,
    pub check_x: i16,
    pub check_y: i16,
    pub check_univ_x: i32,
    pub check_univ_y: i32,
    pub check_univ_z: i32,
}

impl Default for ObjectCheck {
    fn default() -> Self {
        Self {
            object: ObjectId::NONE,
            check_state: NONE_U8,
            check_status: NONE_U8,
            check_has: NONE_U8,
            check_screen: NONE_U8,
            check_x: NONE_I16,
            check_y: NONE_I16,
            check_univ_x: NONE_I32,
            check_univ_y: NONE_I32,
            check_univ_z: NONE_I32,
        }
    }
}

impl ObjectCheck {
    fn read_from<R: Read>(reader: &mut BlockReader<R>) -> Result<Self> {
        Ok(Self {
            object: reader.read_object_id("check object")?,
            check_state: reader.read_u8("check state")?,
            check_status: reader.read_u8("check status")?,
            check_has: reader.read_u8("check has")?,
            check_screen: reader.read_u8("check screen")?,
            check_x: reader.read_i16("check x")?,
            check_y: reader.read_i16("check y")?,
            check_univ_x: reader.read_i32("check universe x")?,
            check_univ_y: reader.read_i32("check universe y")?,
            check_univ_z: reader.read_i32("check universe z")?,
        })
    }

    fn write_to(&self, writer: &mut BlockWriter) {
        writer.write_object_id(self.object);
        writer.write_u8(self.check_state);
        writer.write_u8(self.check_status);
        writer.write_u8(self.check_has);
        writer.write_u8(self.check_screen);
        writer.write_i16(self.check_x);
        writer.write_i16(self.check_y);
        writer.write_i32(self.check_univ_x);
        writer.write_i32(self.check_univ_y);
        writer.write_i32(self.check_univ_z);
    }
}

/// The only block with a real `check`: decides whether its branch runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionBlock {
    pub stop_here: bool,
    pub target: ObjectId,
    pub who_can: ObjectId,
    pub how_close_dist: u16,
    pub how_close_x: u16,
    pub how_close_y: u16,
    /// Mutated by checks at runtime.
    pub counter_value: u16,
    pub counter_when: u8,
    pub checks: [ObjectCheck; 4],
}

impl Default for ConditionBlock {
    fn default() -> Self {
        Self {
            stop_here: false,
            target: ObjectId::NONE,
            who_can: ObjectId::NONE,
            how_close_dist: NONE_U16,
            how_close_x: NONE_U16,
            how_close_y: NONE_U16,
            counter_value: NONE_U16,
            counter_when: NONE_U8,
            checks: Default::default(),
        }
    }
}

impl FixedBlock for ConditionBlock {
    const TAG: u8 = BLOCK_CONDITION;
    const LEN: u16 = CONDITION_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        let target = reader.read_object_id("condition target")?;
        let who_can = reader.read_object_id("condition who-can")?;
        let how_close_dist = reader.read_u16("how close distance")?;
        let how_close_x = reader.read_u16("how close x")?;
        let how_close_y = reader.read_u16("how close y")?;
        let counter_value = reader.read_u16("counter value")?;
        let counter_when = reader.read_u8("counter when")?;
        reader.expect_zero_u8("condition reserved byte")?;
        let checks = [
            ObjectCheck::read_from(reader)?,
            ObjectCheck::read_from(reader)?,
            ObjectCheck::read_from(reader)?,
            ObjectCheck::read_from(reader)?,
        ];
        Ok(Self {
            stop_here,
            target,
            who_can,
            how_close_dist,
            how_close_x,
            how_close_y,
            counter_value,
            counter_when,
            checks,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_object_id(self.target);
        writer.write_object_id(self.who_can);
        writer.write_u16(self.how_close_dist);
        writer.write_u16(self.how_close_x);
        writer.write_u16(self.how_close_y);
        writer.write_u16(self.counter_value);
        writer.write_u8(self.counter_when);
        writer.write_u8(0);
        for check in &self.checks {
            check.write_to(writer);
        }
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

/// Changes flags, state and presentation of an object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlterBlock {
    pub stop_here: bool,
    pub target: ObjectId,
    pub alter_flags: u8,
    pub alter_reset: u8,
    pub alter_state: u8,
    pub play_description: u8,
    pub alter_timer: u16,
    pub alter_anim: u16,
    pub x: i16,
    pub y: i16,
    pub universe_x: i32,
    pub universe_y: i32,
    pub universe_z: i32,
    pub alter_name: String,
    pub alter_hail: String,
    pub voice_group: u8,
    pub voice_subgroup: u8,
    pub voice_id: u16,
}

impl Default for AlterBlock {
    fn default() -> Self {
        Self {
            stop_here: false,
            target: ObjectId::NONE,
            alter_flags: 0,
            alter_reset: 0,
            alter_state: NONE_U8,
            play_description: NONE_U8,
            alter_timer: NONE_U16,
            alter_anim: NONE_U16,
            x: NONE_I16,
            y: NONE_I16,
            universe_x: NONE_I32,
            universe_y: NONE_I32,
            universe_z: NONE_I32,
            alter_name: String::new(),
            alter_hail: String::new(),
            voice_group: NONE_U8,
            voice_subgroup: NONE_U8,
            voice_id: NONE_U16,
        }
    }
}

impl FixedBlock for AlterBlock {
    const TAG: u8 = BLOCK_ALTER;
    const LEN: u16 = ALTER_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        Ok(Self {
            stop_here,
            target: reader.read_object_id("alter target")?,
            alter_flags: reader.read_u8("alter flags")?,
            alter_reset: reader.read_u8("alter reset")?,
            alter_state: reader.read_u8("alter state")?,
            play_description: reader.read_u8("alter description")?,
            alter_timer: reader.read_u16("alter timer")?,
            alter_anim: reader.read_u16("alter animation")?,
            x: reader.read_i16("alter x")?,
            y: reader.read_i16("alter y")?,
            universe_x: reader.read_i32("alter universe x")?,
            universe_y: reader.read_i32("alter universe y")?,
            universe_z: reader.read_i32("alter universe z")?,
            alter_name: reader.read_fixed_string(NAME_LEN, "alter name")?,
            alter_hail: reader.read_fixed_string(HAIL_LEN, "alter hail")?,
            voice_group: reader.read_u8("alter voice group")?,
            voice_subgroup: reader.read_u8("alter voice subgroup")?,
            voice_id: reader.read_u16("alter voice id")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_object_id(self.target);
        writer.write_u8(self.alter_flags);
        writer.write_u8(self.alter_reset);
        writer.write_u8(self.alter_state);
        writer.write_u8(self.play_description);
        writer.write_u16(self.alter_timer);
        writer.write_u16(self.alter_anim);
        writer.write_i16(self.x);
        writer.write_i16(self.y);
        writer.write_i32(self.universe_x);
        writer.write_i32(self.universe_y);
        writer.write_i32(self.universe_z);
        writer.write_fixed_string(&self.alter_name, NAME_LEN)?;
        writer.write_fixed_string(&self.alter_hail, HAIL_LEN)?;
        writer.write_u8(self.voice_group);
        writer.write_u8(self.voice_subgroup);
        writer.write_u16(self.voice_id);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReactionBlock {
    pub stop_here: bool,
    pub target: ObjectId,
    pub dest: ObjectId,
    pub reaction_type: u8,
    pub unknown1: u16,
    pub unknown2: u16,
}

impl FixedBlock for ReactionBlock {
    const TAG: u8 = BLOCK_REACTION;
    const LEN: u16 = REACTION_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        let target = reader.read_object_id("reaction target")?;
        let dest = reader.read_object_id("reaction destination")?;
        let reaction_type = reader.read_u8("reaction type")?;
        reader.expect_zero_u8("reaction reserved byte")?;
        Ok(Self {
            stop_here,
            target,
            dest,
            reaction_type,
            unknown1: reader.read_u16("reaction unknown1")?,
            unknown2: reader.read_u16("reaction unknown2")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_object_id(self.target);
        writer.write_object_id(self.dest);
        writer.write_u8(self.reaction_type);
        writer.write_u8(0);
        writer.write_u16(self.unknown1);
        writer.write_u16(self.unknown2);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

/// Performs another verb on a (possibly different) object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandBlock {
    pub stop_here: bool,
    pub target: ObjectId,
    pub target2: ObjectId,
    pub command_id: u8,
    pub x: u16,
    pub y: u16,
}

impl FixedBlock for CommandBlock {
    const TAG: u8 = BLOCK_COMMAND;
    const LEN: u16 = COMMAND_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        let target = reader.read_object_id("command target")?;
        let target2 = reader.read_object_id("command second target")?;
        let command_id = reader.read_u8("command id")?;
        reader.expect_zero_u8("command reserved byte")?;
        Ok(Self {
            stop_here,
            target,
            target2,
            command_id,
            x: reader.read_u16("command x")?,
            y: reader.read_u16("command y")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_object_id(self.target);
        writer.write_object_id(self.target2);
        writer.write_u8(self.command_id);
        writer.write_u8(0);
        writer.write_u16(self.x);
        writer.write_u16(self.y);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

/// Screen transition plus optional advice; `unknown` holds the eleven
/// reserved words that follow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenBlock {
    pub stop_here: bool,
    pub new_screen: u8,
    pub new_entrance: u8,
    pub advice_id: u16,
    pub advice_timer: u16,
    pub unknown: [u16; 11],
}

impl FixedBlock for ScreenBlock {
    const TAG: u8 = BLOCK_SCREEN;
    const LEN: u16 = SCREEN_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        let new_screen = reader.read_u8("new screen")?;
        let new_entrance = reader.read_u8("new entrance")?;
        let advice_id = reader.read_u16("advice id")?;
        let advice_timer = reader.read_u16("advice timer")?;
        let mut unknown = [0u16; 11];
        for (index, slot) in unknown.iter_mut().enumerate() {
            *slot = reader.read_u16(&format!("screen unknown{}", index + 6))?;
        }
        Ok(Self {
            stop_here,
            new_screen,
            new_entrance,
            advice_id,
            advice_timer,
            unknown,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_u8(self.new_screen);
        writer.write_u8(self.new_entrance);
        writer.write_u16(self.advice_id);
        writer.write_u16(self.advice_timer);
        for value in self.unknown {
            writer.write_u16(value);
        }
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathBlock {
    pub stop_here: bool,
    pub world: u16,
    pub screen: u16,
    pub entrance: u16,
    pub flags: u16,
}

impl FixedBlock for PathBlock {
    const TAG: u8 = BLOCK_PATH;
    const LEN: u16 = PATH_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        Ok(Self {
            stop_here,
            world: reader.read_u16("path world")?,
            screen: reader.read_u16("path screen")?,
            entrance: reader.read_u16("path entrance")?,
            flags: reader.read_u16("path flags")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_u16(self.world);
        writer.write_u16(self.screen);
        writer.write_u16(self.entrance);
        writer.write_u16(self.flags);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

/// Movie playback request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneralBlock {
    pub stop_here: bool,
    pub movie_id: u16,
    pub unknown: u16,
}

impl FixedBlock for GeneralBlock {
    const TAG: u8 = BLOCK_GENERAL;
    const LEN: u16 = GENERAL_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        Ok(Self {
            stop_here,
            movie_id: reader.read_u16("movie id")?,
            unknown: reader.read_u16("general unknown")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_u16(self.movie_id);
        writer.write_u16(self.unknown);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationBlock {
    pub stop_here: bool,
    pub world_id: u16,
    pub conversation_id: u16,
    pub response_id: u16,
    pub state_id: u16,
    pub action_id: u16,
}

impl FixedBlock for ConversationBlock {
    const TAG: u8 = BLOCK_CONVERSATION;
    const LEN: u16 = CONVERSATION_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        Ok(Self {
            stop_here,
            world_id: reader.read_u16("conversation world")?,
            conversation_id: reader.read_u16("conversation id")?,
            response_id: reader.read_u16("conversation response")?,
            state_id: reader.read_u16("conversation state")?,
            action_id: reader.read_u16("conversation action")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_u16(self.world_id);
        writer.write_u16(self.conversation_id);
        writer.write_u16(self.response_id);
        writer.write_u16(self.state_id);
        writer.write_u16(self.action_id);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeamBlock {
    pub stop_here: bool,
    pub world_id: u16,
    pub screen_id: u16,
}

impl FixedBlock for BeamBlock {
    const TAG: u8 = BLOCK_BEAMDOWN;
    const LEN: u16 = BEAM_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        Ok(Self {
            stop_here,
            world_id: reader.read_u16("beam world")?,
            screen_id: reader.read_u16("beam screen")?,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_u16(self.world_id);
        writer.write_u16(self.screen_id);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerBlock {
    pub stop_here: bool,
    pub trigger_id: u32,
    pub enable_trigger: bool,
}

impl FixedBlock for TriggerBlock {
    const TAG: u8 = BLOCK_TRIGGER;
    const LEN: u16 = TRIGGER_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        let trigger_id = reader.read_u32("trigger id")?;
        let enable_trigger = reader.read_bool("trigger enable flag")?;
        reader.expect_zero_u8("trigger reserved byte")?;
        Ok(Self {
            stop_here,
            trigger_id,
            enable_trigger,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_u32(self.trigger_id);
        writer.write_bool(self.enable_trigger);
        writer.write_u8(0);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

/// Starts a conversation (optionally as a subspace hail).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommunicateBlock {
    pub stop_here: bool,
    pub target: ObjectId,
    pub conversation_id: u16,
    pub situation_id: u16,
    pub hail_type: u8,
}

impl FixedBlock for CommunicateBlock {
    const TAG: u8 = BLOCK_COMMUNICATE;
    const LEN: u16 = COMMUNICATE_LEN;

    fn read_payload<R: Read>(reader: &mut BlockReader<R>, stop_here: bool) -> Result<Self> {
        let target = reader.read_object_id("communicate target")?;
        let conversation_id = reader.read_u16("communicate conversation")?;
        let situation_id = reader.read_u16("communicate situation")?;
        let hail_type = reader.read_u8("hail type")?;
        reader.expect_zero_u8("communicate reserved byte")?;
        Ok(Self {
            stop_here,
            target,
            conversation_id,
            situation_id,
            hail_type,
        })
    }

    fn write_payload(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_object_id(self.target);
        writer.write_u16(self.conversation_id);
        writer.write_u16(self.situation_id);
        writer.write_u8(self.hail_type);
        writer.write_u8(0);
        Ok(())
    }

    fn stop_here(&self) -> bool {
        self.stop_here
    }
}

/// Two nested alternative lists. Execution is not understood yet; the lists
/// are kept so the data round-trips.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceBlock {
    pub stop_here: bool,
    pub choice_id: u16,
    pub unknown: u16,
    pub first: EntryList,
    pub second: EntryList,
}

impl ChoiceBlock {
    fn read_from<R: Read>(reader: &mut BlockReader<R>) -> Result<Self> {
        let start = reader.expect_length(BLOCK_CHOICE, CHOICE_LEN)?;
        let stop_here = reader.read_bool("stop_here flag")?;
        reader.expect_zero_u8("entry reserved byte")?;
        let choice_id = reader.read_u16("choice id")?;
        let unknown = reader.read_u16("choice unknown")?;
        reader.finish_payload(BLOCK_CHOICE, start, CHOICE_LEN)?;

        let tag = reader.expect_block_header("first choice list")?;
        if tag != BLOCK_CHOICE1 {
            bail!(corrupt!("choice block followed by {} instead of choice 1", block_name(tag)));
        }
        let first = EntryList::read_from(reader).context("reading first choice list")?;

        let tag = reader.expect_block_header("second choice list")?;
        if tag != BLOCK_CHOICE2 {
            bail!(corrupt!(
                "first choice list followed by {} instead of choice 2",
                block_name(tag)
            ));
        }
        let second = EntryList::read_from(reader).context("reading second choice list")?;

        Ok(Self {
            stop_here,
            choice_id,
            unknown,
            first,
            second,
        })
    }

    fn write_to(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_block_header(BLOCK_CHOICE);
        let at = writer.begin_payload();
        writer.write_bool(self.stop_here);
        writer.write_u8(0);
        writer.write_u16(self.choice_id);
        writer.write_u16(self.unknown);
        writer.end_payload(BLOCK_CHOICE, at, CHOICE_LEN)?;
        writer.write_block_header(BLOCK_CHOICE1);
        self.first.write_to(writer)?;
        writer.write_block_header(BLOCK_CHOICE2);
        self.second.write_to(writer)
    }
}

/// One logical entry of a branch. Repeating block types are grouped into the
/// run they were stored in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entry {
    Condition(ConditionBlock),
    Alter(Vec<AlterBlock>),
    Reaction(Vec<ReactionBlock>),
    Command(Vec<CommandBlock>),
    Screen(ScreenBlock),
    Path(PathBlock),
    General(GeneralBlock),
    Conversation(Vec<ConversationBlock>),
    Beam(BeamBlock),
    Trigger(Vec<TriggerBlock>),
    Communicate(CommunicateBlock),
    Choice(ChoiceBlock),
}

impl Entry {
    pub fn kind_name(&self) -> &'static str {
        let tag = match self {
            Entry::Condition(_) => BLOCK_CONDITION,
            Entry::Alter(_) => BLOCK_ALTER,
            Entry::Reaction(_) => BLOCK_REACTION,
            Entry::Command(_) => BLOCK_COMMAND,
            Entry::Screen(_) => BLOCK_SCREEN,
            Entry::Path(_) => BLOCK_PATH,
            Entry::General(_) => BLOCK_GENERAL,
            Entry::Conversation(_) => BLOCK_CONVERSATION,
            Entry::Beam(_) => BLOCK_BEAMDOWN,
            Entry::Trigger(_) => BLOCK_TRIGGER,
            Entry::Communicate(_) => BLOCK_COMMUNICATE,
            Entry::Choice(_) => BLOCK_CHOICE,
        };
        block_name(tag)
    }

    fn read_from<R: Read>(tag: u8, reader: &mut BlockReader<R>) -> Result<Self> {
        let entry = match tag {
            BLOCK_CONDITION => Entry::Condition(read_fixed(reader)?),
            BLOCK_ALTER => Entry::Alter(read_run(reader)?),
            BLOCK_REACTION => Entry::Reaction(read_run(reader)?),
            BLOCK_COMMAND => Entry::Command(read_run(reader)?),
            BLOCK_SCREEN => Entry::Screen(read_fixed(reader)?),
            BLOCK_PATH => Entry::Path(read_fixed(reader)?),
            BLOCK_GENERAL => Entry::General(read_fixed(reader)?),
            BLOCK_CONVERSATION => Entry::Conversation(read_run(reader)?),
            BLOCK_BEAMDOWN => Entry::Beam(read_fixed(reader)?),
            BLOCK_TRIGGER => Entry::Trigger(read_run(reader)?),
            BLOCK_COMMUNICATE => Entry::Communicate(read_fixed(reader)?),
            BLOCK_CHOICE => Entry::Choice(ChoiceBlock::read_from(reader)?),
            other => bail!(corrupt!(
                "unexpected {} block ({:#04x}) inside an entry at offset {}",
                block_name(other),
                other,
                reader.offset()
            )),
        };
        Ok(entry)
    }

    fn write_to(&self, writer: &mut BlockWriter) -> Result<()> {
        match self {
            Entry::Condition(block) => write_fixed(block, writer),
            Entry::Alter(blocks) => write_run(blocks, writer),
            Entry::Reaction(blocks) => write_run(blocks, writer),
            Entry::Command(blocks) => write_run(blocks, writer),
            Entry::Screen(block) => write_fixed(block, writer),
            Entry::Path(block) => write_fixed(block, writer),
            Entry::General(block) => write_fixed(block, writer),
            Entry::Conversation(blocks) => write_run(blocks, writer),
            Entry::Beam(block) => write_fixed(block, writer),
            Entry::Trigger(blocks) => write_run(blocks, writer),
            Entry::Communicate(block) => write_fixed(block, writer),
            Entry::Choice(block) => block.write_to(writer),
        }
    }
}

/// Ordered alternative branches; at most one of them runs per execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryList {
    pub branches: Vec<Vec<Entry>>,
}

impl EntryList {
    pub fn new(branches: Vec<Vec<Entry>>) -> Self {
        Self { branches }
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    pub fn read_from<R: Read>(reader: &mut BlockReader<R>) -> Result<Self> {
        let count = reader.read_u8("entry list branch count")?;
        let mut branches = Vec::with_capacity(count as usize);
        for index in 0..count {
            let mut entries = Vec::new();
            loop {
                let tag = reader
                    .expect_block_header("entry block")
                    .with_context(|| format!("reading branch {index}"))?;
                if tag == BLOCK_END_ENTRY {
                    break;
                }
                let entry = Entry::read_from(tag, reader)
                    .with_context(|| format!("reading branch {index}"))?;
                entries.push(entry);
            }
            branches.push(entries);
        }
        Ok(Self { branches })
    }

    pub fn write_to(&self, writer: &mut BlockWriter) -> Result<()> {
        let count = u8::try_from(self.branches.len()).with_context(|| {
            format!("{} branches do not fit in an entry list", self.branches.len())
        })?;
        writer.write_u8(count);
        for entries in &self.branches {
            for entry in entries {
                entry.write_to(writer)?;
            }
            writer.write_block_header(BLOCK_END_ENTRY);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(bytes: Vec<u8>) -> Result<EntryList> {
        let mut reader = BlockReader::new(Cursor::new(bytes));
        EntryList::read_from(&mut reader)
    }

    fn serialise(list: &EntryList) -> Vec<u8> {
        let mut writer = BlockWriter::new();
        list.write_to(&mut writer).unwrap();
        writer.into_bytes()
    }

    fn sample_list() -> EntryList {
        let condition = ConditionBlock {
            target: ObjectId::new(1, 2, 3),
            counter_when: COUNTER_DO_WHEN,
            counter_value: 2,
            ..Default::default()
        };
        let alter = AlterBlock {
            target: ObjectId::new(1, 2, 4),
            alter_state: 1,
            alter_name: "Tricorder".into(),
            ..Default::default()
        };
        let nested = EntryList::new(vec![vec![Entry::General(GeneralBlock {
            stop_here: true,
            movie_id: 12,
            unknown: 0,
        })]]);
        EntryList::new(vec![
            vec![
                Entry::Condition(condition),
                Entry::Alter(vec![alter.clone(), alter]),
                Entry::Trigger(vec![TriggerBlock {
                    stop_here: false,
                    trigger_id: 7,
                    enable_trigger: true,
                }]),
            ],
            vec![
                Entry::Screen(ScreenBlock {
                    stop_here: false,
                    new_screen: 3,
                    new_entrance: 1,
                    advice_id: NONE_U16,
                    advice_timer: 0,
                    unknown: [NONE_U16; 11],
                }),
                Entry::Choice(ChoiceBlock {
                    stop_here: false,
                    choice_id: 1,
                    unknown: 0,
                    first: nested,
                    second: EntryList::default(),
                }),
            ],
            Vec::new(),
        ])
    }

    #[test]
    fn entry_list_round_trips_byte_for_byte() {
        let list = sample_list();
        let bytes = serialise(&list);
        let parsed = parse(bytes.clone()).unwrap();
        assert_eq!(parsed, list);
        assert_eq!(serialise(&parsed), bytes);
    }

    #[test]
    fn declared_lengths_match_layouts() {
        // Each write verifies the payload size against the declared constant.
        let list = EntryList::new(vec![vec![
            Entry::Condition(ConditionBlock::default()),
            Entry::Alter(vec![AlterBlock::default()]),
            Entry::Reaction(vec![ReactionBlock {
                stop_here: false,
                target: ObjectId::NONE,
                dest: ObjectId::NONE,
                reaction_type: 0,
                unknown1: 0,
                unknown2: 0,
            }]),
            Entry::Command(vec![CommandBlock {
                stop_here: false,
                target: ObjectId::NONE,
                target2: ObjectId::NONE,
                command_id: COMMAND_USE,
                x: NONE_U16,
                y: NONE_U16,
            }]),
            Entry::Path(PathBlock {
                stop_here: false,
                world: 1,
                screen: 2,
                entrance: 3,
                flags: 0,
            }),
            Entry::Conversation(vec![ConversationBlock {
                stop_here: false,
                world_id: 1,
                conversation_id: 2,
                response_id: 3,
                state_id: 4,
                action_id: CONVERSATION_ACTION_ENABLE,
            }]),
            Entry::Beam(BeamBlock {
                stop_here: false,
                world_id: 1,
                screen_id: 2,
            }),
            Entry::Communicate(CommunicateBlock {
                stop_here: true,
                target: ObjectId::new(2, 0, 1),
                conversation_id: 5,
                situation_id: 0,
                hail_type: NONE_U8,
            }),
        ]]);
        let bytes = serialise(&list);
        assert_eq!(parse(bytes).unwrap(), list);
    }

    #[test]
    fn run_interrupted_by_other_type_is_corrupt() {
        let mut writer = BlockWriter::new();
        writer.write_u8(1);
        let trigger = TriggerBlock {
            stop_here: false,
            trigger_id: 1,
            enable_trigger: false,
        };
        write_fixed(&trigger, &mut writer).unwrap();
        let general = GeneralBlock {
            stop_here: false,
            movie_id: 1,
            unknown: 0,
        };
        write_fixed(&general, &mut writer).unwrap();
        let err = parse(writer.into_bytes()).unwrap_err();
        assert!(is_corrupt(&err), "{err:?}");
    }

    #[test]
    fn wrong_declared_length_is_corrupt() {
        let list = EntryList::new(vec![vec![Entry::Beam(BeamBlock {
            stop_here: false,
            world_id: 1,
            screen_id: 2,
        })]]);
        let mut bytes = serialise(&list);
        // count, tag, marker, then the length word.
        bytes[3] = (BEAM_LEN + 1) as u8;
        let err = parse(bytes).unwrap_err();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn missing_end_entry_is_corrupt() {
        let mut bytes = serialise(&sample_list());
        bytes.truncate(bytes.len() - 2);
        let err = parse(bytes).unwrap_err();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn stop_here_must_be_boolean() {
        let list = EntryList::new(vec![vec![Entry::General(GeneralBlock {
            stop_here: false,
            movie_id: 3,
            unknown: 0,
        })]]);
        let mut bytes = serialise(&list);
        bytes[5] = 2;
        assert!(is_corrupt(&parse(bytes).unwrap_err()));
    }
}

//! Object records (`o_WWSSII.bst`): a fixed header, optional descriptions and
//! one entry list per verb.

use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::block::*;
use crate::entry::EntryList;
use crate::object_id::ObjectId;

pub const OBJECT_HEADER_LEN: u16 = 68;

pub const OBJFLAG_ACTIVE: u16 = 0x01;
pub const OBJFLAG_WALK: u16 = 0x02;
pub const OBJFLAG_USE: u16 = 0x04;
pub const OBJFLAG_TALK: u16 = 0x08;
pub const OBJFLAG_GET: u16 = 0x10;
pub const OBJFLAG_LOOK: u16 = 0x20;
pub const OBJFLAG_INVENTORY: u16 = 0x40;
pub const OBJFLAG_STUNNED: u16 = 0x80;

const NAME_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkType {
    Normal,
    Scaled,
    TransitionSquare,
    ActionSquare,
}

impl WalkType {
    fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => WalkType::Normal,
            1 => WalkType::Scaled,
            2 => WalkType::TransitionSquare,
            3 => WalkType::ActionSquare,
            other => bail!(corrupt!("walk type {other} out of range")),
        })
    }

    fn raw(self) -> u8 {
        match self {
            WalkType::Normal => 0,
            WalkType::Scaled => 1,
            WalkType::TransitionSquare => 2,
            WalkType::ActionSquare => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Description {
    pub entry_id: u8,
    pub voice_group: u8,
    pub voice_subgroup: u8,
    pub voice_id: u16,
    pub text: String,
}

/// Parsed object file. Runtime state lives in the engine's object table; this
/// is only the on-disk shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub curr_screen: u8,
    pub walk_type: WalkType,
    pub width: u16,
    pub height: u16,
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub y_adjust: i16,
    pub universe_x: i32,
    pub universe_y: i32,
    pub universe_z: i32,
    pub flags: u16,
    pub state: u8,
    pub skills: u16,
    pub timer: u16,
    pub transition: ObjectId,
    pub cursor_id: u8,
    pub cursor_flag: u8,
    pub sprite_id: u16,
    pub name: String,
    pub descriptions: Vec<Description>,
    pub use_entries: Option<EntryList>,
    pub get_entries: Option<EntryList>,
    pub look_entries: Option<EntryList>,
    pub timer_entries: Option<EntryList>,
}

impl ObjectRecord {
    /// A blank record for `id`, handy for building fixtures.
    pub fn new(id: ObjectId, name: &str) -> Self {
        Self {
            id,
            curr_screen: id.screen,
            walk_type: WalkType::Normal,
            width: 0,
            height: 0,
            x: 0,
            y: 0,
            z: 0,
            y_adjust: 0,
            universe_x: 0,
            universe_y: 0,
            universe_z: 0,
            flags: OBJFLAG_ACTIVE,
            state: 0,
            skills: 0,
            timer: 0,
            transition: ObjectId::NONE,
            cursor_id: 0,
            cursor_flag: 0,
            sprite_id: 0,
            name: name.to_string(),
            descriptions: Vec::new(),
            use_entries: None,
            get_entries: None,
            look_entries: None,
            timer_entries: None,
        }
    }

    /// Parse an object file. `expected` is the identity the caller asked for;
    /// a record claiming a different one is corrupt.
    pub fn read_from<R: Read>(reader: R, expected: ObjectId) -> Result<Self> {
        let mut reader = BlockReader::new(reader);
        let tag = reader.expect_block_header("object header")?;
        if tag != BLOCK_OBJ_HEADER {
            bail!(corrupt!("object file starts with {} block", block_name(tag)));
        }
        let mut record = read_header(&mut reader)?;
        if record.id != expected {
            bail!(corrupt!(
                "object file for {} contains object {}",
                expected,
                record.id
            ));
        }

        while let Some(tag) = reader.read_block_header()? {
            match tag {
                BLOCK_DESCRIPTION => {
                    let description = read_description(&mut reader)?;
                    record.descriptions.push(description);
                }
                BLOCK_USE_ENTRIES => read_verb_list(&mut reader, tag, &mut record.use_entries)?,
                BLOCK_GET_ENTRIES => read_verb_list(&mut reader, tag, &mut record.get_entries)?,
                BLOCK_LOOK_ENTRIES => read_verb_list(&mut reader, tag, &mut record.look_entries)?,
                BLOCK_TIMER_ENTRIES => {
                    read_verb_list(&mut reader, tag, &mut record.timer_entries)?
                }
                other => bail!(corrupt!(
                    "unexpected {} block ({:#04x}) in object {} at offset {}",
                    block_name(other),
                    other,
                    record.id,
                    reader.offset()
                )),
            }
        }
        Ok(record)
    }

    pub fn write_to(&self, writer: &mut BlockWriter) -> Result<()> {
        writer.write_block_header(BLOCK_OBJ_HEADER);
        let at = writer.begin_payload();
        writer.write_object_id(self.id);
        writer.write_u8(self.curr_screen);
        writer.write_u8(self.walk_type.raw());
        writer.write_u16(self.width);
        writer.write_u16(self.height);
        writer.write_i16(self.x);
        writer.write_i16(self.y);
        writer.write_i16(self.z);
        writer.write_i16(self.y_adjust);
        writer.write_i32(self.universe_x);
        writer.write_i32(self.universe_y);
        writer.write_i32(self.universe_z);
        writer.write_u16(self.flags);
        writer.write_u8(self.state);
        writer.write_u8(0);
        writer.write_u16(self.skills);
        writer.write_u16(self.timer);
        writer.write_object_id(self.transition);
        writer.write_u8(self.cursor_id);
        writer.write_u8(self.cursor_flag);
        writer.write_u16(self.sprite_id);
        writer.write_u16(0);
        writer.write_fixed_string(&self.name, NAME_LEN)?;
        writer.end_payload(BLOCK_OBJ_HEADER, at, OBJECT_HEADER_LEN)?;

        for description in &self.descriptions {
            writer.write_block_header(BLOCK_DESCRIPTION);
            writer.write_u8(description.entry_id);
            writer.write_u8(description.voice_group);
            writer.write_u8(description.voice_subgroup);
            writer.write_u8(0);
            writer.write_u16(description.voice_id);
            writer.write_cstring(&description.text)?;
        }

        let lists = [
            (BLOCK_USE_ENTRIES, &self.use_entries),
            (BLOCK_GET_ENTRIES, &self.get_entries),
            (BLOCK_LOOK_ENTRIES, &self.look_entries),
            (BLOCK_TIMER_ENTRIES, &self.timer_entries),
        ];
        for (tag, list) in lists {
            if let Some(list) = list {
                writer.write_block_header(tag);
                list.write_to(writer)
                    .with_context(|| format!("writing {} of {}", block_name(tag), self.id))?;
            }
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BlockWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

fn read_header<R: Read>(reader: &mut BlockReader<R>) -> Result<ObjectRecord> {
    let start = reader.expect_length(BLOCK_OBJ_HEADER, OBJECT_HEADER_LEN)?;
    let id = reader.read_object_id("object id")?;
    let curr_screen = reader.read_u8("current screen")?;
    let walk_type = WalkType::from_raw(reader.read_u8("walk type")?)?;
    let width = reader.read_u16("width")?;
    let height = reader.read_u16("height")?;
    let x = reader.read_i16("x")?;
    let y = reader.read_i16("y")?;
    let z = reader.read_i16("z")?;
    let y_adjust = reader.read_i16("y adjust")?;
    let universe_x = reader.read_i32("universe x")?;
    let universe_y = reader.read_i32("universe y")?;
    let universe_z = reader.read_i32("universe z")?;
    let flags = reader.read_u16("flags")?;
    let state = reader.read_u8("state")?;
    reader.expect_zero_u8("object reserved byte")?;
    let skills = reader.read_u16("skills")?;
    let timer = reader.read_u16("timer")?;
    let transition = reader.read_object_id("transition")?;
    let cursor_id = reader.read_u8("cursor id")?;
    let cursor_flag = reader.read_u8("cursor flag")?;
    let sprite_id = reader.read_u16("sprite id")?;
    reader.expect_zero_u16("object reserved word")?;
    let name = reader.read_fixed_string(NAME_LEN, "object name")?;
    reader.finish_payload(BLOCK_OBJ_HEADER, start, OBJECT_HEADER_LEN)?;

    Ok(ObjectRecord {
        id,
        curr_screen,
        walk_type,
        width,
        height,
        x,
        y,
        z,
        y_adjust,
        universe_x,
        universe_y,
        universe_z,
        flags,
        state,
        skills,
        timer,
        transition,
        cursor_id,
        cursor_flag,
        sprite_id,
        name,
        descriptions: Vec::new(),
        use_entries: None,
        get_entries: None,
        look_entries: None,
        timer_entries: None,
    })
}

fn read_description<R: Read>(reader: &mut BlockReader<R>) -> Result<Description> {
    let entry_id = reader.read_u8("description entry id")?;
    let voice_group = reader.read_u8("description voice group")?;
    let voice_subgroup = reader.read_u8("description voice subgroup")?;
    reader.expect_zero_u8("description reserved byte")?;
    let voice_id = reader.read_u16("description voice id")?;
    let text = reader.read_cstring("description text")?;
    Ok(Description {
        entry_id,
        voice_group,
        voice_subgroup,
        voice_id,
        text,
    })
}

fn read_verb_list<R: Read>(
    reader: &mut BlockReader<R>,
    tag: u8,
    slot: &mut Option<EntryList>,
) -> Result<()> {
    if slot.is_some() {
        bail!(corrupt!("duplicate {} block", block_name(tag)));
    }
    let list =
        EntryList::read_from(reader).with_context(|| format!("reading {}", block_name(tag)))?;
    *slot = Some(list);
    Ok(())
}

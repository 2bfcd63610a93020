//! `triggers.dat`: fixed 36-byte trigger records.

use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::block::*;
use crate::object_id::ObjectId;

pub const TRIGGERS_FILE_NAME: &str = "triggers.dat";
pub const TRIGGER_RECORD_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Normal,
    Timer,
    Proximity,
    Unused,
}

impl TriggerType {
    fn from_raw(raw: u32) -> Result<Self> {
        Ok(match raw {
            0 => TriggerType::Normal,
            1 => TriggerType::Timer,
            2 => TriggerType::Proximity,
            3 => TriggerType::Unused,
            other => bail!(corrupt!("trigger type {other} out of range")),
        })
    }

    fn raw(self) -> u32 {
        match self {
            TriggerType::Normal => 0,
            TriggerType::Timer => 1,
            TriggerType::Proximity => 2,
            TriggerType::Unused => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRecord {
    pub id: u32,
    pub trigger_type: TriggerType,
    pub target: ObjectId,
    pub enabled: bool,
    /// Milliseconds; 0 means the timer is not armed.
    pub timer_start: u32,
    pub target_time: u32,
    pub dist: u16,
    pub reversed: bool,
    pub instant: bool,
    pub from: ObjectId,
    pub to: ObjectId,
}

impl TriggerRecord {
    pub fn new(id: u32, trigger_type: TriggerType, target: ObjectId) -> Self {
        Self {
            id,
            trigger_type,
            target,
            enabled: true,
            timer_start: 0,
            target_time: 0,
            dist: 0,
            reversed: false,
            instant: false,
            from: ObjectId::NONE,
            to: ObjectId::NONE,
        }
    }

    fn read_from<R: Read>(reader: &mut BlockReader<R>) -> Result<Self> {
        let start = reader.offset();
        let id = reader.read_u32("trigger id")?;
        let trigger_type = TriggerType::from_raw(reader.read_u32("trigger type")?)?;
        let target = reader.read_object_id("trigger target")?;
        let enabled = reader.read_bool("trigger enabled")?;
        reader.expect_zero_u8("trigger reserved byte")?;
        reader.expect_zero_u16("trigger reserved word")?;
        let record = Self {
            id,
            trigger_type,
            target,
            enabled,
            timer_start: reader.read_u32("timer start")?,
            target_time: reader.read_u32("target time")?,
            dist: reader.read_u16("distance")?,
            reversed: reader.read_bool("reversed flag")?,
            instant: reader.read_bool("instant flag")?,
            from: reader.read_object_id("proximity from")?,
            to: reader.read_object_id("proximity to")?,
        };
        debug_assert_eq!(reader.offset() - start, TRIGGER_RECORD_LEN as u64);
        Ok(record)
    }

    fn write_to(&self, writer: &mut BlockWriter) {
        writer.write_u32(self.id);
        writer.write_u32(self.trigger_type.raw());
        writer.write_object_id(self.target);
        writer.write_bool(self.enabled);
        writer.write_u8(0);
        writer.write_u16(0);
        writer.write_u32(self.timer_start);
        writer.write_u32(self.target_time);
        writer.write_u16(self.dist);
        writer.write_bool(self.reversed);
        writer.write_bool(self.instant);
        writer.write_object_id(self.from);
        writer.write_object_id(self.to);
    }
}

/// Read all records; the file has no header, so a trailing partial record is
/// corrupt.
pub fn read_triggers<R: Read>(mut reader: R) -> Result<Vec<TriggerRecord>> {
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .context("reading trigger table")?;
    if bytes.len() % TRIGGER_RECORD_LEN != 0 {
        bail!(corrupt!(
            "trigger table is {} bytes, not a multiple of {}",
            bytes.len(),
            TRIGGER_RECORD_LEN
        ));
    }
    let count = bytes.len() / TRIGGER_RECORD_LEN;
    let mut reader = BlockReader::new(bytes.as_slice());
    let mut records = Vec::with_capacity(count);
    for index in 0..count {
        let record = TriggerRecord::read_from(&mut reader)
            .with_context(|| format!("reading trigger #{index}"))?;
        records.push(record);
    }
    Ok(records)
}

pub fn write_triggers(records: &[TriggerRecord]) -> Vec<u8> {
    let mut writer = BlockWriter::new();
    for record in records {
        record.write_to(&mut writer);
    }
    writer.into_bytes()
}

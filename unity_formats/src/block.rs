//! Tagged block primitives shared by the object, conversation and trigger
//! formats.
//!
//! Every block starts with a one-byte tag followed by the `0x11` marker. Most
//! entry blocks then declare their payload length as a `u16`, which must match
//! the fixed size for that block type: a single misaligned read would turn the
//! rest of the stream into garbage, so any mismatch is treated as a corrupt
//! asset rather than something to recover from.

use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

use crate::object_id::ObjectId;

/// Structural violation in an asset file (bad tag, length, marker, padding or
/// a truncated record).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("corrupt asset: {0}")]
pub struct CorruptAsset(pub String);

/// Build a [`CorruptAsset`] from format arguments.
#[macro_export]
macro_rules! corrupt {
    ($($arg:tt)*) => {
        $crate::block::CorruptAsset(format!($($arg)*))
    };
}

/// Returns true when the error chain carries a [`CorruptAsset`].
pub fn is_corrupt(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<CorruptAsset>())
}

pub const BLOCK_MARKER: u8 = 0x11;

pub const BLOCK_OBJ_HEADER: u8 = 0x00;
pub const BLOCK_DESCRIPTION: u8 = 0x01;
pub const BLOCK_USE_ENTRIES: u8 = 0x02;
pub const BLOCK_GET_ENTRIES: u8 = 0x03;
pub const BLOCK_LOOK_ENTRIES: u8 = 0x04;
pub const BLOCK_TIMER_ENTRIES: u8 = 0x05;

pub const BLOCK_CONDITION: u8 = 0x06;
pub const BLOCK_ALTER: u8 = 0x07;
pub const BLOCK_REACTION: u8 = 0x08;
pub const BLOCK_COMMAND: u8 = 0x09;
pub const BLOCK_SCREEN: u8 = 0x0a;
pub const BLOCK_PATH: u8 = 0x0b;
pub const BLOCK_GENERAL: u8 = 0x0c;
pub const BLOCK_CONVERSATION: u8 = 0x0d;
pub const BLOCK_BEAMDOWN: u8 = 0x0e;
pub const BLOCK_TRIGGER: u8 = 0x0f;
pub const BLOCK_COMMUNICATE: u8 = 0x10;
pub const BLOCK_CHOICE: u8 = 0x11;

pub const BLOCK_END_ENTRY: u8 = 0x12;
pub const BLOCK_END_BLOCK: u8 = 0x13;
pub const BLOCK_CHOICE1: u8 = 0x14;
pub const BLOCK_CHOICE2: u8 = 0x15;

pub const BLOCK_CONV_RESPONSE: u8 = 0x19;
pub const BLOCK_CONV_WHOCANSAY: u8 = 0x1a;
pub const BLOCK_CONV_TEXT: u8 = 0x1b;
pub const BLOCK_CONV_CHANGEACT_DISABLE: u8 = 0x1c;
pub const BLOCK_CONV_CHANGEACT_ENABLE: u8 = 0x1d;
pub const BLOCK_CONV_RESULT: u8 = 0x1e;

/// Human readable block name used in diagnostics.
pub fn block_name(tag: u8) -> &'static str {
    match tag {
        BLOCK_OBJ_HEADER => "object header",
        BLOCK_DESCRIPTION => "description",
        BLOCK_USE_ENTRIES => "use entries",
        BLOCK_GET_ENTRIES => "get entries",
        BLOCK_LOOK_ENTRIES => "look entries",
        BLOCK_TIMER_ENTRIES => "timer entries",
        BLOCK_CONDITION => "condition",
        BLOCK_ALTER => "alter",
        BLOCK_REACTION => "reaction",
        BLOCK_COMMAND => "command",
        BLOCK_SCREEN => "screen",
        BLOCK_PATH => "path",
        BLOCK_GENERAL => "general",
        BLOCK_CONVERSATION => "conversation",
        BLOCK_BEAMDOWN => "beamdown",
        BLOCK_TRIGGER => "trigger",
        BLOCK_COMMUNICATE => "communicate",
        BLOCK_CHOICE => "choice",
        BLOCK_END_ENTRY => "end entry",
        BLOCK_END_BLOCK => "end block",
        BLOCK_CHOICE1 => "choice 1",
        BLOCK_CHOICE2 => "choice 2",
        BLOCK_CONV_RESPONSE => "response",
        BLOCK_CONV_WHOCANSAY => "who can say",
        BLOCK_CONV_TEXT => "text",
        BLOCK_CONV_CHANGEACT_DISABLE => "change action (disable)",
        BLOCK_CONV_CHANGEACT_ENABLE => "change action (enable)",
        BLOCK_CONV_RESULT => "result",
        _ => "unknown",
    }
}

/// Sequential little-endian reader that tracks its offset for diagnostics and
/// turns premature EOF into [`CorruptAsset`].
pub struct BlockReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Bytes consumed so far.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Read a block header. EOF on the tag byte is the only clean end of a
    /// block stream and yields `None`.
    pub fn read_block_header(&mut self) -> Result<Option<u8>> {
        let tag = match self.inner.read_u8() {
            Ok(tag) => tag,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err).context("failed to read block tag"),
        };
        self.offset += 1;
        let marker = self.read_u8("block marker")?;
        if marker != BLOCK_MARKER {
            bail!(corrupt!(
                "block {:#04x} ({}) has marker {:#04x} at offset {}",
                tag,
                block_name(tag),
                marker,
                self.offset - 1
            ));
        }
        Ok(Some(tag))
    }

    /// Read a block header where the stream must not end.
    pub fn expect_block_header(&mut self, what: &str) -> Result<u8> {
        match self.read_block_header()? {
            Some(tag) => Ok(tag),
            None => bail!(corrupt!("stream ended while expecting {what}")),
        }
    }

    /// Read the declared payload length and verify it against the fixed size
    /// for `tag`. Returns the payload start offset for [`Self::finish_payload`].
    pub fn expect_length(&mut self, tag: u8, expected: u16) -> Result<u64> {
        let declared = self.read_u16("declared block length")?;
        if declared != expected {
            bail!(corrupt!(
                "{} block declares {} bytes, expected {} (offset {})",
                block_name(tag),
                declared,
                expected,
                self.offset - 2
            ));
        }
        Ok(self.offset)
    }

    /// Verify that exactly `expected` bytes were consumed since `start`.
    pub fn finish_payload(&self, tag: u8, start: u64, expected: u16) -> Result<()> {
        let consumed = self.offset - start;
        if consumed != u64::from(expected) {
            bail!(corrupt!(
                "{} block consumed {} bytes of a {} byte payload",
                block_name(tag),
                consumed,
                expected
            ));
        }
        Ok(())
    }

    fn map_err(&self, err: io::Error, what: &str) -> anyhow::Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            anyhow::Error::new(corrupt!("truncated while reading {what} at offset {}", self.offset))
        } else {
            anyhow::Error::new(err).context(format!("failed to read {what}"))
        }
    }

    pub fn read_u8(&mut self, what: &str) -> Result<u8> {
        let value = self.inner.read_u8().map_err(|err| self.map_err(err, what))?;
        self.offset += 1;
        Ok(value)
    }

    pub fn read_u16(&mut self, what: &str) -> Result<u16> {
        let value = self
            .inner
            .read_u16::<LittleEndian>()
            .map_err(|err| self.map_err(err, what))?;
        self.offset += 2;
        Ok(value)
    }

    pub fn read_i16(&mut self, what: &str) -> Result<i16> {
        let value = self
            .inner
            .read_i16::<LittleEndian>()
            .map_err(|err| self.map_err(err, what))?;
        self.offset += 2;
        Ok(value)
    }

    pub fn read_u32(&mut self, what: &str) -> Result<u32> {
        let value = self
            .inner
            .read_u32::<LittleEndian>()
            .map_err(|err| self.map_err(err, what))?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_i32(&mut self, what: &str) -> Result<i32> {
        let value = self
            .inner
            .read_i32::<LittleEndian>()
            .map_err(|err| self.map_err(err, what))?;
        self.offset += 4;
        Ok(value)
    }

    pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .map_err(|err| self.map_err(err, what))?;
        self.offset += len as u64;
        Ok(buf)
    }

    pub fn read_bool(&mut self, what: &str) -> Result<bool> {
        match self.read_u8(what)? {
            0 => Ok(false),
            1 => Ok(true),
            other => bail!(corrupt!("{what} must be 0 or 1, found {other:#04x}")),
        }
    }

    /// Reserved byte that must be zero.
    pub fn expect_zero_u8(&mut self, what: &str) -> Result<()> {
        let value = self.read_u8(what)?;
        if value != 0 {
            bail!(corrupt!("{what} must be zero, found {value:#04x}"));
        }
        Ok(())
    }

    pub fn expect_zero_u16(&mut self, what: &str) -> Result<()> {
        let value = self.read_u16(what)?;
        if value != 0 {
            bail!(corrupt!("{what} must be zero, found {value:#06x}"));
        }
        Ok(())
    }

    pub fn read_object_id(&mut self, what: &str) -> Result<ObjectId> {
        let id = self.read_u8(what)?;
        let screen = self.read_u8(what)?;
        let world = self.read_u8(what)?;
        let unused = self.read_u8(what)?;
        if unused != 0 {
            bail!(corrupt!("{what} has non-zero padding byte {unused:#04x}"));
        }
        Ok(ObjectId::new(world, screen, id))
    }

    /// Fixed-width NUL padded string.
    pub fn read_fixed_string(&mut self, len: usize, what: &str) -> Result<String> {
        let raw = self.read_bytes(len, what)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        Ok(String::from_utf8_lossy(&raw[..end]).into_owned())
    }

    /// NUL terminated string.
    pub fn read_cstring(&mut self, what: &str) -> Result<String> {
        let mut raw = Vec::new();
        loop {
            match self.read_u8(what)? {
                0 => break,
                byte => raw.push(byte),
            }
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }
}

/// Append-only writer producing the exact byte layout [`BlockReader`] accepts.
#[derive(Debug, Default, Clone)]
pub struct BlockWriter {
    buf: Vec<u8>,
}

impl BlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_block_header(&mut self, tag: u8) {
        self.buf.push(tag);
        self.buf.push(BLOCK_MARKER);
    }

    /// Write a placeholder length; finish with [`Self::end_payload`].
    pub fn begin_payload(&mut self) -> usize {
        let at = self.buf.len();
        self.write_u16(0);
        at
    }

    /// Patch the length written by [`Self::begin_payload`] and verify it.
    pub fn end_payload(&mut self, tag: u8, at: usize, expected: u16) -> Result<()> {
        let written = self.buf.len() - at - 2;
        if written != expected as usize {
            bail!(
                "{} block serialised to {} bytes, expected {}",
                block_name(tag),
                written,
                expected
            );
        }
        self.buf[at..at + 2].copy_from_slice(&expected.to_le_bytes());
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        // Writing into a Vec cannot fail.
        let _ = self.buf.write_u16::<LittleEndian>(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        let _ = self.buf.write_i16::<LittleEndian>(value);
    }

    pub fn write_u32(&mut self, value: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(value);
    }

    pub fn write_i32(&mut self, value: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_object_id(&mut self, id: ObjectId) {
        self.buf.extend_from_slice(&[id.id, id.screen, id.world, 0]);
    }

    pub fn write_fixed_string(&mut self, value: &str, len: usize) -> Result<()> {
        let bytes = value.as_bytes();
        if bytes.len() >= len {
            bail!("string {value:?} does not fit in {len} bytes");
        }
        self.buf.extend_from_slice(bytes);
        self.buf.resize(self.buf.len() + (len - bytes.len()), 0);
        Ok(())
    }

    pub fn write_cstring(&mut self, value: &str) -> Result<()> {
        if value.as_bytes().contains(&0) {
            bail!("string {value:?} contains an interior NUL");
        }
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(0);
        Ok(())
    }
}

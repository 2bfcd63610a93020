//! FVF movie container: fixed header, one video and one audio description
//! and a stream of data blocks, each holding a run of frames.
//!
//! Only the profile shipped with the game is accepted (16bpp 320x200 at
//! 15fps, 22050Hz 8-bit mono audio). Every sub-block offset stored in a frame
//! header must agree with what has actually been consumed, so any
//! disagreement is reported as a corrupt asset.

use std::io::{self, Read, Seek, SeekFrom};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt};

use crate::block::*;

pub const FVF_MAGIC: &[u8; 4] = b"FVF ";
pub const FVF_VERSION: u16 = 1;

pub const FVF_HEADER_LEN: u32 = 20;
pub const FVF_VIDEO_HEADER_LEN: u16 = 16;
pub const FVF_AUDIO_HEADER_LEN: u16 = 12;
pub const FVF_BLOCK_HEADER_LEN: u32 = 8;
pub const FVF_FRAME_HEADER_LEN: u32 = 20;
pub const FVF_PALETTE_LEN: u32 = 4 + 256 * 2;

pub const FVF_WIDTH: u16 = 320;
pub const FVF_HEIGHT: u16 = 200;
pub const FVF_BPP: u16 = 16;
pub const FVF_FPS: u16 = 15;
pub const FVF_SAMPLE_RATE: u32 = 22050;
pub const FVF_SAMPLE_BITS: u16 = 8;
pub const FVF_CHANNELS: u16 = 1;

pub const FRAME_VIDEO_KEY: u16 = 0x1;
pub const FRAME_PALETTE: u16 = 0x2;
pub const FRAME_VIDEO_DELTA: u16 = 0x4;
pub const FRAME_AUDIO: u16 = 0x8;
const FRAME_KNOWN_FLAGS: u16 = FRAME_VIDEO_KEY | FRAME_PALETTE | FRAME_VIDEO_DELTA | FRAME_AUDIO;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FvfVideoInfo {
    pub bpp: u16,
    pub width: u16,
    pub height: u16,
    pub fps: u16,
    pub frame_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FvfAudioInfo {
    pub sample_rate: u32,
    pub bits: u16,
    pub channels: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FvfHeader {
    pub data_offset: u32,
    pub video: FvfVideoInfo,
    pub audio: FvfAudioInfo,
}

/// One frame as stored in the container. Video payloads are still encoded;
/// see [`crate::fvf_video`].
#[derive(Debug, Clone, PartialEq)]
pub struct FvfFrame {
    pub index: u32,
    pub flags: u16,
    pub video: Option<Vec<u8>>,
    pub palette: Option<[i16; 256]>,
    pub audio: Option<Vec<u8>>,
}

impl FvfFrame {
    pub fn has_video(&self) -> bool {
        self.flags & (FRAME_VIDEO_KEY | FRAME_VIDEO_DELTA) != 0
    }

    pub fn is_key(&self) -> bool {
        self.flags & FRAME_VIDEO_KEY != 0
    }
}

/// Sequential frame reader.
pub struct FvfReader<R> {
    reader: R,
    header: FvfHeader,
    frames_read: u32,
    block_size: u32,
    block_consumed: u32,
    block_frames_left: u16,
    finished: bool,
}

impl<R: Read + Seek> FvfReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let header = read_header(&mut reader).context("reading FVF header")?;
        reader
            .seek(SeekFrom::Start(u64::from(header.data_offset)))
            .context("seeking to FVF data blocks")?;
        Ok(Self {
            reader,
            header,
            frames_read: 0,
            block_size: 0,
            block_consumed: 0,
            block_frames_left: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> &FvfHeader {
        &self.header
    }

    pub fn frames_read(&self) -> u32 {
        self.frames_read
    }

    /// Next frame in stream order, or `None` once the data blocks are
    /// exhausted.
    pub fn next_frame(&mut self) -> Result<Option<FvfFrame>> {
        if self.finished {
            return Ok(None);
        }
        while self.block_frames_left == 0 {
            if !self.start_block()? {
                self.finished = true;
                return Ok(None);
            }
        }

        let index = self.frames_read;
        let (frame, size) = read_frame(&mut self.reader, index)
            .with_context(|| format!("reading FVF frame {index}"))?;
        self.frames_read += 1;
        self.block_frames_left -= 1;
        self.block_consumed = self.block_consumed.saturating_add(size);
        if self.block_frames_left == 0 && self.block_consumed != self.block_size {
            bail!(corrupt!(
                "data block declares {} bytes but its frames span {}",
                self.block_size,
                self.block_consumed
            ));
        }
        Ok(Some(frame))
    }

    fn start_block(&mut self) -> Result<bool> {
        let block_size = match self.reader.read_u32::<LittleEndian>() {
            Ok(size) => size,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                if self.frames_read != self.header.video.frame_count {
                    bail!(corrupt!(
                        "movie ended after {} of {} frames",
                        self.frames_read,
                        self.header.video.frame_count
                    ));
                }
                return Ok(false);
            }
            Err(err) => return Err(err).context("reading data block size"),
        };
        let mut block = BlockReader::new(&mut self.reader);
        let frame_count = block.read_u16("data block frame count")?;
        block.expect_zero_u16("data block reserved word")?;
        if block_size < FVF_BLOCK_HEADER_LEN {
            bail!(corrupt!("data block size {block_size} is smaller than its header"));
        }
        if frame_count == 0 && block_size != FVF_BLOCK_HEADER_LEN {
            bail!(corrupt!("empty data block declares {block_size} bytes"));
        }
        self.block_size = block_size;
        self.block_consumed = FVF_BLOCK_HEADER_LEN;
        self.block_frames_left = frame_count;
        Ok(true)
    }
}

impl<R: Read + Seek> Iterator for FvfReader<R> {
    type Item = Result<FvfFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => None,
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

fn read_header<R: Read + Seek>(reader: &mut R) -> Result<FvfHeader> {
    reader.seek(SeekFrom::Start(0)).context("rewinding FVF stream")?;
    let mut block = BlockReader::new(&mut *reader);
    let magic = block.read_bytes(4, "FVF magic")?;
    if magic.as_slice() != FVF_MAGIC {
        bail!(corrupt!("bad FVF magic {:02x?}", magic));
    }
    let version = block.read_u16("FVF version")?;
    if version != FVF_VERSION {
        bail!(corrupt!("unsupported FVF version {version}"));
    }
    block.expect_zero_u16("FVF reserved word")?;
    let data_offset = block.read_u32("data offset")?;
    let video_offset = block.read_u32("video header offset")?;
    let audio_offset = block.read_u32("audio header offset")?;

    reader
        .seek(SeekFrom::Start(u64::from(video_offset)))
        .context("seeking to video header")?;
    let mut block = BlockReader::new(&mut *reader);
    expect_field(&mut block, "video header length", FVF_VIDEO_HEADER_LEN)?;
    let bpp = block.read_u16("bits per pixel")?;
    let width = block.read_u16("width")?;
    let height = block.read_u16("height")?;
    let fps = block.read_u16("frame rate")?;
    block.expect_zero_u16("video header reserved word")?;
    let frame_count = block.read_u32("frame count")?;
    if (bpp, width, height, fps) != (FVF_BPP, FVF_WIDTH, FVF_HEIGHT, FVF_FPS) {
        bail!(corrupt!(
            "unsupported video profile {bpp}bpp {width}x{height} at {fps}fps"
        ));
    }

    reader
        .seek(SeekFrom::Start(u64::from(audio_offset)))
        .context("seeking to audio header")?;
    let mut block = BlockReader::new(&mut *reader);
    expect_field(&mut block, "audio header length", FVF_AUDIO_HEADER_LEN)?;
    let sample_rate = block.read_u32("sample rate")?;
    let bits = block.read_u16("sample bits")?;
    let channels = block.read_u16("channel count")?;
    block.expect_zero_u16("audio header reserved word")?;
    if (sample_rate, bits, channels) != (FVF_SAMPLE_RATE, FVF_SAMPLE_BITS, FVF_CHANNELS) {
        bail!(corrupt!(
            "unsupported audio profile {sample_rate}Hz {bits}-bit x{channels}"
        ));
    }

    Ok(FvfHeader {
        data_offset,
        video: FvfVideoInfo {
            bpp,
            width,
            height,
            fps,
            frame_count,
        },
        audio: FvfAudioInfo {
            sample_rate,
            bits,
            channels,
        },
    })
}

fn expect_field<R: Read>(block: &mut BlockReader<R>, what: &str, expected: u16) -> Result<()> {
    let value = block.read_u16(what)?;
    if value != expected {
        bail!(corrupt!("{what} is {value}, expected {expected}"));
    }
    Ok(())
}

fn check_presence(what: &str, offset: u32, flagged: bool) -> Result<()> {
    match (offset != 0, flagged) {
        (true, false) => bail!(corrupt!("{what} sub-block present but not flagged")),
        (false, true) => bail!(corrupt!("{what} sub-block flagged but absent")),
        _ => Ok(()),
    }
}

/// Read one sized sub-block whose offset must be exactly where the frame
/// reader currently is. The declared size must fit in what is left of the
/// frame.
fn read_sub_block<R: Read>(
    block: &mut BlockReader<R>,
    what: &str,
    offset: u32,
    frame_size: u32,
) -> Result<Vec<u8>> {
    if block.offset() != u64::from(offset) {
        bail!(corrupt!(
            "{what} sub-block offset {offset} disagrees with {} bytes read so far",
            block.offset()
        ));
    }
    let size = block.read_u32(what)?;
    if size < 4 {
        bail!(corrupt!("{what} sub-block size {size} is smaller than its size field"));
    }
    let remaining = u64::from(frame_size).saturating_sub(u64::from(offset));
    if u64::from(size) > remaining {
        bail!(corrupt!(
            "{what} sub-block size {size} exceeds the {remaining} bytes left in the frame"
        ));
    }
    block.read_bytes(size as usize - 4, what)
}

fn read_frame<R: Read>(reader: &mut R, index: u32) -> Result<(FvfFrame, u32)> {
    let mut block = BlockReader::new(reader);
    let frame_size = block.read_u32("frame size")?;
    let flags = block.read_u16("frame flags")?;
    if flags & !FRAME_KNOWN_FLAGS != 0 {
        bail!(corrupt!("unknown frame flags {flags:#06x}"));
    }
    if flags & FRAME_VIDEO_KEY != 0 && flags & FRAME_VIDEO_DELTA != 0 {
        bail!(corrupt!("frame is flagged both key and delta"));
    }
    block.expect_zero_u16("frame reserved word")?;
    let video_offset = block.read_u32("video offset")?;
    let palette_offset = block.read_u32("palette offset")?;
    let audio_offset = block.read_u32("audio offset")?;

    check_presence(
        "video",
        video_offset,
        flags & (FRAME_VIDEO_KEY | FRAME_VIDEO_DELTA) != 0,
    )?;
    check_presence("palette", palette_offset, flags & FRAME_PALETTE != 0)?;
    check_presence("audio", audio_offset, flags & FRAME_AUDIO != 0)?;

    let video = match video_offset {
        0 => None,
        offset => Some(read_sub_block(&mut block, "video", offset, frame_size)?),
    };
    let palette = match palette_offset {
        0 => None,
        offset => {
            let raw = read_sub_block(&mut block, "palette", offset, frame_size)?;
            if raw.len() as u32 + 4 != FVF_PALETTE_LEN {
                bail!(corrupt!(
                    "palette sub-block is {} bytes, expected {}",
                    raw.len() + 4,
                    FVF_PALETTE_LEN
                ));
            }
            let mut table = [0i16; 256];
            for (slot, pair) in table.iter_mut().zip(raw.chunks_exact(2)) {
                *slot = i16::from_le_bytes([pair[0], pair[1]]);
            }
            Some(table)
        }
    };
    let audio = match audio_offset {
        0 => None,
        offset => Some(read_sub_block(&mut block, "audio", offset, frame_size)?),
    };

    if block.offset() != u64::from(frame_size) {
        bail!(corrupt!(
            "frame declares {} bytes but {} were read",
            frame_size,
            block.offset()
        ));
    }

    Ok((
        FvfFrame {
            index,
            flags,
            video,
            palette,
            audio,
        },
        frame_size,
    ))
}

/// Serialise frames into a container using the supported profile. Used by
/// tests and tools that synthesise movies.
pub fn write_fvf(frames: &[FvfFrame], frames_per_block: usize) -> Result<Vec<u8>> {
    if frames_per_block == 0 {
        bail!("frames_per_block must be at least 1");
    }
    let video_offset = FVF_HEADER_LEN;
    let audio_offset = video_offset + u32::from(FVF_VIDEO_HEADER_LEN);
    let data_offset = audio_offset + u32::from(FVF_AUDIO_HEADER_LEN);

    let mut writer = BlockWriter::new();
    writer.write_bytes(FVF_MAGIC);
    writer.write_u16(FVF_VERSION);
    writer.write_u16(0);
    writer.write_u32(data_offset);
    writer.write_u32(video_offset);
    writer.write_u32(audio_offset);

    writer.write_u16(FVF_VIDEO_HEADER_LEN);
    writer.write_u16(FVF_BPP);
    writer.write_u16(FVF_WIDTH);
    writer.write_u16(FVF_HEIGHT);
    writer.write_u16(FVF_FPS);
    writer.write_u16(0);
    writer.write_u32(u32::try_from(frames.len()).context("too many frames")?);

    writer.write_u16(FVF_AUDIO_HEADER_LEN);
    writer.write_u32(FVF_SAMPLE_RATE);
    writer.write_u16(FVF_SAMPLE_BITS);
    writer.write_u16(FVF_CHANNELS);
    writer.write_u16(0);

    for chunk in frames.chunks(frames_per_block) {
        let mut body = BlockWriter::new();
        for frame in chunk {
            write_frame(frame, &mut body)?;
        }
        let block_size = FVF_BLOCK_HEADER_LEN as usize + body.len();
        writer.write_u32(u32::try_from(block_size).context("data block too large")?);
        writer.write_u16(chunk.len() as u16);
        writer.write_u16(0);
        writer.write_bytes(&body.into_bytes());
    }
    Ok(writer.into_bytes())
}

fn write_frame(frame: &FvfFrame, writer: &mut BlockWriter) -> Result<()> {
    let mut offset = FVF_FRAME_HEADER_LEN;
    let mut place = |present: bool, len: usize| -> u32 {
        if !present {
            return 0;
        }
        let at = offset;
        offset += 4 + len as u32;
        at
    };
    let video_offset = place(frame.video.is_some(), frame.video.as_ref().map_or(0, Vec::len));
    let palette_offset = place(frame.palette.is_some(), 512);
    let audio_offset = place(frame.audio.is_some(), frame.audio.as_ref().map_or(0, Vec::len));
    let frame_size = offset;

    writer.write_u32(frame_size);
    writer.write_u16(frame.flags);
    writer.write_u16(0);
    writer.write_u32(video_offset);
    writer.write_u32(palette_offset);
    writer.write_u32(audio_offset);
    if let Some(video) = &frame.video {
        writer.write_u32(4 + video.len() as u32);
        writer.write_bytes(video);
    }
    if let Some(palette) = &frame.palette {
        writer.write_u32(FVF_PALETTE_LEN);
        for value in palette {
            writer.write_i16(*value);
        }
    }
    if let Some(audio) = &frame.audio {
        writer.write_u32(4 + audio.len() as u32);
        writer.write_bytes(audio);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn frames() -> Vec<FvfFrame> {
        let mut palette = [0i16; 256];
        palette[1] = -7;
        vec![
            FvfFrame {
                index: 0,
                flags: FRAME_VIDEO_KEY | FRAME_PALETTE | FRAME_AUDIO,
                video: Some(vec![0x80, 0x00]),
                palette: Some(palette),
                audio: Some(vec![0x80; 1470]),
            },
            FvfFrame {
                index: 1,
                flags: FRAME_AUDIO,
                video: None,
                palette: None,
                audio: Some(vec![0x7f; 1470]),
            },
            FvfFrame {
                index: 2,
                flags: FRAME_VIDEO_DELTA,
                video: Some(vec![1, 2, 3]),
                palette: None,
                audio: None,
            },
        ]
    }

    #[test]
    fn frames_round_trip_across_blocks() {
        let bytes = write_fvf(&frames(), 2).unwrap();
        let reader = FvfReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.header().video.frame_count, 3);
        assert_eq!(reader.header().audio.sample_rate, FVF_SAMPLE_RATE);
        let parsed: Vec<FvfFrame> = reader.collect::<Result<_>>().unwrap();
        assert_eq!(parsed, frames());
        assert!(parsed[0].is_key());
        assert!(!parsed[1].has_video());
    }

    #[test]
    fn rejects_other_profiles() {
        let mut bytes = write_fvf(&frames(), 3).unwrap();
        // Width lives four bytes into the video header.
        let at = FVF_HEADER_LEN as usize + 4;
        bytes[at..at + 2].copy_from_slice(&640u16.to_le_bytes());
        let err = FvfReader::new(Cursor::new(bytes)).err().unwrap();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn flag_without_sub_block_is_corrupt() {
        let mut bytes = write_fvf(&frames()[1..2], 1).unwrap();
        let flags_at = 48 + 8 + 4;
        bytes[flags_at] |= FRAME_PALETTE as u8;
        let mut reader = FvfReader::new(Cursor::new(bytes)).unwrap();
        assert!(is_corrupt(&reader.next_frame().unwrap_err()));
    }

    #[test]
    fn offset_mismatch_is_corrupt() {
        let mut bytes = write_fvf(&frames()[2..3], 1).unwrap();
        let video_offset_at = 48 + 8 + 8;
        bytes[video_offset_at] = 24;
        let mut reader = FvfReader::new(Cursor::new(bytes)).unwrap();
        let err = reader.next_frame().unwrap_err();
        assert!(is_corrupt(&err));
        assert!(format!("{err:#}").contains("read so far"));
    }

    #[test]
    fn oversized_sub_block_is_rejected_before_reading() {
        let mut bytes = write_fvf(&frames()[2..3], 1).unwrap();
        let video_size_at = 48 + 8 + FVF_FRAME_HEADER_LEN as usize;
        bytes[video_size_at..video_size_at + 4].copy_from_slice(&0xffff_fff0u32.to_le_bytes());
        let mut reader = FvfReader::new(Cursor::new(bytes)).unwrap();
        let err = reader.next_frame().unwrap_err();
        assert!(is_corrupt(&err));
        assert!(format!("{err:#}").contains("left in the frame"));
    }

    #[test]
    fn block_size_mismatch_is_corrupt() {
        let mut bytes = write_fvf(&frames()[2..3], 1).unwrap();
        bytes[48] += 1;
        let mut reader = FvfReader::new(Cursor::new(bytes)).unwrap();
        assert!(is_corrupt(&reader.next_frame().unwrap_err()));
    }

    #[test]
    fn missing_frames_are_corrupt() {
        let mut bytes = write_fvf(&frames()[2..3], 1).unwrap();
        // Claim two frames in the video header.
        let at = FVF_HEADER_LEN as usize + 12;
        bytes[at] = 2;
        let mut reader = FvfReader::new(Cursor::new(bytes)).unwrap();
        assert!(reader.next_frame().unwrap().is_some());
        assert!(is_corrupt(&reader.next_frame().unwrap_err()));
    }
}

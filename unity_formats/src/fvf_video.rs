// SPDX-License-Identifier: GPL-2.0-or-later
//
// FVF video decoder.
//
// Frames are coded as two passes of 4x4 block operations against the previous
// picture (the back buffer): luma blocks first, then the two chroma planes.
// The decoder keeps a per-block status byte so unchanged regions are neither
// copied nor recomposited, which makes the block tiling and the status rules
// below load-bearing: a single wrong id shifts every later block.

use anyhow::{Result, bail, ensure};

use crate::fvf::FvfFrame;

pub const LUMA_WIDTH: usize = 320;
pub const LUMA_HEIGHT: usize = 200;
pub const CHROMA_WIDTH: usize = 160;
pub const CHROMA_HEIGHT: usize = 200;
/// First chroma row of the V plane; U occupies rows `0..100`.
pub const V_PLANE_ROW: usize = 100;

pub const LUMA_BLOCKS: usize = 4000;
pub const U_BLOCK_START: usize = 4000;
pub const V_BLOCK_START: usize = 5000;
pub const TOTAL_BLOCKS: usize = 6000;

const GRID_WIDTH: usize = 40;
const GRID_HEIGHT: usize = 25;

pub const STATUS_UNCHANGED: u8 = 0x1;
pub const STATUS_PREV_UNCHANGED: u8 = 0x2;
pub const STATUS_U_UNCHANGED: u8 = 0x4;
pub const STATUS_V_UNCHANGED: u8 = 0x8;
/// Luma block whose pixels and colour are identical to the last composite.
pub const STATUS_CLEAN: u8 = 0xf;

const MODIFIER_LEVELS: usize = 128;
const NO_MODIFIER: u8 = 0xff;

/// One picture: full resolution luma plus the two half resolution colour
/// planes stacked vertically.
#[derive(Debug, Clone, PartialEq)]
pub struct Planes {
    pub luma: Vec<u8>,
    pub chroma: Vec<u8>,
}

impl Planes {
    fn new() -> Self {
        Self {
            luma: vec![0; LUMA_WIDTH * LUMA_HEIGHT],
            chroma: vec![0x80; CHROMA_WIDTH * CHROMA_HEIGHT],
        }
    }
}

/// Block tiling shared by every decoder instance.
#[derive(Debug, Clone)]
pub struct BlockLayout {
    /// Byte offset of each block's top-left pixel within its plane.
    offsets: Vec<usize>,
    /// True for the top-left id of a full 2x2 macro cell.
    quad_starts: Vec<bool>,
    /// Status grid cell for every chroma block (`id - U_BLOCK_START`).
    chroma_cells: Vec<usize>,
}

impl BlockLayout {
    pub fn new() -> Self {
        let mut layout = Self {
            offsets: Vec::with_capacity(TOTAL_BLOCKS),
            quad_starts: Vec::with_capacity(TOTAL_BLOCKS),
            chroma_cells: Vec::with_capacity(TOTAL_BLOCKS - LUMA_BLOCKS),
        };
        layout.setup_block_id_to_offset();
        layout.setup_block_status_lookup();
        layout
    }

    fn setup_block_id_to_offset(&mut self) {
        self.tile_plane(LUMA_WIDTH / 4, LUMA_HEIGHT / 4, LUMA_WIDTH, 0);
        self.tile_plane(CHROMA_WIDTH / 4, V_PLANE_ROW / 4, CHROMA_WIDTH, 0);
        self.tile_plane(
            CHROMA_WIDTH / 4,
            (CHROMA_HEIGHT - V_PLANE_ROW) / 4,
            CHROMA_WIDTH,
            V_PLANE_ROW,
        );
        debug_assert_eq!(self.offsets.len(), TOTAL_BLOCKS);
    }

    /// Assign ids in macro cells of 2x2 blocks (TL, TR, BL, BR), row-major.
    /// An odd final block row is split into half cells holding TL and TR.
    fn tile_plane(&mut self, blocks_x: usize, blocks_y: usize, pitch: usize, first_row: usize) {
        let offset = |bx: usize, by: usize| (first_row + by * 4) * pitch + bx * 4;
        let mut by = 0;
        while by + 1 < blocks_y {
            for bx in (0..blocks_x).step_by(2) {
                self.offsets.push(offset(bx, by));
                self.offsets.push(offset(bx + 1, by));
                self.offsets.push(offset(bx, by + 1));
                self.offsets.push(offset(bx + 1, by + 1));
                self.quad_starts.extend([true, false, false, false]);
            }
            by += 2;
        }
        if by < blocks_y {
            for bx in (0..blocks_x).step_by(2) {
                self.offsets.push(offset(bx, by));
                self.offsets.push(offset(bx + 1, by));
                self.quad_starts.extend([false, false]);
            }
        }
    }

    /// Map each chroma block onto the 25x40 grid of luma macro cells it
    /// colours. Cell `c` covers luma ids `c * 4 .. c * 4 + 4`.
    fn setup_block_status_lookup(&mut self) {
        for id in U_BLOCK_START..TOTAL_BLOCKS {
            let row_base = if id < V_BLOCK_START { 0 } else { V_PLANE_ROW };
            let offset = self.offsets[id] - row_base * CHROMA_WIDTH;
            let bx = (offset % CHROMA_WIDTH) / 4;
            let by = (offset / CHROMA_WIDTH) / 4;
            debug_assert!(bx < GRID_WIDTH && by < GRID_HEIGHT);
            self.chroma_cells.push(by * GRID_WIDTH + bx);
        }
    }

    #[inline]
    pub fn offset(&self, id: usize) -> usize {
        self.offsets[id]
    }

    #[inline]
    pub fn is_quad_start(&self, id: usize) -> bool {
        self.quad_starts[id]
    }

    /// Luma ids coloured by chroma block `id`.
    pub fn luma_quad_for_chroma(&self, id: usize) -> std::ops::Range<usize> {
        let cell = self.chroma_cells[id - U_BLOCK_START];
        cell * 4..cell * 4 + 4
    }
}

impl Default for BlockLayout {
    fn default() -> Self {
        Self::new()
    }
}

/// `modify_lookup[(m << 8) | p]`: brightness ramp applied by copy operations.
fn build_modify_lookup() -> Vec<u8> {
    let mut table = vec![0u8; MODIFIER_LEVELS * 256];
    for m in 0..MODIFIER_LEVELS {
        let i = m.min(MODIFIER_LEVELS - 1 - m) as i32;
        for p in 0..256i32 {
            let value = 4 * i + (3 * p + 2) / 4;
            table[(m << 8) | p as usize] = value.clamp(0, 255) as u8;
        }
    }
    table
}

fn default_storage() -> [i16; 256] {
    std::array::from_fn(|i| i as i16 - 128)
}

struct OpStream<'a> {
    data: &'a [u8],
    pos: usize,
}

impl OpStream<'_> {
    fn byte(&mut self, what: &str) -> Result<u8> {
        let Some(&value) = self.data.get(self.pos) else {
            bail!(corrupt!(
                "video stream truncated reading {what} at byte {}",
                self.pos
            ));
        };
        self.pos += 1;
        Ok(value)
    }

    fn word(&mut self, what: &str) -> Result<u16> {
        let low = self.byte(what)?;
        let high = self.byte(what)?;
        Ok(u16::from_le_bytes([low, high]))
    }
}

/// Borrowed state for one decode pass over `first..end`.
struct Pass<'a> {
    dst: &'a mut [u8],
    src: &'a [u8],
    pitch: usize,
    first: usize,
    end: usize,
    status: &'a mut [u8],
    layout: &'a BlockLayout,
    modify: &'a [u8],
}

impl Pass<'_> {
    fn run(&mut self, stream: &mut OpStream<'_>) -> Result<()> {
        let mut id = self.first;
        while id < self.end {
            let code = stream.byte("opcode")?;
            let (op, arg) = (code >> 5, code & 0x1f);
            id = match op {
                0..=3 => {
                    self.copy_op(op, arg, id, stream)?;
                    id + 1
                }
                4 => {
                    let count = match arg {
                        0 => 32 + usize::from(stream.byte("passthrough length")?),
                        n => usize::from(n),
                    };
                    self.check_span(id, count, "passthrough run")?;
                    for block in id..id + count {
                        self.passthrough(block);
                    }
                    id + count
                }
                5 => {
                    self.literal_op(arg, id, stream)?;
                    id + 1
                }
                6 => {
                    let count = usize::from(arg) + 1;
                    self.check_span(id, count, "fill run")?;
                    let value = stream.byte("fill value")?;
                    for block in id..id + count {
                        self.fill(block, 4, value);
                    }
                    id + count
                }
                _ => {
                    self.double_op(arg, id, stream)?;
                    id + 4
                }
            };
        }
        Ok(())
    }

    fn check_span(&self, id: usize, count: usize, what: &str) -> Result<()> {
        if id + count > self.end {
            bail!(corrupt!(
                "{what} of {count} blocks at {id} overruns the pass ending at {}",
                self.end
            ));
        }
        Ok(())
    }

    fn source(&self, raw: u16, quad: bool) -> Result<usize> {
        let src = usize::from(raw);
        if src < self.first || src >= self.end {
            bail!(corrupt!(
                "copy source {src} outside pass {}..{}",
                self.first,
                self.end
            ));
        }
        if quad && !self.layout.is_quad_start(src) {
            bail!(corrupt!("double-size copy source {src} is not a full quad"));
        }
        Ok(src)
    }

    /// Ops 0-3: copy one block with optional mirroring and brightness ramp.
    fn copy_op(&mut self, mode: u8, arg: u8, id: usize, stream: &mut OpStream<'_>) -> Result<()> {
        if arg & 0x0f != 0 {
            bail!(corrupt!("copy opcode with stray argument bits {arg:#04x}"));
        }
        let src = self.source(stream.word("copy source")?, false)?;
        let modifier = if arg & 0x10 != 0 {
            let m = stream.byte("copy modifier")?;
            if usize::from(m) >= MODIFIER_LEVELS {
                bail!(corrupt!("copy modifier {m:#04x} out of range"));
            }
            Some(m)
        } else {
            None
        };
        self.copy_block(id, src, 4, mode, modifier);
        Ok(())
    }

    fn literal_op(&mut self, arg: u8, id: usize, stream: &mut OpStream<'_>) -> Result<()> {
        if arg & 0x10 != 0 {
            bail!(corrupt!("literal opcode with reserved bit set"));
        }
        let base = self.layout.offset(id);
        for row in 0..4 {
            let at = base + row * self.pitch;
            if arg & (1 << row) != 0 {
                for x in 0..4 {
                    self.dst[at + x] = stream.byte("literal pixel")?;
                }
            } else {
                self.dst[at..at + 4].copy_from_slice(&self.src[at..at + 4]);
            }
        }
        Ok(())
    }

    /// Op 7: the same operations on a whole 8x8 macro cell.
    fn double_op(&mut self, arg: u8, id: usize, stream: &mut OpStream<'_>) -> Result<()> {
        if arg & 0x10 != 0 {
            bail!(corrupt!("double-size opcode with reserved bit set"));
        }
        if !self.layout.is_quad_start(id) || id + 4 > self.end {
            bail!(corrupt!("double-size opcode at block {id} does not start a full quad"));
        }
        match arg & 0x0f {
            mode @ 0..=3 => {
                let src = self.source(stream.word("double copy source")?, true)?;
                let modifier = match stream.byte("double copy modifier")? {
                    NO_MODIFIER => None,
                    m if usize::from(m) < MODIFIER_LEVELS => Some(m),
                    m => bail!(corrupt!("copy modifier {m:#04x} out of range")),
                };
                self.copy_block(id, src, 8, mode, modifier);
            }
            4 => {
                for block in id..id + 4 {
                    self.passthrough(block);
                }
            }
            5 => {
                let base = self.layout.offset(id);
                for row in 0..8 {
                    for x in 0..8 {
                        self.dst[base + row * self.pitch + x] = stream.byte("literal pixel")?;
                    }
                }
            }
            6 => {
                let value = stream.byte("fill value")?;
                self.fill(id, 8, value);
            }
            7 => {
                for block in id..id + 4 {
                    self.nested_op(block, stream)?;
                }
            }
            sub => bail!(corrupt!("double-size sub-opcode {sub} is not defined")),
        }
        Ok(())
    }

    /// One block of a recursive double-size op. Runs are pinned to a single
    /// block and no further nesting is allowed.
    fn nested_op(&mut self, id: usize, stream: &mut OpStream<'_>) -> Result<()> {
        let code = stream.byte("nested opcode")?;
        let (op, arg) = (code >> 5, code & 0x1f);
        match op {
            0..=3 => self.copy_op(op, arg, id, stream)?,
            4 => {
                ensure!(arg == 1, corrupt!("nested passthrough must cover one block, not {arg}"));
                self.passthrough(id);
            }
            5 => self.literal_op(arg, id, stream)?,
            6 => {
                ensure!(arg == 0, corrupt!("nested fill must cover one block, not {}", arg + 1));
                let value = stream.byte("fill value")?;
                self.fill(id, 4, value);
            }
            _ => bail!(corrupt!("double-size opcode nested inside a recursive block")),
        }
        Ok(())
    }

    fn passthrough(&mut self, id: usize) {
        if self.status[id] & STATUS_PREV_UNCHANGED == 0 {
            let base = self.layout.offset(id);
            for row in 0..4 {
                let at = base + row * self.pitch;
                self.dst[at..at + 4].copy_from_slice(&self.src[at..at + 4]);
            }
        }
        self.status[id] |= STATUS_UNCHANGED;
    }

    fn fill(&mut self, id: usize, size: usize, value: u8) {
        let base = self.layout.offset(id);
        for row in 0..size {
            let at = base + row * self.pitch;
            self.dst[at..at + size].fill(value);
        }
    }

    fn copy_block(&mut self, id: usize, src: usize, size: usize, mode: u8, modifier: Option<u8>) {
        let dst_base = self.layout.offset(id);
        let src_base = self.layout.offset(src);
        let last = size - 1;
        for y in 0..size {
            for x in 0..size {
                let (sx, sy) = match mode {
                    0 => (x, y),
                    1 => (last - x, y),
                    2 => (x, last - y),
                    _ => (last - x, last - y),
                };
                let pixel = self.src[src_base + sy * self.pitch + sx];
                self.dst[dst_base + y * self.pitch + x] = match modifier {
                    Some(m) => self.modify[(usize::from(m) << 8) | usize::from(pixel)],
                    None => pixel,
                };
            }
        }
    }
}

/// Double-buffered FVF frame decoder producing RGB565 little-endian output.
pub struct FvfVideoDecoder {
    layout: BlockLayout,
    modify_lookup: Vec<u8>,
    front: Planes,
    back: Planes,
    status: Vec<u8>,
    storage: [i16; 256],
    output: Vec<u8>,
    redraw_all: bool,
}

impl FvfVideoDecoder {
    pub fn new() -> Self {
        Self {
            layout: BlockLayout::new(),
            modify_lookup: build_modify_lookup(),
            front: Planes::new(),
            back: Planes::new(),
            status: vec![0; TOTAL_BLOCKS],
            storage: default_storage(),
            output: vec![0; LUMA_WIDTH * LUMA_HEIGHT * 2],
            redraw_all: true,
        }
    }

    /// Return to the state of a freshly opened movie.
    pub fn reset(&mut self) {
        self.front = Planes::new();
        self.back = Planes::new();
        self.status.fill(0);
        self.storage = default_storage();
        self.output.fill(0);
        self.redraw_all = true;
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn modify_lookup(&self) -> &[u8] {
        &self.modify_lookup
    }

    pub fn front(&self) -> &Planes {
        &self.front
    }

    pub fn back(&self) -> &Planes {
        &self.back
    }

    pub fn back_mut(&mut self) -> &mut Planes {
        &mut self.back
    }

    #[inline]
    pub fn status(&self, id: usize) -> u8 {
        self.status[id]
    }

    pub fn storage(&self) -> &[i16; 256] {
        &self.storage
    }

    /// RGB565 little-endian picture, 320x200.
    pub fn frame_buffer(&self) -> &[u8] {
        &self.output
    }

    /// The 16 pixels of block `id` in `planes`, row-major.
    pub fn read_block(&self, planes: &Planes, id: usize) -> [u8; 16] {
        let (plane, pitch) = if id < LUMA_BLOCKS {
            (&planes.luma, LUMA_WIDTH)
        } else {
            (&planes.chroma, CHROMA_WIDTH)
        };
        let base = self.layout.offset(id);
        let mut pixels = [0u8; 16];
        for row in 0..4 {
            let at = base + row * pitch;
            pixels[row * 4..row * 4 + 4].copy_from_slice(&plane[at..at + 4]);
        }
        pixels
    }

    pub fn set_palette(&mut self, palette: &[i16; 256]) {
        self.storage = *palette;
        self.redraw_all = true;
    }

    /// Decode one video sub-block into the front buffer. The back buffer is
    /// only read, so decoding the same data twice without a flip yields the
    /// same front buffer.
    pub fn decode_video(&mut self, data: &[u8]) -> Result<()> {
        for status in self.status.iter_mut() {
            *status = (*status & STATUS_UNCHANGED) << 1;
        }

        let mut stream = OpStream { data, pos: 0 };
        Pass {
            dst: &mut self.front.luma,
            src: &self.back.luma,
            pitch: LUMA_WIDTH,
            first: 0,
            end: LUMA_BLOCKS,
            status: &mut self.status,
            layout: &self.layout,
            modify: &self.modify_lookup,
        }
        .run(&mut stream)?;
        Pass {
            dst: &mut self.front.chroma,
            src: &self.back.chroma,
            pitch: CHROMA_WIDTH,
            first: U_BLOCK_START,
            end: TOTAL_BLOCKS,
            status: &mut self.status,
            layout: &self.layout,
            modify: &self.modify_lookup,
        }
        .run(&mut stream)?;

        if stream.pos != data.len() {
            bail!(corrupt!(
                "video sub-block has {} bytes left after both passes",
                data.len() - stream.pos
            ));
        }

        for id in U_BLOCK_START..TOTAL_BLOCKS {
            if self.status[id] & STATUS_UNCHANGED == 0 {
                continue;
            }
            let bit = if id < V_BLOCK_START {
                STATUS_U_UNCHANGED
            } else {
                STATUS_V_UNCHANGED
            };
            for luma in self.layout.luma_quad_for_chroma(id) {
                self.status[luma] |= bit;
            }
        }
        Ok(())
    }

    pub fn flip(&mut self) {
        std::mem::swap(&mut self.front, &mut self.back);
    }

    /// Convert the latest picture (the back buffer once flipped) to RGB565,
    /// touching only blocks that changed unless a full redraw is pending.
    pub fn composite(&mut self) {
        let picture = &self.back;
        for id in 0..LUMA_BLOCKS {
            if !self.redraw_all && self.status[id] == STATUS_CLEAN {
                continue;
            }
            let base = self.layout.offset(id);
            let (x0, y0) = (base % LUMA_WIDTH, base / LUMA_WIDTH);
            for y in y0..y0 + 4 {
                let u_row = (y / 2) * CHROMA_WIDTH;
                let v_row = (V_PLANE_ROW + y / 2) * CHROMA_WIDTH;
                for x in x0..x0 + 4 {
                    let luma = i32::from(picture.luma[y * LUMA_WIDTH + x]);
                    let cu = i32::from(self.storage[usize::from(picture.chroma[u_row + x / 2])]);
                    let cv = i32::from(self.storage[usize::from(picture.chroma[v_row + x / 2])]);
                    let r = (luma + cv).clamp(0, 255) as u16;
                    let g = (luma - ((cu + cv) >> 1)).clamp(0, 255) as u16;
                    let b = (luma + cu).clamp(0, 255) as u16;
                    let pixel = ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3);
                    let at = (y * LUMA_WIDTH + x) * 2;
                    self.output[at..at + 2].copy_from_slice(&pixel.to_le_bytes());
                }
            }
        }
        self.redraw_all = false;
    }

    /// Apply one container frame. Returns true when the picture changed and
    /// should be presented.
    pub fn decode_frame(&mut self, frame: &FvfFrame) -> Result<bool> {
        if let Some(palette) = &frame.palette {
            self.set_palette(palette);
        }
        match &frame.video {
            Some(video) => {
                self.decode_video(video)?;
                self.flip();
                self.composite();
                Ok(true)
            }
            None if frame.palette.is_some() => {
                self.composite();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl Default for FvfVideoDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::is_corrupt;
    use crate::fvf::{FRAME_PALETTE, FRAME_VIDEO_KEY};

    /// Passthrough runs covering `count` blocks.
    fn passthrough(mut count: usize) -> Vec<u8> {
        let mut ops = Vec::new();
        while count > 0 {
            if count < 32 {
                ops.push(0x80 | count as u8);
                count = 0;
            } else {
                let run = count.min(32 + 255);
                ops.push(0x80);
                ops.push((run - 32) as u8);
                count -= run;
            }
        }
        ops
    }

    fn fill(mut count: usize, value: u8) -> Vec<u8> {
        let mut ops = Vec::new();
        while count > 0 {
            let run = count.min(32);
            ops.push(0xc0 | (run - 1) as u8);
            ops.push(value);
            count -= run;
        }
        ops
    }

    fn patterned_back(decoder: &mut FvfVideoDecoder) {
        let back = decoder.back_mut();
        for (i, pixel) in back.luma.iter_mut().enumerate() {
            *pixel = (i * 7 % 251) as u8;
        }
        for (i, pixel) in back.chroma.iter_mut().enumerate() {
            *pixel = (i * 3 % 253) as u8;
        }
    }

    #[test]
    fn tiling_follows_macro_cells() {
        let layout = BlockLayout::new();
        assert_eq!(layout.offset(0), 0);
        assert_eq!(layout.offset(1), 4);
        assert_eq!(layout.offset(2), 4 * LUMA_WIDTH);
        assert_eq!(layout.offset(3), 4 * LUMA_WIDTH + 4);
        assert_eq!(layout.offset(4), 8);
        assert_eq!(layout.offset(160), 8 * LUMA_WIDTH);
        assert_eq!(layout.offset(3999), 196 * LUMA_WIDTH + 316);

        assert_eq!(layout.offset(U_BLOCK_START), 0);
        assert_eq!(layout.offset(4959), 92 * CHROMA_WIDTH + 156);
        // Odd final row: half cells of TL, TR only.
        assert_eq!(layout.offset(4960), 96 * CHROMA_WIDTH);
        assert_eq!(layout.offset(4961), 96 * CHROMA_WIDTH + 4);
        assert_eq!(layout.offset(4962), 96 * CHROMA_WIDTH + 8);
        assert!(!layout.is_quad_start(4960));
        assert!(layout.is_quad_start(4956));

        assert_eq!(layout.offset(V_BLOCK_START), V_PLANE_ROW * CHROMA_WIDTH);
        assert_eq!(layout.offset(5999), 196 * CHROMA_WIDTH + 156);
    }

    #[test]
    fn chroma_blocks_map_onto_luma_quads() {
        let layout = BlockLayout::new();
        // U block 4004 is the TL of the second macro cell: block (2, 0).
        assert_eq!(layout.luma_quad_for_chroma(4004), 8..12);
        assert_eq!(layout.luma_quad_for_chroma(5004), 8..12);
        // Last half-row block of U: (39, 24).
        assert_eq!(layout.luma_quad_for_chroma(4999), 3996..4000);
        // Every luma block luma_quad_for_chroma names covers the same pixels.
        let cell = layout.luma_quad_for_chroma(4001).start;
        let chroma = layout.offset(4001);
        let luma = layout.offset(cell);
        assert_eq!((chroma % CHROMA_WIDTH) * 2, luma % LUMA_WIDTH);
        assert_eq!((chroma / CHROMA_WIDTH) * 2, luma / LUMA_WIDTH);
    }

    #[test]
    fn modify_lookup_uses_triangular_ramp() {
        let table = build_modify_lookup();
        assert_eq!(table.len(), 32768);
        assert_eq!(table[255], 191);
        assert_eq!(table[(10 << 8) | 255], 231);
        assert_eq!(table[(127 << 8) | 255], 191);
        assert_eq!(table[(63 << 8) | 255], 255);
        assert_eq!(table[(32 << 8) | 100], 128 + 75);
        assert_eq!(table[(64 << 8) | 100], 255);
    }

    #[test]
    fn passthrough_run_copies_back_buffer() {
        let mut decoder = FvfVideoDecoder::new();
        patterned_back(&mut decoder);

        let mut ops = vec![0x80 | 3];
        ops.extend(fill(LUMA_BLOCKS - 3, 9));
        ops.extend(fill(TOTAL_BLOCKS - LUMA_BLOCKS, 0x80));
        decoder.decode_video(&ops).unwrap();

        for id in 0..3 {
            assert_eq!(
                decoder.read_block(decoder.front(), id),
                decoder.read_block(decoder.back(), id)
            );
            assert_ne!(decoder.status(id) & STATUS_UNCHANGED, 0);
        }
        assert_eq!(decoder.read_block(decoder.front(), 3), [9; 16]);
        assert_eq!(decoder.status(3) & STATUS_UNCHANGED, 0);
    }

    #[test]
    fn decoding_twice_without_flip_is_idempotent() {
        let mut decoder = FvfVideoDecoder::new();
        patterned_back(&mut decoder);

        let mut ops = Vec::new();
        // hv-mirrored copy of block 10 with a modifier.
        ops.extend([0x70, 10, 0, 5]);
        ops.extend(passthrough(6));
        // literal rows 0 and 2.
        ops.extend([0xa5, 1, 2, 3, 4, 5, 6, 7, 8]);
        ops.extend([0xe0 | 7]);
        // recursive quad at 8: copy, passthrough, fill, literal.
        ops.extend([0x00, 0, 0, 0x81, 0xc0, 0x44, 0xa1, 9, 9, 9, 9]);
        ops.extend([0xe0 | 6, 0x33]);
        ops.extend(passthrough(LUMA_BLOCKS - 16));
        ops.extend([0xe0 | 1, 0xa4, 0x0f, 0xff]);
        ops.extend(passthrough(TOTAL_BLOCKS - LUMA_BLOCKS - 4));

        decoder.decode_video(&ops).unwrap();
        let first = decoder.front().clone();
        decoder.decode_video(&ops).unwrap();
        assert_eq!(decoder.front(), &first);

        assert_eq!(decoder.read_block(decoder.front(), 10), [0x44; 16]);
        assert_eq!(decoder.read_block(decoder.front(), 12), [0x33; 16]);
        let src = decoder.read_block(decoder.back(), 10);
        let expected = decoder.modify_lookup()[(5 << 8) | usize::from(src[15])];
        assert_eq!(decoder.read_block(decoder.front(), 0)[0], expected);
    }

    #[test]
    fn chroma_status_propagates_to_luma() {
        let mut decoder = FvfVideoDecoder::new();
        let mut ops = passthrough(LUMA_BLOCKS);
        ops.extend(passthrough(1000));
        ops.extend(fill(1000, 0x80));
        decoder.decode_video(&ops).unwrap();
        assert_eq!(decoder.status(8), STATUS_UNCHANGED | STATUS_U_UNCHANGED);

        decoder.decode_video(&ops).unwrap();
        assert_eq!(
            decoder.status(8),
            STATUS_UNCHANGED | STATUS_PREV_UNCHANGED | STATUS_U_UNCHANGED
        );

        decoder.decode_video(&passthrough_both()).unwrap();
        assert_eq!(decoder.status(8), STATUS_CLEAN);
    }

    fn passthrough_both() -> Vec<u8> {
        let mut ops = passthrough(LUMA_BLOCKS);
        ops.extend(passthrough(TOTAL_BLOCKS - LUMA_BLOCKS));
        ops
    }

    #[test]
    fn malformed_streams_are_corrupt() {
        let mut decoder = FvfVideoDecoder::new();
        // Undefined double-size sub-opcode.
        let err = decoder.decode_video(&[0xe8]).unwrap_err();
        assert!(is_corrupt(&err));
        // Run overrunning the luma pass.
        let mut ops = passthrough(LUMA_BLOCKS - 2);
        ops.push(0x83);
        assert!(is_corrupt(&decoder.decode_video(&ops).unwrap_err()));
        // Copy source from the other pass.
        assert!(is_corrupt(&decoder.decode_video(&[0x00, 0xa0, 0x0f]).unwrap_err()));
        // Trailing bytes after both passes.
        let mut ops = passthrough_both();
        ops.push(0);
        assert!(is_corrupt(&decoder.decode_video(&ops).unwrap_err()));
        // Double-size op on a half cell.
        let mut ops = passthrough(LUMA_BLOCKS);
        ops.extend(passthrough(960));
        ops.extend([0xe6, 0]);
        assert!(is_corrupt(&decoder.decode_video(&ops).unwrap_err()));
        // Nested passthrough longer than one block.
        assert!(is_corrupt(&decoder.decode_video(&[0xe7, 0x82]).unwrap_err()));
    }

    #[test]
    fn frames_composite_to_rgb565() {
        let mut decoder = FvfVideoDecoder::new();
        let mut ops = fill(LUMA_BLOCKS, 100);
        ops.extend(fill(TOTAL_BLOCKS - LUMA_BLOCKS, 0x80));
        let frame = FvfFrame {
            index: 0,
            flags: FRAME_VIDEO_KEY,
            video: Some(ops),
            palette: None,
            audio: None,
        };
        assert!(decoder.decode_frame(&frame).unwrap());
        let out = decoder.frame_buffer();
        assert_eq!(out.len(), 320 * 200 * 2);
        assert_eq!(&out[..2], &0x632cu16.to_le_bytes());
        assert_eq!(&out[out.len() - 2..], &0x632cu16.to_le_bytes());

        // A palette shifting the neutral chroma value tints every pixel.
        let mut palette = default_storage();
        palette[0x80] = 40;
        let tint = FvfFrame {
            index: 1,
            flags: FRAME_PALETTE,
            video: None,
            palette: Some(palette),
            audio: None,
        };
        assert!(decoder.decode_frame(&tint).unwrap());
        let (r, g, b) = (140u16, 60u16, 140u16);
        let expected = ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3);
        assert_eq!(&decoder.frame_buffer()[..2], &expected.to_le_bytes());
    }
}

//! Screen tables: the per-world screen list (`slWWW.scr`), walk/hotspot
//! polygon files (`.mrg`) and the per-screen object index
//! (`wWWSSobj.bst`).

use std::io::{Read, Seek, SeekFrom};

use anyhow::{Context, Result, bail};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::block::*;
use crate::object_id::ObjectId;

const SCREEN_NAME_LEN: usize = 12;
const MAX_POINT_DISTANCE: u16 = 0x100;

pub fn screen_list_file_name(world: u8) -> String {
    format!("sl{world:03}.scr")
}

pub fn screen_objects_file_name(world: u8, screen: u8) -> String {
    format!("w{world:02x}{screen:02x}obj.bst")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Entrance {
    pub x: u16,
    pub y: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenEntry {
    pub screen_id: u8,
    pub background: String,
    pub polygon_file: String,
    pub entrances: Vec<Entrance>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScreenList {
    pub screens: Vec<ScreenEntry>,
}

impl ScreenList {
    pub fn read_from<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BlockReader::new(reader);
        let count = reader.read_u8("screen count")?;
        let mut screens = Vec::with_capacity(count as usize);
        for index in 0..count {
            let screen_id = reader.read_u8("screen id")?;
            let entrance_count = reader.read_u8("entrance count")?;
            let background = reader
                .read_fixed_string(SCREEN_NAME_LEN, "background name")
                .with_context(|| format!("reading screen #{index}"))?;
            let polygon_file = reader.read_fixed_string(SCREEN_NAME_LEN, "polygon file name")?;
            let mut entrances = Vec::with_capacity(entrance_count as usize);
            for _ in 0..entrance_count {
                entrances.push(Entrance {
                    x: reader.read_u16("entrance x")?,
                    y: reader.read_u16("entrance y")?,
                });
            }
            screens.push(ScreenEntry {
                screen_id,
                background,
                polygon_file,
                entrances,
            });
        }
        Ok(Self { screens })
    }

    pub fn find(&self, screen_id: u8) -> Option<&ScreenEntry> {
        self.screens.iter().find(|screen| screen.screen_id == screen_id)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = BlockWriter::new();
        let count = u8::try_from(self.screens.len()).context("too many screens")?;
        writer.write_u8(count);
        for screen in &self.screens {
            let entrances = u8::try_from(screen.entrances.len()).context("too many entrances")?;
            writer.write_u8(screen.screen_id);
            writer.write_u8(entrances);
            writer.write_fixed_string(&screen.background, SCREEN_NAME_LEN)?;
            writer.write_fixed_string(&screen.polygon_file, SCREEN_NAME_LEN)?;
            for entrance in &screen.entrances {
                writer.write_u16(entrance.x);
                writer.write_u16(entrance.y);
            }
        }
        Ok(writer.into_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PolygonType {
    Walkable,
    Hotspot,
    Blocking,
    Scaled,
}

impl PolygonType {
    fn from_raw(raw: u8) -> Result<Self> {
        Ok(match raw {
            0 => PolygonType::Walkable,
            1 => PolygonType::Hotspot,
            3 => PolygonType::Blocking,
            4 => PolygonType::Scaled,
            other => bail!(corrupt!("polygon type {other} is not recognised")),
        })
    }

    fn raw(self) -> u8 {
        match self {
            PolygonType::Walkable => 0,
            PolygonType::Hotspot => 1,
            PolygonType::Blocking => 3,
            PolygonType::Scaled => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolygonPoint {
    pub x: u16,
    pub y: u16,
    /// Depth scale at this point, `0..=0x100`.
    pub distance: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Polygon {
    pub id: u32,
    pub polygon_type: PolygonType,
    pub points: Vec<PolygonPoint>,
}

impl Polygon {
    /// Triangles fanned out from the first point.
    pub fn triangles(&self) -> impl Iterator<Item = [PolygonPoint; 3]> + '_ {
        let first = self.points.first().copied();
        self.points
            .windows(2)
            .skip(1)
            .filter_map(move |pair| first.map(|origin| [origin, pair[0], pair[1]]))
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.triangles().any(|tri| triangle_contains(&tri, x, y))
    }
}

fn edge(a: &PolygonPoint, b: &PolygonPoint, x: i32, y: i32) -> i64 {
    let (ax, ay) = (i64::from(a.x), i64::from(a.y));
    let (bx, by) = (i64::from(b.x), i64::from(b.y));
    (bx - ax) * (i64::from(y) - ay) - (by - ay) * (i64::from(x) - ax)
}

fn triangle_contains(tri: &[PolygonPoint; 3], x: i32, y: i32) -> bool {
    let d0 = edge(&tri[0], &tri[1], x, y);
    let d1 = edge(&tri[1], &tri[2], x, y);
    let d2 = edge(&tri[2], &tri[0], x, y);
    let has_neg = d0 < 0 || d1 < 0 || d2 < 0;
    let has_pos = d0 > 0 || d1 > 0 || d2 > 0;
    !(has_neg && has_pos)
}

/// Read a polygon file. Polygons are addressed through an offset table, so
/// the reader must be seekable.
pub fn read_polygons<R: Read + Seek>(reader: &mut R) -> Result<Vec<Polygon>> {
    let count = reader
        .read_u16::<LittleEndian>()
        .map_err(|_| corrupt!("polygon file has no count"))?;
    let mut table = Vec::with_capacity(count as usize);
    for index in 0..count {
        let id = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| corrupt!("polygon table truncated at entry {index}"))?;
        let offset = reader
            .read_u32::<LittleEndian>()
            .map_err(|_| corrupt!("polygon table truncated at entry {index}"))?;
        table.push((id, offset));
    }

    let mut polygons = Vec::with_capacity(table.len());
    for (id, offset) in table {
        reader
            .seek(SeekFrom::Start(u64::from(offset)))
            .with_context(|| format!("seeking to polygon {id}"))?;
        let mut block = BlockReader::new(&mut *reader);
        let polygon_type = PolygonType::from_raw(block.read_u8("polygon type")?)?;
        block.expect_zero_u16("polygon reserved word")?;
        let point_count = block.read_u8("polygon point count")?;
        let mut points = Vec::with_capacity(point_count as usize);
        for _ in 0..point_count {
            let point = PolygonPoint {
                x: block.read_u16("point x")?,
                y: block.read_u16("point y")?,
                distance: block.read_u16("point distance")?,
            };
            if point.distance > MAX_POINT_DISTANCE {
                bail!(corrupt!(
                    "polygon {id} point distance {:#x} exceeds {:#x}",
                    point.distance,
                    MAX_POINT_DISTANCE
                ));
            }
            points.push(point);
        }
        polygons.push(Polygon {
            id,
            polygon_type,
            points,
        });
    }
    Ok(polygons)
}

pub fn write_polygons(polygons: &[Polygon]) -> Result<Vec<u8>> {
    let count = u16::try_from(polygons.len()).context("too many polygons")?;
    let mut offset = 2 + 8 * polygons.len();
    let mut table = BlockWriter::new();
    let mut body = BlockWriter::new();
    table.write_u16(count);
    for polygon in polygons {
        let points = u8::try_from(polygon.points.len()).context("too many polygon points")?;
        table.write_u32(polygon.id);
        table.write_u32(u32::try_from(offset).context("polygon file too large")?);
        body.write_u8(polygon.polygon_type.raw());
        body.write_u16(0);
        body.write_u8(points);
        for point in &polygon.points {
            body.write_u16(point.x);
            body.write_u16(point.y);
            body.write_u16(point.distance);
        }
        offset = 2 + 8 * polygons.len() + body.len();
    }
    let mut bytes = table.into_bytes();
    bytes.extend(body.into_bytes());
    Ok(bytes)
}

/// Objects placed on one screen, in index order.
pub fn read_screen_objects<R: Read>(mut reader: R) -> Result<Vec<ObjectId>> {
    const RECORD_LEN: usize = 6;

    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .context("reading screen object table")?;
    if bytes.len() % RECORD_LEN != 0 {
        bail!(corrupt!(
            "screen object table is {} bytes, not a multiple of {}",
            bytes.len(),
            RECORD_LEN
        ));
    }
    let count = bytes.len() / RECORD_LEN;
    let mut reader = BlockReader::new(bytes.as_slice());
    let mut objects = Vec::with_capacity(count);
    for expected in 0..count {
        let index = reader.read_u16("screen object index")?;
        if usize::from(index) != expected {
            bail!(corrupt!(
                "screen object index {index} out of sequence (expected {expected})"
            ));
        }
        objects.push(reader.read_object_id("screen object")?);
    }
    Ok(objects)
}

pub fn write_screen_objects(objects: &[ObjectId]) -> Result<Vec<u8>> {
    let mut writer = BlockWriter::new();
    for (index, object) in objects.iter().enumerate() {
        writer.write_u16(u16::try_from(index).context("too many screen objects")?);
        writer.write_object_id(*object);
    }
    Ok(writer.into_bytes())
}

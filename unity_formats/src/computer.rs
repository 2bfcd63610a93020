//! Ship computer database (`computer.db`): titled hypertext entries.

use std::io::Read;

use anyhow::{Context, Result, bail};
use serde::Serialize;

use crate::block::*;

pub const COMPUTER_DB_FILE_NAME: &str = "computer.db";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComputerEntry {
    pub title: String,
    pub paragraphs: Vec<String>,
    /// Indices of related entries.
    pub links: Vec<u16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComputerDatabase {
    pub entries: Vec<ComputerEntry>,
}

impl ComputerDatabase {
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .context("reading computer database")?;

        let mut header = BlockReader::new(bytes.as_slice());
        let count = header.read_u32("entry count")? as usize;
        let mut offsets = Vec::with_capacity(count.min(bytes.len() / 4));
        for _ in 0..count {
            offsets.push(header.read_u32("entry offset")? as usize);
        }

        let mut entries = Vec::with_capacity(count);
        for (index, offset) in offsets.into_iter().enumerate() {
            let Some(slice) = bytes.get(offset..) else {
                bail!(corrupt!("entry {index} offset {offset} is past the end of the file"));
            };
            let entry = read_entry(&mut BlockReader::new(slice), count)
                .with_context(|| format!("reading computer entry {index}"))?;
            entries.push(entry);
        }
        Ok(Self { entries })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let count = self.entries.len();
        let mut body = BlockWriter::new();
        let mut offsets = Vec::with_capacity(count);
        let header_len = 4 + 4 * count;
        for entry in &self.entries {
            offsets.push(header_len + body.len());
            body.write_cstring(&entry.title)?;
            let paragraphs = u8::try_from(entry.paragraphs.len()).context("too many paragraphs")?;
            body.write_u8(paragraphs);
            for paragraph in &entry.paragraphs {
                body.write_cstring(paragraph)?;
            }
            let links = u8::try_from(entry.links.len()).context("too many links")?;
            body.write_u8(links);
            for &link in &entry.links {
                body.write_u16(link);
            }
        }

        let mut writer = BlockWriter::new();
        writer.write_u32(u32::try_from(count).context("too many entries")?);
        for offset in offsets {
            writer.write_u32(u32::try_from(offset).context("computer database too large")?);
        }
        writer.write_bytes(&body.into_bytes());
        Ok(writer.into_bytes())
    }

    pub fn find_title(&self, title: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.title.eq_ignore_ascii_case(title))
    }
}

fn read_entry<R: Read>(reader: &mut BlockReader<R>, count: usize) -> Result<ComputerEntry> {
    let title = reader.read_cstring("entry title")?;
    let paragraph_count = reader.read_u8("paragraph count")?;
    let mut paragraphs = Vec::with_capacity(paragraph_count as usize);
    for _ in 0..paragraph_count {
        paragraphs.push(reader.read_cstring("paragraph")?);
    }
    let link_count = reader.read_u8("link count")?;
    let mut links = Vec::with_capacity(link_count as usize);
    for _ in 0..link_count {
        let link = reader.read_u16("link")?;
        if usize::from(link) >= count {
            bail!(corrupt!("link to entry {link} but only {count} entries exist"));
        }
        links.push(link);
    }
    Ok(ComputerEntry {
        title,
        paragraphs,
        links,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ComputerDatabase {
        ComputerDatabase {
            entries: vec![
                ComputerEntry {
                    title: "Romulans".into(),
                    paragraphs: vec!["A Vulcan offshoot.".into(), "See also: Remus.".into()],
                    links: vec![1],
                },
                ComputerEntry {
                    title: "Remus".into(),
                    paragraphs: vec!["Twin planet of Romulus.".into()],
                    links: vec![0, 1],
                },
            ],
        }
    }

    #[test]
    fn database_round_trips() {
        let db = sample();
        let bytes = db.to_bytes().unwrap();
        let parsed = ComputerDatabase::read_from(bytes.as_slice()).unwrap();
        assert_eq!(parsed, db);
        assert_eq!(parsed.find_title("remus"), Some(1));
    }

    #[test]
    fn dangling_link_is_corrupt() {
        let mut db = sample();
        db.entries[1].links.push(2);
        let bytes = db.to_bytes().unwrap();
        let err = ComputerDatabase::read_from(bytes.as_slice()).unwrap_err();
        assert!(is_corrupt(&err));
    }

    #[test]
    fn offset_past_end_is_corrupt() {
        let mut bytes = sample().to_bytes().unwrap();
        bytes[4..8].copy_from_slice(&10_000u32.to_le_bytes());
        assert!(is_corrupt(&ComputerDatabase::read_from(bytes.as_slice()).unwrap_err()));
    }
}

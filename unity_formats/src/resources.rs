use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use memmap2::MmapOptions;
use walkdir::WalkDir;

pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Named byte streams for the game assets. A missing resource is an error.
pub trait ResourceProvider {
    fn open(&self, name: &str) -> Result<Box<dyn ReadSeek>>;

    fn exists(&self, name: &str) -> bool;

    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        let mut stream = self.open(name)?;
        let mut bytes = Vec::new();
        stream
            .read_to_end(&mut bytes)
            .with_context(|| format!("reading resource {name}"))?;
        Ok(bytes)
    }
}

/// A game data directory. File names on disc are upper case while scripts
/// refer to them in lower case, so lookups ignore ASCII case.
#[derive(Debug)]
pub struct DataDir {
    root: PathBuf,
    index: BTreeMap<String, PathBuf>,
}

impl DataDir {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut index = BTreeMap::new();
        for entry in WalkDir::new(&root) {
            let entry =
                entry.with_context(|| format!("scanning data directory {}", root.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/")
                .to_ascii_lowercase();
            index.insert(relative, entry.path().to_path_buf());
        }
        Ok(Self { root, index })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.index.keys().map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Option<&Path> {
        self.index
            .get(&name.replace('\\', "/").to_ascii_lowercase())
            .map(PathBuf::as_path)
    }
}

impl ResourceProvider for DataDir {
    fn open(&self, name: &str) -> Result<Box<dyn ReadSeek>> {
        let path = self
            .resolve(name)
            .ok_or_else(|| anyhow!("resource {name} not found under {}", self.root.display()))?;
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let len = file
            .metadata()
            .with_context(|| format!("reading metadata of {}", path.display()))?
            .len();
        if len == 0 {
            // Zero-length mappings are rejected on some platforms.
            return Ok(Box::new(Cursor::new(Vec::new())));
        }
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping {}", path.display()))?;
        Ok(Box::new(Cursor::new(mmap)))
    }

    fn exists(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }
}

/// In-memory resources, mainly for tests and tools that synthesise assets.
#[derive(Debug, Default, Clone)]
pub struct MemoryResources {
    files: BTreeMap<String, Vec<u8>>,
}

impl MemoryResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.files.insert(name.to_ascii_lowercase(), bytes);
    }

    pub fn with(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.insert(name, bytes);
        self
    }
}

impl ResourceProvider for MemoryResources {
    fn open(&self, name: &str) -> Result<Box<dyn ReadSeek>> {
        let bytes = self
            .files
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| anyhow!("resource {name} not found"))?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(&name.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn data_dir_lookup_ignores_case() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("MOVIES")).unwrap();
        fs::write(dir.path().join("O_5F0102.BST"), b"object").unwrap();
        fs::write(dir.path().join("MOVIES").join("INTRO.FVF"), b"movie").unwrap();
        fs::write(dir.path().join("EMPTY.DAT"), b"").unwrap();

        let data = DataDir::open(dir.path()).unwrap();
        assert_eq!(data.len(), 3);
        assert_eq!(data.read_all("o_5f0102.bst").unwrap(), b"object");
        assert_eq!(data.read_all("movies/intro.fvf").unwrap(), b"movie");
        assert!(data.read_all("empty.dat").unwrap().is_empty());
        assert!(data.exists("Movies\\Intro.fvf"));
        assert!(data.open("missing.bst").is_err());
    }

    #[test]
    fn opened_streams_are_seekable() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("TRIGGERS.DAT"), b"0123456789").unwrap();
        let data = DataDir::open(dir.path()).unwrap();

        let mut stream = data.open("triggers.dat").unwrap();
        stream.seek(std::io::SeekFrom::Start(6)).unwrap();
        let mut tail = String::new();
        stream.read_to_string(&mut tail).unwrap();
        assert_eq!(tail, "6789");
    }

    #[test]
    fn memory_resources_behave_like_a_directory() {
        let resources = MemoryResources::new().with("W002C015.BST", vec![1, 2, 3]);
        assert!(resources.exists("w002c015.bst"));
        assert_eq!(resources.read_all("w002c015.bst").unwrap(), vec![1, 2, 3]);
        assert!(resources.open("w002c016.bst").is_err());
    }
}

//! Access to a connection data bundle, either unpacked in a directory or
//! shipped as `ldrconn.zip`.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use zip::ZipArchive;
use zip::result::ZipError;

use crate::Result;

pub const TYPES_FILE: &str = "connectionDefs.xml";
pub const AUTODETECT_FILE: &str = "autodetectDefs.xml";
pub const AUTOCONNECT_FILE: &str = "autoconnect.csv";
pub const FLEX_FILE: &str = "flexpartsDefs.xml";
pub const DECLARED_EXT: &str = ".cxml";

/// A read-only bundle of connection configuration files.
pub trait ConnectionSource: Send {
    /// Human readable origin, used in error messages.
    fn name(&self) -> &str;

    /// Contents of a top level configuration file, `None` when absent.
    fn read(&self, file: &str) -> Result<Option<String>>;

    /// Contents of the declared connection file `<main>.cxml`.
    fn read_declared(&self, main_name: &str) -> Result<Option<String>>;

    fn has_declared(&self, main_name: &str) -> bool;
}

/// Bundle unpacked on disk. Declared files live in `conn/` (or next to the
/// configuration files).
#[derive(Debug, Clone)]
pub struct DirectorySource {
    root: PathBuf,
    label: String,
}

impl DirectorySource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = root.display().to_string();
        Self { root, label }
    }

    fn declared_path(&self, main_name: &str) -> Option<PathBuf> {
        let file = format!("{main_name}{DECLARED_EXT}");
        [self.root.join("conn").join(&file), self.root.join(&file)]
            .into_iter()
            .find(|p| p.is_file())
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(s) => Ok(Some(s)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ConnectionSource for DirectorySource {
    fn name(&self) -> &str {
        &self.label
    }

    fn read(&self, file: &str) -> Result<Option<String>> {
        read_optional(&self.root.join(file))
    }

    fn read_declared(&self, main_name: &str) -> Result<Option<String>> {
        match self.declared_path(main_name) {
            Some(p) => read_optional(&p),
            None => Ok(None),
        }
    }

    fn has_declared(&self, main_name: &str) -> bool {
        self.declared_path(main_name).is_some()
    }
}

/// Bundle packed in a zip archive with every file at the archive root.
pub struct ZipSource<R = File> {
    archive: Mutex<ZipArchive<R>>,
    entries: HashSet<String>,
    label: String,
}

impl ZipSource<File> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file, path.display().to_string())
    }
}

impl<R: Read + Seek> ZipSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Result<Self> {
        let archive = ZipArchive::new(reader)?;
        let entries: HashSet<String> = archive.file_names().map(str::to_string).collect();
        let label = label.into();
        debug!("Opened connection bundle {label} with {} entries", entries.len());
        Ok(Self {
            archive: Mutex::new(archive),
            entries,
            label,
        })
    }

    fn entry(&self, name: &str) -> Result<Option<String>> {
        if !self.entries.contains(name) {
            return Ok(None);
        }
        let mut archive = match self.archive.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut file = match archive.by_name(name) {
            Ok(f) => f,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(Some(content))
    }
}

impl<R: Read + Seek + Send> ConnectionSource for ZipSource<R> {
    fn name(&self) -> &str {
        &self.label
    }

    fn read(&self, file: &str) -> Result<Option<String>> {
        self.entry(file)
    }

    fn read_declared(&self, main_name: &str) -> Result<Option<String>> {
        self.entry(&format!("{main_name}{DECLARED_EXT}"))
    }

    fn has_declared(&self, main_name: &str) -> bool {
        self.entries
            .contains(&format!("{main_name}{DECLARED_EXT}"))
    }
}

/// Bundle held in memory, keyed by file name.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, file: &str, content: impl Into<String>) -> Self {
        self.files.insert(file.to_string(), content.into());
        self
    }
}

impl ConnectionSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn read(&self, file: &str) -> Result<Option<String>> {
        Ok(self.files.get(file).cloned())
    }

    fn read_declared(&self, main_name: &str) -> Result<Option<String>> {
        self.read(&format!("{main_name}{DECLARED_EXT}"))
    }

    fn has_declared(&self, main_name: &str) -> bool {
        self.files
            .contains_key(&format!("{main_name}{DECLARED_EXT}"))
    }
}

/// Opens `path` as a zip bundle when it is a file, as a directory bundle
/// otherwise.
pub fn open_source(path: &Path) -> Result<Box<dyn ConnectionSource>> {
    if path.is_file() {
        Ok(Box::new(ZipSource::open(path)?))
    } else {
        if !path.is_dir() {
            warn!("Connection bundle {} does not exist", path.display());
        }
        Ok(Box::new(DirectorySource::new(path)))
    }
}

/// Main part names whose connections were checked against the automatic
/// detection, one per line in `autoconnect.csv`.
pub fn read_autoconnect(source: &dyn ConnectionSource) -> Result<HashSet<String>> {
    Ok(source
        .read(AUTOCONNECT_FILE)?
        .map(|text| {
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default())
}

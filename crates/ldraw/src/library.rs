//! Where part files come from.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::trace;

use crate::Result;
use crate::part::{PartKind, part_key};

/// A read-only source of LDraw part files.
pub trait PartLibrary: Send {
    /// Text of the file named `id` (as written on a type 1 line), `None` when
    /// the library does not have it.
    fn resolve_text(&self, id: &str) -> Result<Option<String>>;

    /// Classification known from the library layout, if any. Used when the
    /// file itself carries no `!LDRAW_ORG` line.
    fn classify(&self, id: &str) -> Option<PartKind> {
        let _ = id;
        None
    }
}

/// Normalises a reference name to forward slashes and lower case.
pub fn normalize_name(id: &str) -> String {
    part_key(id)
}

/// File name with any folder prefix removed, lower-cased.
pub fn base_name(id: &str) -> String {
    let id = normalize_name(id);
    match id.rfind('/') {
        Some(i) => id[i + 1..].to_string(),
        None => id,
    }
}

/// In-memory library, mostly for tests and generated parts.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    files: HashMap<String, (String, Option<PartKind>)>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: &str, text: impl Into<String>) {
        self.files.insert(normalize_name(id), (text.into(), None));
    }

    pub fn insert_with_kind(&mut self, id: &str, text: impl Into<String>, kind: PartKind) {
        self.files
            .insert(normalize_name(id), (text.into(), Some(kind)));
    }

    pub fn with(mut self, id: &str, text: impl Into<String>) -> Self {
        self.insert(id, text);
        self
    }
}

impl PartLibrary for MemoryLibrary {
    fn resolve_text(&self, id: &str) -> Result<Option<String>> {
        Ok(self.files.get(&normalize_name(id)).map(|(t, _)| t.clone()))
    }

    fn classify(&self, id: &str) -> Option<PartKind> {
        self.files.get(&normalize_name(id)).and_then(|(_, k)| *k)
    }
}

/// Standard LDraw directory layout, official folders first.
const SEARCH_DIRS: [(&str, PartKind); 7] = [
    ("parts", PartKind::Official),
    ("p", PartKind::Primitive),
    ("Unofficial/parts", PartKind::Unofficial),
    ("Unofficial/p", PartKind::UnofficialPrimitive),
    ("models", PartKind::Model),
    ("Unofficial", PartKind::Unofficial),
    ("", PartKind::Model),
];

/// An LDraw library installed on disk, e.g. `$LDRAWDIR`.
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
}

impl DirectoryLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn locate(&self, id: &str) -> Option<(PathBuf, PartKind)> {
        let name = normalize_name(id);
        let original = id.trim().replace('\\', "/");
        for (dir, kind) in SEARCH_DIRS {
            let base = if dir.is_empty() {
                self.root.clone()
            } else {
                self.root.join(dir)
            };
            for candidate in [&name, &original] {
                let path = base.join(candidate);
                if path.is_file() {
                    trace!("{id} found at {}", path.display());
                    return Some((path, refine_kind(kind, &name)));
                }
            }
        }
        None
    }
}

/// Sub-folders of the part and primitive folders carry their own kind.
fn refine_kind(kind: PartKind, name: &str) -> PartKind {
    let sub = name.starts_with("s/");
    let hi = name.starts_with("48/");
    let lo = name.starts_with("8/");
    match kind {
        PartKind::Official if sub => PartKind::Subpart,
        PartKind::Unofficial if sub => PartKind::UnofficialSubpart,
        PartKind::Primitive if hi => PartKind::Primitive48,
        PartKind::Primitive if lo => PartKind::Primitive8,
        PartKind::UnofficialPrimitive if hi => PartKind::Unofficial48,
        PartKind::UnofficialPrimitive if lo => PartKind::Unofficial8,
        other => other,
    }
}

impl PartLibrary for DirectoryLibrary {
    fn resolve_text(&self, id: &str) -> Result<Option<String>> {
        match self.locate(id) {
            Some((path, _)) => {
                let bytes = std::fs::read(path)?;
                Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
            }
            None => Ok(None),
        }
    }

    fn classify(&self, id: &str) -> Option<PartKind> {
        self.locate(id).map(|(_, kind)| kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names() {
        assert_eq!(normalize_name(" S\\3001s01.DAT "), "s/3001s01.dat");
        assert_eq!(base_name("parts\\s\\3001s01.dat"), "3001s01.dat");
        assert_eq!(base_name("Stud.dat"), "stud.dat");
    }

    #[test]
    fn memory_library_is_case_insensitive() {
        let lib = MemoryLibrary::new().with("3001.DAT", "0 Brick 2 x 4");
        assert_eq!(
            lib.resolve_text("3001.dat").unwrap().as_deref(),
            Some("0 Brick 2 x 4")
        );
        assert!(lib.resolve_text("3002.dat").unwrap().is_none());
        assert_eq!(lib.classify("3001.dat"), None);
    }

    #[test]
    fn directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("parts/s")).unwrap();
        std::fs::create_dir_all(root.join("p/48")).unwrap();
        std::fs::write(root.join("parts/3001.dat"), "0 Brick").unwrap();
        std::fs::write(root.join("parts/s/3001s01.dat"), "0 Sub").unwrap();
        std::fs::write(root.join("p/stud.dat"), "0 Stud").unwrap();
        std::fs::write(root.join("p/48/4-4cyli.dat"), "0 Cyl").unwrap();

        let lib = DirectoryLibrary::new(root);
        assert_eq!(lib.classify("3001.dat"), Some(PartKind::Official));
        assert_eq!(lib.classify("s\\3001s01.dat"), Some(PartKind::Subpart));
        assert_eq!(lib.classify("STUD.DAT"), Some(PartKind::Primitive));
        assert_eq!(lib.classify("48\\4-4cyli.dat"), Some(PartKind::Primitive48));
        assert_eq!(
            lib.resolve_text("s\\3001s01.dat").unwrap().as_deref(),
            Some("0 Sub")
        );
        assert!(lib.resolve_text("nothing.dat").unwrap().is_none());
    }
}

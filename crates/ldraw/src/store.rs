use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, warn};

use crate::ids::IdAllocator;
use crate::library::{PartLibrary, normalize_name};
use crate::part::{PartDefinition, PartKind};
use crate::{LDrawError, Result};

/// Owns every part definition known to a session.
///
/// Lookups check the library first (parts already loaded, then the library
/// itself), then custom parts (models, sub-models and user-built parts) and
/// finally internal-use parts such as flexible-part segments.
pub struct PartStore {
    library: Box<dyn PartLibrary>,
    ids: Arc<IdAllocator>,
    cache: HashMap<String, Arc<PartDefinition>>,
    custom: HashMap<String, Arc<PartDefinition>>,
    internal: HashMap<String, Arc<PartDefinition>>,
    missing: HashSet<String>,
}

impl PartStore {
    pub fn new(library: Box<dyn PartLibrary>, ids: Arc<IdAllocator>) -> Self {
        Self {
            library,
            ids,
            cache: HashMap::new(),
            custom: HashMap::new(),
            internal: HashMap::new(),
            missing: HashSet::new(),
        }
    }

    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    /// Finds a part, loading and caching it from the library on first use.
    pub fn get(&mut self, id: &str) -> Option<Arc<PartDefinition>> {
        let key = normalize_name(id);
        if let Some(p) = self.cache.get(&key) {
            return Some(p.clone());
        }
        if !self.missing.contains(&key) {
            match self.load(id) {
                Ok(Some(part)) => {
                    let part = Arc::new(part);
                    self.cache.insert(key, part.clone());
                    return Some(part);
                }
                Ok(None) => debug!("Part {id} not found in library"),
                Err(e) => warn!("Unable to load part {id}: {e}"),
            }
            self.missing.insert(key.clone());
        }
        self.custom
            .get(&key)
            .or_else(|| self.internal.get(&key))
            .cloned()
    }

    /// Like [`PartStore::get`] but never loads from the library.
    pub fn peek(&self, id: &str) -> Option<Arc<PartDefinition>> {
        let key = normalize_name(id);
        self.cache
            .get(&key)
            .or_else(|| self.custom.get(&key))
            .or_else(|| self.internal.get(&key))
            .cloned()
    }

    fn load(&self, id: &str) -> Result<Option<PartDefinition>> {
        let Some(text) = self.library.resolve_text(id)? else {
            return Ok(None);
        };
        let (mut part, _diags) = PartDefinition::parse(id, &text, &self.ids);
        if !has_type_line(&text) {
            if let Some(kind) = self.library.classify(id) {
                part.kind = kind;
            }
        }
        Ok(Some(part))
    }

    pub fn exists(&mut self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_custom(&self, id: &str) -> bool {
        self.custom.contains_key(&normalize_name(id))
    }

    pub fn is_internal(&self, id: &str) -> bool {
        self.internal.contains_key(&normalize_name(id))
    }

    /// Registers a user or model part. Official library kinds are refused.
    pub fn register_custom(&mut self, part: PartDefinition) -> Result<Arc<PartDefinition>> {
        Self::check_unofficial(&part)?;
        let key = part.key();
        let part = Arc::new(part);
        self.custom.insert(key, part.clone());
        Ok(part)
    }

    /// Registers a helper part that is not meant to be placed by users.
    pub fn register_internal(&mut self, part: PartDefinition) -> Result<Arc<PartDefinition>> {
        Self::check_unofficial(&part)?;
        let key = part.key();
        let part = Arc::new(part);
        self.internal.insert(key, part.clone());
        Ok(part)
    }

    fn check_unofficial(part: &PartDefinition) -> Result<()> {
        if part.kind.is_official() {
            return Err(LDrawError::State(format!(
                "official part {} ({}) cannot be registered outside the library",
                part.id(),
                part.kind
            )));
        }
        Ok(())
    }

    pub fn remove_custom(&mut self, id: &str) -> Option<Arc<PartDefinition>> {
        self.custom.remove(&normalize_name(id))
    }

    /// The custom registration of `id`, ignoring the library.
    pub fn custom_part(&self, id: &str) -> Option<Arc<PartDefinition>> {
        self.custom.get(&normalize_name(id)).cloned()
    }

    /// Puts back a custom registration captured with
    /// [`PartStore::custom_part`]; `None` removes `id`.
    pub(crate) fn restore_custom(&mut self, id: &str, previous: Option<Arc<PartDefinition>>) {
        let key = normalize_name(id);
        match previous {
            Some(part) => {
                self.custom.insert(key, part);
            }
            None => {
                self.custom.remove(&key);
            }
        }
    }

    /// Forgets the library copy of `id` so the next lookup reloads it.
    pub fn invalidate(&mut self, id: &str) -> bool {
        let key = normalize_name(id);
        let had_miss = self.missing.remove(&key);
        self.cache.remove(&key).is_some() || had_miss
    }

    pub fn clear_library_cache(&mut self) {
        self.cache.clear();
        self.missing.clear();
    }

    pub fn custom_parts(&self) -> impl Iterator<Item = &Arc<PartDefinition>> {
        self.custom.values()
    }

    pub fn internal_parts(&self) -> impl Iterator<Item = &Arc<PartDefinition>> {
        self.internal.values()
    }

    /// Kind of `id` as the store sees it, loading it if needed.
    pub fn kind_of(&mut self, id: &str) -> Option<PartKind> {
        self.get(id).map(|p| p.kind)
    }
}

fn has_type_line(text: &str) -> bool {
    text.lines().any(|l| {
        let mut t = l.split_whitespace();
        t.next() == Some("0")
            && t.next().is_some_and(|k| {
                ["!LDRAW_ORG", "LDRAW_ORG", "Official", "Unofficial", "Un-official"]
                    .iter()
                    .any(|x| k.eq_ignore_ascii_case(x))
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;

    fn store(lib: MemoryLibrary) -> PartStore {
        PartStore::new(Box::new(lib), Arc::new(IdAllocator::new()))
    }

    #[test]
    fn loads_and_caches() {
        let mut s = store(MemoryLibrary::new().with("3001.dat", "0 Brick  2 x  4\n0 !LDRAW_ORG Part\n"));
        let a = s.get("3001.DAT").unwrap();
        let b = s.get("3001.dat").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.kind, PartKind::Official);
        assert_eq!(a.description, "Brick  2 x  4");
        assert!(s.get("3002.dat").is_none());
        assert!(!s.exists("3002.dat"));
    }

    #[test]
    fn library_classification_fills_missing_type() {
        let mut lib = MemoryLibrary::new();
        lib.insert_with_kind("stud.dat", "0 Stud\n", PartKind::Primitive);
        let mut s = store(lib);
        assert_eq!(s.kind_of("stud.dat"), Some(PartKind::Primitive));
    }

    #[test]
    fn custom_and_internal() {
        let mut s = store(MemoryLibrary::new());
        let model = PartDefinition::new("house.ldr", PartKind::Model);
        s.register_custom(model).unwrap();
        assert!(s.is_custom("HOUSE.LDR"));
        assert!(s.get("house.ldr").is_some());

        let helper = PartDefinition::new("__hose_seg.dat", PartKind::Unofficial);
        s.register_internal(helper).unwrap();
        assert!(s.is_internal("__hose_seg.dat"));

        let official = PartDefinition::new("3001.dat", PartKind::Official);
        assert!(matches!(
            s.register_custom(official),
            Err(LDrawError::State(_))
        ));
        assert!(s.remove_custom("house.ldr").is_some());
        assert!(s.peek("house.ldr").is_none());
    }

    #[test]
    fn folder_separators_do_not_matter() {
        let mut s = store(MemoryLibrary::new());
        s.register_custom(PartDefinition::new("sub\\part.ldr", PartKind::Submodel))
            .unwrap();
        assert!(s.is_custom("SUB/part.ldr"));
        assert!(s.get("sub\\part.ldr").is_some());
        assert!(s.peek("sub/part.ldr").is_some());
        assert!(s.remove_custom("sub\\PART.ldr").is_some());

        s.register_internal(PartDefinition::new("__aux\\seg.dat", PartKind::Unofficial))
            .unwrap();
        assert!(s.is_internal("__aux/seg.dat"));
    }

    #[test]
    fn misses_are_remembered_until_invalidated() {
        let mut s = store(MemoryLibrary::new());
        assert!(s.get("late.dat").is_none());
        assert!(s.invalidate("late.dat"));
        assert!(!s.invalidate("late.dat"));
    }

    #[test]
    fn library_shadows_custom_parts() {
        let mut s = store(MemoryLibrary::new().with("3001.dat", "0 Library brick\n"));
        let mut own = PartDefinition::new("3001.dat", PartKind::Unofficial);
        own.description = "Home made".into();
        s.register_custom(own).unwrap();
        assert_eq!(s.get("3001.dat").unwrap().description, "Library brick");
    }
}

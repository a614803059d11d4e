//! Connection points of placed parts.
//!
//! For a referenced part the resolver tries, in order: the autodetect table
//! (the part is itself a known primitive), a hand-authored `<main>.cxml`
//! file from the connection bundle, and finally the part's own sub-file
//! references, expanded depth first. Results are cached per part in the
//! part's local space and moved into place for each reference.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::catalog::{ConnectionCatalog, ConnectionTypeId};
use crate::command::Command;
use crate::connection::{ConnectionPoint, LocalConnection, ResolverConfig};
use crate::declared::parse_declared;
use crate::library::{base_name, normalize_name};
use crate::part::PartDefinition;
use crate::source::{ConnectionSource, DECLARED_EXT, read_autoconnect};
use crate::store::PartStore;
use crate::transform::Transform;
use crate::{LDrawError, Result};

/// Printed variants such as `3001p11.dat` share the connections of `3001`.
static PRINTED_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]+[a-oq-z]?p.+\.dat$").expect("printed part pattern is valid")
});

/// `3001p11.dat` -> `3001`, `3001.dat` -> `3001`. Autodetected primitives
/// are never treated as printed parts.
pub fn main_part_name(id: &str, catalog: &ConnectionCatalog) -> String {
    let id = normalize_name(id);
    if PRINTED_PART.is_match(&id) && !catalog.is_autodetect(&id) {
        if let Some(i) = id.find('p') {
            return id[..i].to_string();
        }
    }
    match id.strip_suffix(".dat") {
        Some(stem) => stem.to_string(),
        None => id,
    }
}

#[derive(Debug)]
struct CacheEntry {
    points: Arc<Vec<LocalConnection>>,
    /// Parts whose definition went into `points`, the target included.
    depends_on: HashSet<String>,
}

/// State carried down one expansion.
struct Expansion<'a> {
    points: Vec<LocalConnection>,
    depends_on: HashSet<String>,
    stack: Vec<String>,
    store: &'a mut PartStore,
}

pub struct ConnectionResolver {
    catalog: Arc<ConnectionCatalog>,
    source: Option<Box<dyn ConnectionSource>>,
    config: ResolverConfig,
    always_checked: HashSet<ConnectionTypeId>,
    cache: HashMap<String, CacheEntry>,
    /// Parsed declared files per main name; `None` records an absent or
    /// unusable file.
    declared: HashMap<String, Option<Arc<Vec<LocalConnection>>>>,
    autoconnect: BTreeSet<String>,
}

impl ConnectionResolver {
    pub fn new(catalog: Arc<ConnectionCatalog>, source: Option<Box<dyn ConnectionSource>>) -> Self {
        Self::with_config(catalog, source, ResolverConfig::default())
    }

    pub fn with_config(
        catalog: Arc<ConnectionCatalog>,
        source: Option<Box<dyn ConnectionSource>>,
        config: ResolverConfig,
    ) -> Self {
        let always_checked = config
            .always_checked_types
            .iter()
            .filter_map(|name| match catalog.by_name(name) {
                Some(t) => Some(t.id),
                None => {
                    debug!("Always-checked connection type {name} is not in the catalog");
                    None
                }
            })
            .collect();
        let autoconnect = match source.as_deref().map(|s| read_autoconnect(s)) {
            Some(Ok(set)) => set.into_iter().collect(),
            Some(Err(e)) => {
                warn!("Unable to read autoconnect list: {e}");
                BTreeSet::new()
            }
            None => BTreeSet::new(),
        };
        Self {
            catalog,
            source,
            config,
            always_checked,
            cache: HashMap::new(),
            declared: HashMap::new(),
            autoconnect,
        }
    }

    pub fn catalog(&self) -> &Arc<ConnectionCatalog> {
        &self.catalog
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Connection points of the part placed by `command`, in the space of
    /// the model holding the command. Unknown parts yield an empty list.
    pub fn connections_of(
        &mut self,
        command: &Command,
        store: &mut PartStore,
    ) -> Result<Vec<ConnectionPoint>> {
        let Some(reference) = command.reference() else {
            return Err(LDrawError::State(format!(
                "connections requested for {} command {}",
                command.kind().name(),
                command.id()
            )));
        };
        let local = self.local_connections(&reference.part_id, store);
        let ids = store.ids().clone();
        Ok(local
            .iter()
            .map(|l| ConnectionPoint::place(l, command.id(), &reference.transform, &ids))
            .collect())
    }

    /// Connection points of `part_id` in its own space.
    pub fn local_connections(
        &mut self,
        part_id: &str,
        store: &mut PartStore,
    ) -> Arc<Vec<LocalConnection>> {
        let key = normalize_name(part_id);
        if let Some(entry) = self.cache.get(&key) {
            trace!("Connection cache hit for {key}");
            return entry.points.clone();
        }
        trace!("Connection cache miss for {key}");
        match self.compute(part_id, store) {
            Ok(Some(entry)) => {
                let points = entry.points.clone();
                self.cache.insert(key, entry);
                points
            }
            Ok(None) => {
                warn!("{}", LDrawError::UnresolvedReference(part_id.to_string()));
                Arc::default()
            }
            Err(e) => {
                warn!("No connections for {part_id}: {e}");
                Arc::default()
            }
        }
    }

    fn compute(&mut self, part_id: &str, store: &mut PartStore) -> Result<Option<CacheEntry>> {
        let key = normalize_name(part_id);
        let eps = self.config.duplicate_epsilon;
        let single = |points: Vec<LocalConnection>| CacheEntry {
            points: Arc::new(points),
            depends_on: HashSet::from([key.clone()]),
        };

        if let Some(entry) = self.catalog.autodetect(&base_name(part_id)) {
            let mut points = Vec::with_capacity(entry.points.len());
            for p in &entry.points {
                p.push_into(&mut points, entry.check_duplicates, eps);
            }
            return Ok(Some(single(points)));
        }

        if let Some(declared) = self.declared(part_id) {
            let mut points = Vec::with_capacity(declared.len());
            for p in declared.iter() {
                p.push_into(&mut points, self.always_checked.contains(&p.kind), eps);
            }
            return Ok(Some(single(points)));
        }

        let Some(part) = store.get(part_id) else {
            return Ok(None);
        };
        let mut expansion = Expansion {
            points: Vec::new(),
            depends_on: HashSet::from([key.clone()]),
            stack: vec![key.clone()],
            store,
        };
        self.expand(&part, &Transform::IDENTITY, false, &mut expansion)?;
        debug!(
            "Computed {} connections for {part_id} from {} parts",
            expansion.points.len(),
            expansion.depends_on.len()
        );
        Ok(Some(CacheEntry {
            points: Arc::new(expansion.points),
            depends_on: expansion.depends_on,
        }))
    }

    fn expand(
        &mut self,
        part: &PartDefinition,
        transform: &Transform,
        invert: bool,
        x: &mut Expansion<'_>,
    ) -> Result<()> {
        let catalog = self.catalog.clone();
        let eps = self.config.duplicate_epsilon;
        for (_, r) in part.references() {
            let placed = transform.compose(&r.transform);
            let inverted = invert ^ r.invert;

            if let Some(entry) = catalog.autodetect(&base_name(&r.part_id)) {
                for p in &entry.points {
                    p.transformed(&placed)
                        .push_into(&mut x.points, entry.check_duplicates, eps);
                }
                continue;
            }

            if let Some(declared) = self.declared(&r.part_id) {
                for p in declared.iter() {
                    let check = self.always_checked.contains(&p.kind);
                    p.transformed(&placed).push_into(&mut x.points, check, eps);
                }
                continue;
            }

            let child_key = normalize_name(&r.part_id);
            if x.stack.contains(&child_key) {
                return Err(LDrawError::CyclicReference(r.part_id.clone()));
            }
            // Recorded even when missing so registering the part later
            // invalidates this result.
            x.depends_on.insert(child_key.clone());
            let Some(child) = x.store.get(&r.part_id) else {
                debug!("{}: sub-file {} not found", part.id(), r.part_id);
                continue;
            };
            trace!("Expanding {} (inverted: {inverted})", r.part_id);
            x.stack.push(child_key);
            self.expand(&child, &placed, inverted, x)?;
            x.stack.pop();
        }
        Ok(())
    }

    fn declared(&mut self, part_id: &str) -> Option<Arc<Vec<LocalConnection>>> {
        let main = main_part_name(part_id, &self.catalog);
        if let Some(cached) = self.declared.get(&main) {
            return cached.clone();
        }
        let loaded = self.load_declared(&main);
        self.declared.insert(main, loaded.clone());
        loaded
    }

    fn load_declared(&self, main: &str) -> Option<Arc<Vec<LocalConnection>>> {
        let source = self.source.as_deref()?;
        let file = format!("{main}{DECLARED_EXT}");
        let xml = match source.read_declared(main) {
            Ok(Some(xml)) => xml,
            Ok(None) => return None,
            Err(e) => {
                warn!("Unable to read connection file {file}: {e}");
                return None;
            }
        };
        match parse_declared(&xml, &file, &self.catalog) {
            Ok(points) => {
                debug!("Read {} declared connections from {file}", points.len());
                Some(Arc::new(points))
            }
            Err(e) => {
                warn!("Ignoring connection file: {e}");
                None
            }
        }
    }

    /// True when the part's connections come from a declared file rather
    /// than autodetection.
    pub fn has_connection_file(&self, part_id: &str) -> bool {
        if self.catalog.is_autodetect(&base_name(part_id)) {
            return false;
        }
        self.source
            .as_deref()
            .is_some_and(|s| s.has_declared(&main_part_name(part_id, &self.catalog)))
    }

    /// Autodetected primitives always count as checked; other parts when
    /// their main name is in the autoconnect list.
    pub fn is_autoconnect_checked(&self, part_id: &str) -> bool {
        self.catalog.is_autodetect(&base_name(part_id))
            || self
                .autoconnect
                .contains(&main_part_name(part_id, &self.catalog))
    }

    pub fn mark_autoconnect_checked(&mut self, part_id: &str) -> bool {
        let main = main_part_name(part_id, &self.catalog);
        self.autoconnect.insert(main)
    }

    pub fn unmark_autoconnect_checked(&mut self, part_id: &str) -> bool {
        let main = main_part_name(part_id, &self.catalog);
        self.autoconnect.remove(&main)
    }

    /// The autoconnect list in `autoconnect.csv` form.
    pub fn autoconnect_csv(&self) -> String {
        self.autoconnect.iter().map(|n| format!("{n}\n")).collect()
    }

    /// Drops every cached result that used `part_id`. Returns how many
    /// entries were removed.
    pub fn invalidate(&mut self, part_id: &str) -> usize {
        let key = normalize_name(part_id);
        let before = self.cache.len();
        self.cache.retain(|_, e| !e.depends_on.contains(&key));
        let removed = before - self.cache.len();
        if removed > 0 {
            debug!("Invalidated {removed} cached connection lists using {key}");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.declared.clear();
    }

    pub fn cached_parts(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::catalog;
    use crate::ids::IdAllocator;
    use crate::library::MemoryLibrary;
    use crate::parser::parse_line;
    use crate::part::PartKind;
    use crate::source::MemorySource;
    use glam::DVec3;

    const BRICK: &str = "0 Brick 1 x 2
0 !LDRAW_ORG Part
1 16 -10 0 0 1 0 0 0 1 0 0 0 1 stud.dat
1 16 10 0 0 1 0 0 0 1 0 0 0 1 stud.dat
";

    const WRAPPER: &str = "0 Brick on a plate
1 16 0 -24 0 1 0 0 0 1 0 0 0 1 3004.dat
1 16 0 0 0 1 0 0 0 1 0 0 0 1 axle.dat
";

    fn setup(source: Option<MemorySource>) -> (ConnectionResolver, PartStore) {
        let ids = Arc::new(IdAllocator::new());
        let lib = MemoryLibrary::new()
            .with("3004.dat", BRICK)
            .with("wrapper.ldr", WRAPPER)
            .with("loop_a.dat", "1 16 0 0 0 1 0 0 0 1 0 0 0 1 loop_b.dat\n")
            .with("loop_b.dat", "1 16 0 0 0 1 0 0 0 1 0 0 0 1 loop_a.dat\n");
        let store = PartStore::new(Box::new(lib), ids);
        let source = source.map(|s| Box::new(s) as Box<dyn ConnectionSource>);
        (ConnectionResolver::new(Arc::new(catalog()), source), store)
    }

    fn reference(line: &str, store: &PartStore) -> Command {
        parse_line(line, 1, false, store.ids()).unwrap()
    }

    fn close(a: DVec3, b: DVec3) -> bool {
        (a - b).length() < 1e-9
    }

    #[test]
    fn identity_stud_keeps_canonical_points() {
        let (mut r, mut store) = setup(None);
        let cmd = reference("1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud.dat", &store);
        let points = r.connections_of(&cmd, &mut store).unwrap();
        assert_eq!(points.len(), 1);
        let p = points[0];
        assert_eq!(p.kind, r.catalog().by_name("STUD").unwrap().id);
        assert_eq!(p.owner, cmd.id());
        assert!(close(p.p1, DVec3::ZERO));
        assert!(close(p.p2, DVec3::new(0.0, -4.0, 0.0)));
        assert!(close(p.delta, DVec3::ZERO));
    }

    #[test]
    fn nested_references_compose_transforms() {
        let (mut r, mut store) = setup(None);
        let cmd = reference("1 4 100 0 0 1 0 0 0 1 0 0 0 1 wrapper.ldr", &store);
        let points = r.connections_of(&cmd, &mut store).unwrap();
        assert_eq!(points.len(), 3);
        let studs: Vec<_> = points
            .iter()
            .filter(|p| Some(p.kind) == r.catalog().by_name("STUD").map(|t| t.id))
            .collect();
        assert_eq!(studs.len(), 2);
        assert!(close(studs[0].p1, DVec3::new(90.0, -24.0, 0.0)));
        assert!(close(studs[1].p1, DVec3::new(110.0, -24.0, 0.0)));
        assert!(close(studs[1].origin(), DVec3::new(100.0, 0.0, 0.0)));
        assert!(r.cached_parts() >= 1);
    }

    #[test]
    fn repeated_calls_agree() {
        let (mut r, mut store) = setup(None);
        let cmd = reference("1 16 5 6 7 0 0 1 0 1 0 -1 0 0 3004.dat", &store);
        let a = r.connections_of(&cmd, &mut store).unwrap();
        let b = r.connections_of(&cmd, &mut store).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_ne!(x.id, y.id);
            assert_eq!((x.kind, x.p1, x.p2, x.delta), (y.kind, y.p1, y.p2, y.delta));
        }
    }

    #[test]
    fn autodetect_duplicates_are_merged() {
        let (mut r, mut store) = setup(None);
        let mut twice = PartDefinition::new("twice.dat", PartKind::Unofficial);
        for line in [
            "1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud.dat",
            "1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud2.dat",
            "1 16 0 0 0 1 0 0 0 1 0 0 0 1 axle.dat",
            "1 16 0 0 0 1 0 0 0 1 0 0 0 1 axle.dat",
        ] {
            twice.add_or_replace(reference(line, &store));
        }
        store.register_custom(twice).unwrap();
        assert_eq!(r.local_connections("twice.dat", &mut store).len(), 3);
    }

    #[test]
    fn declared_file_wins_over_expansion() {
        let cxml = r#"<connections>
<cpoint type="R_STUD"><base x="0" y="4" z="0"/><dir x="0" y="24" z="0"/></cpoint>
<cpoint type="R_STUD"><base x="0" y="4" z="0"/><dir x="0" y="24" z="0"/></cpoint>
<cpoint type="STUD_F"><base x="0" y="24" z="0"/><dir x="0" y="20" z="0"/></cpoint>
<cpoint type="STUD_F"><base x="0" y="24" z="0"/><dir x="0" y="20" z="0"/></cpoint>
</connections>"#;
        let (mut r, mut store) = setup(Some(MemorySource::new().with("3004.cxml", cxml)));
        assert!(r.has_connection_file("3004p01.dat"));
        assert!(!r.has_connection_file("stud.dat"));

        let printed = reference("1 16 0 0 0 1 0 0 0 1 0 0 0 1 3004p01.dat", &store);
        let points = r.connections_of(&printed, &mut store).unwrap();
        // tube studs deduplicated, other declared points kept as written
        assert_eq!(points.len(), 3);
    }

    #[test]
    fn malformed_declared_file_falls_back() {
        let source = MemorySource::new().with("3004.cxml", "<connections><cpoint");
        let (mut r, mut store) = setup(Some(source));
        assert_eq!(r.local_connections("3004.dat", &mut store).len(), 2);
    }

    #[test]
    fn main_names() {
        let c = catalog();
        assert_eq!(main_part_name("3001p11.DAT", &c), "3001");
        assert_eq!(main_part_name("3626bpn1.dat", &c), "3626b");
        assert_eq!(main_part_name("3001.dat", &c), "3001");
        assert_eq!(main_part_name("stud.dat", &c), "stud");
        assert_eq!(main_part_name("model.ldr", &c), "model.ldr");
    }

    #[test]
    fn cycles_yield_nothing_and_are_not_cached() {
        let (mut r, mut store) = setup(None);
        assert!(r.local_connections("loop_a.dat", &mut store).is_empty());
        assert_eq!(r.cached_parts(), 0);
    }

    #[test]
    fn unknown_parts_and_non_references() {
        let (mut r, mut store) = setup(None);
        let cmd = reference("1 16 0 0 0 1 0 0 0 1 0 0 0 1 nowhere.dat", &store);
        assert!(r.connections_of(&cmd, &mut store).unwrap().is_empty());
        assert_eq!(r.cached_parts(), 0);

        let line = reference("2 24 0 0 0 1 1 1", &store);
        assert!(matches!(
            r.connections_of(&line, &mut store),
            Err(LDrawError::State(_))
        ));
    }

    #[test]
    fn invalidation_follows_dependencies() {
        let (mut r, mut store) = setup(None);
        r.local_connections("wrapper.ldr", &mut store);
        r.local_connections("3004.dat", &mut store);
        r.local_connections("stud.dat", &mut store);
        assert_eq!(r.cached_parts(), 3);
        assert_eq!(r.invalidate("3004.DAT"), 2);
        assert_eq!(r.cached_parts(), 1);
        r.clear();
        assert_eq!(r.cached_parts(), 0);
    }

    #[test]
    fn registering_a_missing_sub_part_refreshes_its_users() {
        let (mut r, mut store) = setup(None);
        let mut holder = PartDefinition::new("holder.ldr", PartKind::Model);
        holder.add_or_replace(reference("1 16 0 0 0 1 0 0 0 1 0 0 0 1 plate.dat", &store));
        store.register_custom(holder).unwrap();
        assert!(r.local_connections("holder.ldr", &mut store).is_empty());

        let mut plate = PartDefinition::new("plate.dat", PartKind::Unofficial);
        plate.add_or_replace(reference("1 16 0 0 0 1 0 0 0 1 0 0 0 1 stud.dat", &store));
        store.register_custom(plate).unwrap();
        assert_eq!(r.invalidate("plate.dat"), 1);
        assert_eq!(r.local_connections("holder.ldr", &mut store).len(), 1);
    }

    #[test]
    fn autoconnect_list() {
        let source = MemorySource::new().with(crate::source::AUTOCONNECT_FILE, "3001\n");
        let (mut r, _) = setup(Some(source));
        assert!(r.is_autoconnect_checked("3001p01.dat"));
        assert!(r.is_autoconnect_checked("stud.dat"));
        assert!(!r.is_autoconnect_checked("3004.dat"));
        assert!(r.mark_autoconnect_checked("3004.dat"));
        assert_eq!(r.autoconnect_csv(), "3001\n3004\n");
    }
}

use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::catalog::ConnectionCatalog;
use crate::command::Command;
use crate::connection::{ConnectionPoint, ResolverConfig};
use crate::flex::FlexCatalog;
use crate::ids::IdAllocator;
use crate::import::{self, ImportOptions, ImportedModel};
use crate::library::PartLibrary;
use crate::parser::parse_line;
use crate::part::PartDefinition;
use crate::resolver::ConnectionResolver;
use crate::source::{ConnectionSource, open_source};
use crate::store::PartStore;
use crate::Result;

/// Everything one editing session needs: the part store, the connection
/// resolver on top of it and the flexible part table.
///
/// Changes to parts go through the session so cached connections of every
/// part built on them are dropped.
pub struct Session {
    ids: Arc<IdAllocator>,
    store: PartStore,
    resolver: ConnectionResolver,
    flex: FlexCatalog,
}

impl Session {
    /// A session with a catalog but no connection bundle: declared files,
    /// flexible parts and the autoconnect list are unavailable.
    pub fn new(library: Box<dyn PartLibrary>, catalog: ConnectionCatalog) -> Self {
        let ids = Arc::new(IdAllocator::new());
        Self {
            store: PartStore::new(library, ids.clone()),
            resolver: ConnectionResolver::new(Arc::new(catalog), None),
            flex: FlexCatalog::default(),
            ids,
        }
    }

    pub fn with_source(
        library: Box<dyn PartLibrary>,
        source: Box<dyn ConnectionSource>,
        config: ResolverConfig,
    ) -> Result<Self> {
        let ids = Arc::new(IdAllocator::new());
        let mut store = PartStore::new(library, ids.clone());
        let catalog = ConnectionCatalog::from_source(source.as_ref())?;
        let flex = FlexCatalog::from_source(source.as_ref(), &mut store)?;
        debug!(
            "Session on {}: {} connection types, {} flexible parts",
            source.name(),
            catalog.types().len(),
            flex.len()
        );
        let resolver = ConnectionResolver::with_config(Arc::new(catalog), Some(source), config);
        Ok(Self {
            ids,
            store,
            resolver,
            flex,
        })
    }

    /// Opens a connection bundle (`ldrconn.zip` or an unpacked directory).
    pub fn open(library: Box<dyn PartLibrary>, bundle: &Path) -> Result<Self> {
        Self::with_source(library, open_source(bundle)?, ResolverConfig::default())
    }

    pub fn ids(&self) -> &Arc<IdAllocator> {
        &self.ids
    }

    pub fn store(&self) -> &PartStore {
        &self.store
    }

    pub fn resolver(&self) -> &ConnectionResolver {
        &self.resolver
    }

    pub fn resolver_mut(&mut self) -> &mut ConnectionResolver {
        &mut self.resolver
    }

    pub fn catalog(&self) -> &ConnectionCatalog {
        self.resolver.catalog()
    }

    pub fn flex(&self) -> &FlexCatalog {
        &self.flex
    }

    pub fn part(&mut self, id: &str) -> Option<Arc<PartDefinition>> {
        self.store.get(id)
    }

    pub fn parse_line(&self, line: &str, line_no: usize, invert: bool) -> Result<Command> {
        parse_line(line, line_no, invert, &self.ids)
    }

    pub fn connections_of(&mut self, command: &Command) -> Result<Vec<ConnectionPoint>> {
        self.resolver.connections_of(command, &mut self.store)
    }

    /// Connection points of every part placed directly in `part`.
    pub fn connections_in(&mut self, part: &PartDefinition) -> Result<Vec<ConnectionPoint>> {
        let mut points = Vec::new();
        for (command, _) in part.references() {
            points.extend(self.connections_of(command)?);
        }
        Ok(points)
    }

    pub fn register_custom(&mut self, part: PartDefinition) -> Result<Arc<PartDefinition>> {
        let part = self.store.register_custom(part)?;
        self.resolver.invalidate(part.id());
        Ok(part)
    }

    pub fn register_internal(&mut self, part: PartDefinition) -> Result<Arc<PartDefinition>> {
        let part = self.store.register_internal(part)?;
        self.resolver.invalidate(part.id());
        Ok(part)
    }

    pub fn remove_custom(&mut self, id: &str) -> Option<Arc<PartDefinition>> {
        let removed = self.store.remove_custom(id);
        self.resolver.invalidate(id);
        removed
    }

    /// Forgets a part everywhere: the next lookup reloads it and connections
    /// are recomputed.
    pub fn invalidate(&mut self, id: &str) {
        self.store.invalidate(id);
        self.resolver.invalidate(id);
    }

    pub fn import(
        &mut self,
        name: &str,
        text: &str,
        options: &mut ImportOptions<'_>,
    ) -> Result<ImportedModel> {
        let result = import::import(name, text, &mut self.store, options);
        self.after_import(&result);
        result
    }

    pub fn import_file(
        &mut self,
        path: &Path,
        options: &mut ImportOptions<'_>,
    ) -> Result<ImportedModel> {
        let result = import::import_file(path, &mut self.store, options);
        self.after_import(&result);
        result
    }

    fn after_import(&mut self, result: &Result<ImportedModel>) {
        match result {
            Ok(model) => {
                for part in std::iter::once(&model.main).chain(&model.submodels) {
                    self.resolver.invalidate(part.id());
                }
            }
            Err(_) => self.resolver.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{AUTODETECT, TYPES, catalog};
    use crate::library::MemoryLibrary;
    use crate::part::PartKind;
    use crate::source::{AUTODETECT_FILE, FLEX_FILE, MemorySource, TYPES_FILE};

    fn library() -> Box<MemoryLibrary> {
        Box::new(MemoryLibrary::new().with(
            "3004.dat",
            "0 Brick 1 x 2\n1 16 -10 0 0 1 0 0 0 1 0 0 0 1 stud.dat\n1 16 10 0 0 1 0 0 0 1 0 0 0 1 stud.dat\n",
        ))
    }

    #[test]
    fn custom_part_changes_refresh_connections() {
        let mut session = Session::new(library(), catalog());
        let stud = |s: &Session, x: i32| {
            s.parse_line(&format!("1 16 {x} 0 0 1 0 0 0 1 0 0 0 1 stud.dat"), 1, false)
                .unwrap()
        };
        let mut plate = PartDefinition::new("plate.dat", PartKind::Unofficial);
        plate.add_or_replace(stud(&session, 0));
        session.register_custom(plate.clone()).unwrap();

        let placed = session
            .parse_line("1 16 0 0 0 1 0 0 0 1 0 0 0 1 plate.dat", 1, false)
            .unwrap();
        assert_eq!(session.connections_of(&placed).unwrap().len(), 1);

        plate.add_or_replace(stud(&session, 20));
        session.register_custom(plate).unwrap();
        assert_eq!(session.connections_of(&placed).unwrap().len(), 2);

        session.remove_custom("plate.dat");
        assert!(session.connections_of(&placed).unwrap().is_empty());
    }

    #[test]
    fn late_sub_part_reaches_models_using_it() {
        let mut session = Session::new(library(), catalog());
        let line = |s: &Session, id: &str| {
            s.parse_line(&format!("1 16 0 0 0 1 0 0 0 1 0 0 0 1 {id}"), 1, false)
                .unwrap()
        };
        let mut wrapper = PartDefinition::new("wrapper.ldr", PartKind::Model);
        wrapper.add_or_replace(line(&session, "plate.dat"));
        session.register_custom(wrapper).unwrap();

        let placed = line(&session, "wrapper.ldr");
        assert!(session.connections_of(&placed).unwrap().is_empty());

        let mut plate = PartDefinition::new("plate.dat", PartKind::Unofficial);
        plate.add_or_replace(line(&session, "stud.dat"));
        session.register_custom(plate).unwrap();
        assert_eq!(session.connections_of(&placed).unwrap().len(), 1);
    }

    #[test]
    fn bundle_session() {
        let flex = r#"<flexparts><auxparts><auxp name="__seg.dat">0 Segment</auxp></auxparts>
<partlist><part name="hose.dat" type="cont" rigid="5" len="100">
<start name="a.dat" b="0,0,0" h="0,1,0"/><mid name="__seg.dat" b="0,0,0" h="0,1,0"/><end name="b.dat" b="0,0,0" h="0,1,0"/>
</part></partlist></flexparts>"#;
        let source = MemorySource::new()
            .with(TYPES_FILE, TYPES)
            .with(AUTODETECT_FILE, AUTODETECT)
            .with(FLEX_FILE, flex);
        let mut session =
            Session::with_source(library(), Box::new(source), ResolverConfig::default()).unwrap();
        assert_eq!(session.catalog().types().len(), 8);
        assert!(session.flex().is_flex("HOSE.DAT"));
        assert!(session.store().is_internal("__seg.dat"));

        let model = session
            .import(
                "m.ldr",
                "1 16 0 0 0 1 0 0 0 1 0 0 0 1 3004.dat\n1 16 0 -24 0 1 0 0 0 1 0 0 0 1 3004.dat\n",
                &mut ImportOptions::new(),
            )
            .unwrap();
        let points = session.connections_in(&model.main).unwrap();
        assert_eq!(points.len(), 4);
    }

    #[test]
    fn missing_bundle_files_fail() {
        let source = MemorySource::new().with(TYPES_FILE, TYPES);
        assert!(
            Session::with_source(library(), Box::new(source), ResolverConfig::default()).is_err()
        );
    }
}

//! Connection type definitions and the per-primitive autodetect table.
//!
//! Both tables are read once from XML and never change afterwards. Loading is
//! all-or-nothing: the first malformed record aborts with a
//! [`LDrawError::Configuration`] carrying the XML line number.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use glam::DVec3;
use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::connection::LocalConnection;
use crate::source::{AUTODETECT_FILE, ConnectionSource, TYPES_FILE};
use crate::{LDrawError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionTypeId(u32);

impl ConnectionTypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Geometric family of a connection: where along `p1`-`p2` a mate can sit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionFamily {
    /// Single orientation at `p1` (studs, tubes, axle holes).
    Vector,
    /// Anywhere along the `p1`-`p2` segment (axles, bars).
    Rail,
    /// Point-like, orientation free (ball joints).
    Point,
}

impl ConnectionFamily {
    fn parse(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "V" => Some(ConnectionFamily::Vector),
            "R" => Some(ConnectionFamily::Rail),
            "P" => Some(ConnectionFamily::Point),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionFamily::Vector => "vector",
            ConnectionFamily::Rail => "rail",
            ConnectionFamily::Point => "point",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionType {
    pub id: ConnectionTypeId,
    pub name: String,
    pub description: String,
    pub opposite: ConnectionTypeId,
    pub family: ConnectionFamily,
}

/// Canonical connections of one autodetected primitive, in its local space.
#[derive(Debug, Clone, PartialEq)]
pub struct AutodetectEntry {
    pub points: Vec<LocalConnection>,
    /// Drop points that duplicate one already collected for the same part.
    pub check_duplicates: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionCatalog {
    types: Vec<ConnectionType>,
    by_name: HashMap<String, ConnectionTypeId>,
    autodetect: HashMap<String, Arc<AutodetectEntry>>,
}

impl ConnectionCatalog {
    /// Loads type definitions and the autodetect table from a bundle. Both
    /// files are required.
    pub fn from_source(source: &dyn ConnectionSource) -> Result<Self> {
        let missing = |file: &str| {
            LDrawError::configuration(source.name(), 0, format!("missing {file}"))
        };
        let types = source.read(TYPES_FILE)?.ok_or_else(|| missing(TYPES_FILE))?;
        let autodetect = source
            .read(AUTODETECT_FILE)?
            .ok_or_else(|| missing(AUTODETECT_FILE))?;

        let mut catalog = Self::default();
        catalog.load_types(&types, TYPES_FILE)?;
        catalog.load_autodetect(&autodetect, AUTODETECT_FILE)?;
        Ok(catalog)
    }

    /// Parses `<connectiondefs>`; every `<conndef>` must hold exactly two
    /// `<conn name type descr>` elements which become each other's opposite.
    pub fn load_types(&mut self, xml: &str, source_name: &str) -> Result<()> {
        let doc = Document::parse(xml)?;
        let reader = XmlReader::new(&doc, source_name);
        let root = reader.root("connectiondefs")?;

        let mut pairs = Vec::new();
        let mut seen: HashSet<String> = self.by_name.keys().cloned().collect();
        for def in root.children().filter(|n| n.has_tag_name("conndef")) {
            let conns: Vec<Node> = def.children().filter(|n| n.has_tag_name("conn")).collect();
            if conns.len() != 2 {
                return Err(reader.error(
                    &def,
                    format!(
                        "connection must be paired, found {} conn elements",
                        conns.len()
                    ),
                ));
            }
            let a = reader.conn(&conns[0])?;
            let b = reader.conn(&conns[1])?;
            for (conn, node) in [(&a, &conns[0]), (&b, &conns[1])] {
                if !seen.insert(conn.0.clone()) {
                    return Err(reader.error(node, format!("duplicate connection type {}", conn.0)));
                }
            }
            pairs.push((a, b));
        }

        for (a, b) in pairs {
            let ia = ConnectionTypeId(self.types.len() as u32);
            let ib = ConnectionTypeId(ia.0 + 1);
            for (id, opposite, (name, family, description)) in [(ia, ib, a), (ib, ia, b)] {
                self.by_name.insert(name.clone(), id);
                self.types.push(ConnectionType {
                    id,
                    name,
                    description,
                    opposite,
                    family,
                });
            }
        }
        debug!("Loaded {} connection types from {source_name}", self.types.len());
        Ok(())
    }

    /// Parses `<autodetect>`: each `<primitive checkdup="1">` lists one or
    /// more `<name p="..."/>` sharing the `<cp type bx by bz hx hy hz/>`
    /// points. Types must already be loaded.
    pub fn load_autodetect(&mut self, xml: &str, source_name: &str) -> Result<()> {
        let doc = Document::parse(xml)?;
        let reader = XmlReader::new(&doc, source_name);
        let root = reader.root("autodetect")?;

        let mut table = HashMap::new();
        for prim in root.children().filter(|n| n.has_tag_name("primitive")) {
            let check_duplicates = prim.attribute("checkdup").map(str::trim) == Some("1");
            let mut names = Vec::new();
            let mut points = Vec::new();
            for child in prim.children().filter(Node::is_element) {
                match child.tag_name().name() {
                    "name" => {
                        let p = reader.required(&child, "p")?;
                        names.push(p.to_lowercase());
                    }
                    "cp" => {
                        let type_name = reader.required(&child, "type")?.to_uppercase();
                        let kind = self.by_name(&type_name).ok_or_else(|| {
                            reader.error(&child, format!("unknown connection type {type_name}"))
                        })?;
                        points.push(LocalConnection {
                            kind: kind.id,
                            p1: reader.vec3(&child, ["bx", "by", "bz"])?,
                            p2: reader.vec3(&child, ["hx", "hy", "hz"])?,
                        });
                    }
                    other => warn!("{source_name}: ignoring <{other}> in <primitive>"),
                }
            }
            if names.is_empty() {
                return Err(reader.error(&prim, "primitive without <name>"));
            }
            let entry = Arc::new(AutodetectEntry {
                points,
                check_duplicates,
            });
            for name in names {
                table.insert(name, entry.clone());
            }
        }
        debug!("Loaded {} autodetect primitives from {source_name}", table.len());
        self.autodetect.extend(table);
        Ok(())
    }

    pub fn get(&self, id: ConnectionTypeId) -> Option<&ConnectionType> {
        self.types.get(id.index())
    }

    /// Lookup by upper-case name, e.g. `STUD`.
    pub fn by_name(&self, name: &str) -> Option<&ConnectionType> {
        self.by_name
            .get(&name.trim().to_uppercase())
            .and_then(|id| self.get(*id))
    }

    pub fn opposite(&self, id: ConnectionTypeId) -> Option<ConnectionTypeId> {
        self.get(id).map(|t| t.opposite)
    }

    /// Autodetect entry for a primitive file name such as `stud.dat`.
    pub fn autodetect(&self, primitive: &str) -> Option<&Arc<AutodetectEntry>> {
        self.autodetect.get(&primitive.to_lowercase())
    }

    pub fn is_autodetect(&self, primitive: &str) -> bool {
        self.autodetect(primitive).is_some()
    }

    pub fn types(&self) -> &[ConnectionType] {
        &self.types
    }

    pub fn autodetect_names(&self) -> impl Iterator<Item = &str> {
        self.autodetect.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// name, family, description
type ConnDef = (String, ConnectionFamily, String);

/// Attribute helpers that turn missing or bad values into configuration
/// errors with the element's line number.
pub(crate) struct XmlReader<'a, 'input> {
    doc: &'a Document<'input>,
    source_name: &'a str,
}

impl<'a, 'input> XmlReader<'a, 'input> {
    pub(crate) fn new(doc: &'a Document<'input>, source_name: &'a str) -> Self {
        Self { doc, source_name }
    }

    pub(crate) fn root(&self, tag: &str) -> Result<Node<'a, 'input>> {
        let root = self.doc.root_element();
        if root.tag_name().name() != tag {
            return Err(self.error(
                &root,
                format!(
                    "expected root element <{tag}>, found <{}>",
                    root.tag_name().name()
                ),
            ));
        }
        Ok(root)
    }

    pub(crate) fn error(&self, node: &Node, message: impl Into<String>) -> LDrawError {
        let line = self.doc.text_pos_at(node.range().start).row;
        LDrawError::configuration(self.source_name, line, message)
    }

    pub(crate) fn required<'n>(&self, node: &Node<'n, '_>, attr: &str) -> Result<&'n str> {
        node.attribute(attr)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                self.error(
                    node,
                    format!(
                        "missing attribute '{attr}' on <{}>",
                        node.tag_name().name()
                    ),
                )
            })
    }

    pub(crate) fn number(&self, node: &Node, attr: &str) -> Result<f64> {
        let value = self.required(node, attr)?;
        value
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.error(node, format!("wrong coordinate value {attr}=\"{value}\"")))
    }

    pub(crate) fn vec3(&self, node: &Node, attrs: [&str; 3]) -> Result<DVec3> {
        Ok(DVec3::new(
            self.number(node, attrs[0])?,
            self.number(node, attrs[1])?,
            self.number(node, attrs[2])?,
        ))
    }

    fn conn(&self, node: &Node) -> Result<ConnDef> {
        let name = self.required(node, "name")?.to_uppercase();
        let code = self.required(node, "type")?;
        let family = ConnectionFamily::parse(code)
            .ok_or_else(|| self.error(node, format!("type must be R|V|P, found '{code}'")))?;
        let description = self.required(node, "descr")?.to_string();
        Ok((name, family, description))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TYPES: &str = r#"<?xml version="1.0"?>
<connectiondefs>
  <conndef>
    <conn name="stud" type="V" descr="Stud"/>
    <conn name="STUD_F" type="V" descr="Anti-stud"/>
  </conndef>
  <conndef>
    <conn name="AXLE" type="R" descr="Axle"/>
    <conn name="AXLEHOLE" type="V" descr="Axle hole"/>
  </conndef>
  <conndef>
    <conn name="R_STUD" type="R" descr="Tube stud"/>
    <conn name="R_STUD_F" type="R" descr="Tube anti-stud"/>
  </conndef>
  <conndef>
    <conn name="BALL" type="P" descr="Ball"/>
    <conn name="SOCKET" type="p" descr="Ball socket"/>
  </conndef>
</connectiondefs>
"#;

    pub(crate) const AUTODETECT: &str = r#"<autodetect>
  <primitive checkdup="1">
    <name p="stud.dat"/>
    <name p="STUD2.dat"/>
    <cp type="STUD" bx="0" by="0" bz="0" hx="0" hy="-4" hz="0"/>
  </primitive>
  <primitive>
    <name p="axle.dat"/>
    <cp type="axle" bx="0" by="0" bz="0" hx="0" hy="1" hz="0"/>
  </primitive>
</autodetect>
"#;

    pub(crate) fn catalog() -> ConnectionCatalog {
        let mut c = ConnectionCatalog::default();
        c.load_types(TYPES, "types").unwrap();
        c.load_autodetect(AUTODETECT, "auto").unwrap();
        c
    }

    #[test]
    fn pairs_are_opposites() {
        let c = catalog();
        assert_eq!(c.types().len(), 8);
        for t in c.types() {
            let opp = c.opposite(t.id).unwrap();
            assert_ne!(opp, t.id);
            assert_eq!(c.opposite(opp), Some(t.id));
        }
        let stud = c.by_name("stud").unwrap();
        assert_eq!(stud.name, "STUD");
        assert_eq!(stud.family, ConnectionFamily::Vector);
        assert_eq!(c.get(stud.opposite).unwrap().name, "STUD_F");
        assert_eq!(c.by_name("SOCKET").unwrap().family, ConnectionFamily::Point);
    }

    #[test]
    fn autodetect_shares_points_between_names() {
        let c = catalog();
        let a = c.autodetect("stud.dat").unwrap();
        let b = c.autodetect("stud2.dat").unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert!(a.check_duplicates);
        assert_eq!(a.points[0].p2, DVec3::new(0.0, -4.0, 0.0));
        assert!(!c.autodetect("axle.dat").unwrap().check_duplicates);
        assert!(c.autodetect("3001.dat").is_none());
    }

    fn type_error(xml: &str) -> (u32, String) {
        match ConnectionCatalog::default().load_types(xml, "bad.xml") {
            Err(LDrawError::Configuration { line, message, .. }) => (line, message),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn unpaired_definition_fails_with_line() {
        let (line, message) = type_error(
            "<connectiondefs>\n<conndef>\n<conn name=\"A\" type=\"V\" descr=\"a\"/>\n</conndef>\n</connectiondefs>",
        );
        assert_eq!(line, 2);
        assert!(message.contains("paired"));
    }

    #[test]
    fn bad_family_and_empty_fields_fail() {
        let (line, _) = type_error(
            "<connectiondefs><conndef>\n<conn name=\"A\" type=\"X\" descr=\"a\"/><conn name=\"B\" type=\"V\" descr=\"b\"/></conndef></connectiondefs>",
        );
        assert_eq!(line, 2);
        type_error(
            "<connectiondefs><conndef><conn name=\"\" type=\"V\" descr=\"a\"/><conn name=\"B\" type=\"V\" descr=\"b\"/></conndef></connectiondefs>",
        );
        type_error(
            "<connectiondefs><conndef><conn name=\"A\" type=\"V\" descr=\"a\"/><conn name=\"B\" type=\"V\" descr=\" \"/></conndef></connectiondefs>",
        );
        type_error("<other/>");
    }

    #[test]
    fn failed_load_leaves_catalog_untouched() {
        let mut c = ConnectionCatalog::default();
        let xml = "<connectiondefs><conndef><conn name=\"A\" type=\"V\" descr=\"a\"/><conn name=\"B\" type=\"V\" descr=\"b\"/></conndef><conndef/></connectiondefs>";
        assert!(c.load_types(xml, "x").is_err());
        assert!(c.is_empty());
    }

    #[test]
    fn autodetect_errors() {
        let mut c = ConnectionCatalog::default();
        c.load_types(TYPES, "types").unwrap();
        let unknown = r#"<autodetect><primitive><name p="a.dat"/><cp type="NOPE" bx="0" by="0" bz="0" hx="0" hy="0" hz="0"/></primitive></autodetect>"#;
        assert!(c.load_autodetect(unknown, "auto").is_err());
        let bad = r#"<autodetect><primitive><name p="a.dat"/><cp type="STUD" bx="zero" by="0" bz="0" hx="0" hy="0" hz="0"/></primitive></autodetect>"#;
        assert!(c.load_autodetect(bad, "auto").is_err());
        assert!(!c.is_autodetect("a.dat"));
    }
}

//! Flexible parts (hoses, cables, chains) and the helper segments they are
//! built from.

use std::collections::HashMap;
use std::fmt;

use glam::DVec3;
use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::catalog::XmlReader;
use crate::part::{PartDefinition, part_key};
use crate::source::{ConnectionSource, FLEX_FILE};
use crate::store::PartStore;
use crate::Result;

const DEFAULT_RIGIDITY: f64 = 10.0;
const DEFAULT_MAX_LENGTH: f64 = 10000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexKind {
    /// One continuous bendable body, e.g. a rubber hose.
    Continuous,
    /// A chain of identical rigid segments.
    Segmented,
}

impl FlexKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cont" => Some(FlexKind::Continuous),
            "segm" => Some(FlexKind::Segmented),
            _ => None,
        }
    }
}

impl fmt::Display for FlexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlexKind::Continuous => "cont",
            FlexKind::Segmented => "segm",
        })
    }
}

/// One end or the repeated middle piece of a flexible part.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexSection {
    pub part_id: String,
    pub base: DVec3,
    pub head: DVec3,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlexPart {
    pub name: String,
    pub kind: FlexKind,
    pub rigidity: f64,
    pub max_length: f64,
    pub start: FlexSection,
    pub mid: FlexSection,
    /// How much consecutive mid sections overlap.
    pub overlap: f64,
    pub end: FlexSection,
}

#[derive(Debug, Clone, Default)]
pub struct FlexCatalog {
    parts: HashMap<String, FlexPart>,
}

impl FlexCatalog {
    /// Loads `flexpartsDefs.xml` from a bundle; a bundle without one gives
    /// an empty catalog.
    pub fn from_source(source: &dyn ConnectionSource, store: &mut PartStore) -> Result<Self> {
        let mut catalog = Self::default();
        match source.read(FLEX_FILE)? {
            Some(xml) => {
                catalog.load(&xml, FLEX_FILE, store)?;
            }
            None => debug!("{} has no {FLEX_FILE}", source.name()),
        }
        Ok(catalog)
    }

    /// Reads `<flexparts>`. Auxiliary LDraw parts under `<auxparts>` are
    /// registered in `store` as internal-use parts. Returns the number of
    /// flexible parts added.
    pub fn load(&mut self, xml: &str, source_name: &str, store: &mut PartStore) -> Result<usize> {
        let doc = Document::parse(xml)?;
        let reader = XmlReader::new(&doc, source_name);
        let root = reader.root("flexparts")?;

        for aux in root
            .children()
            .filter(|n| n.has_tag_name("auxparts"))
            .flat_map(|n| n.children().filter(|c| c.has_tag_name("auxp")))
        {
            let name = part_key(reader.required(&aux, "name")?);
            if !name.starts_with("__") {
                warn!("{source_name}: auxiliary part name {name} does not start with '__'");
            }
            let text = aux.text().unwrap_or_default();
            let (part, _diags) = PartDefinition::parse(&name, text, store.ids());
            store.register_internal(part)?;
        }

        let mut added = 0;
        for node in root
            .children()
            .filter(|n| n.has_tag_name("partlist"))
            .flat_map(|n| n.children().filter(|c| c.has_tag_name("part")))
        {
            if let Some(part) = read_part(&reader, &node, source_name)? {
                self.parts.insert(part.name.clone(), part);
                added += 1;
            }
        }
        debug!("Loaded {added} flexible parts from {source_name}");
        Ok(added)
    }

    pub fn get(&self, part_id: &str) -> Option<&FlexPart> {
        self.parts.get(&part_key(part_id))
    }

    pub fn is_flex(&self, part_id: &str) -> bool {
        self.get(part_id).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FlexPart> {
        self.parts.values()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

fn read_part(reader: &XmlReader, node: &Node, source_name: &str) -> Result<Option<FlexPart>> {
    let name = part_key(reader.required(node, "name")?);
    let type_code = reader.required(node, "type")?;
    let Some(kind) = FlexKind::parse(type_code) else {
        warn!("{source_name}: flexible part {name} has unknown type '{type_code}', skipped");
        return Ok(None);
    };
    let rigidity = number_or(node, "rigid", DEFAULT_RIGIDITY, &name);
    let max_length = number_or(node, "len", DEFAULT_MAX_LENGTH, &name);

    let sections = ["start", "mid", "end"]
        .map(|tag| node.children().find(|c| c.has_tag_name(tag)));
    let [Some(start), Some(mid), Some(end)] = sections else {
        warn!("{source_name}: flexible part {name} is missing its start, mid or end section");
        return Ok(None);
    };
    let overlap = number_or(&mid, "overlap", 0.0, &name);
    let start = read_section(reader, &start, &name)?;
    let mid = read_section(reader, &mid, &name)?;
    let end = read_section(reader, &end, &name)?;

    Ok(Some(FlexPart {
        name,
        kind,
        rigidity,
        max_length,
        start,
        mid,
        overlap,
        end,
    }))
}

fn read_section(reader: &XmlReader, node: &Node, part: &str) -> Result<FlexSection> {
    Ok(FlexSection {
        part_id: part_key(reader.required(node, "name")?),
        base: coords(reader.required(node, "b")?, part),
        head: coords(reader.required(node, "h")?, part),
    })
}

fn number_or(node: &Node, attr: &str, default: f64, part: &str) -> f64 {
    match node.attribute(attr) {
        None => default,
        Some(v) => match v.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => n,
            _ => {
                warn!("Flexible part {part}: bad {attr}=\"{v}\", using {default}");
                default
            }
        },
    }
}

/// `"x,y,z"`; anything unreadable becomes the origin.
fn coords(value: &str, part: &str) -> DVec3 {
    let parsed: Vec<f64> = value
        .split(',')
        .filter_map(|c| c.trim().parse::<f64>().ok())
        .filter(|c| c.is_finite())
        .collect();
    match parsed[..] {
        [x, y, z] => DVec3::new(x, y, z),
        _ => {
            warn!("Flexible part {part}: bad coordinates \"{value}\"");
            DVec3::ZERO
        }
    }
}

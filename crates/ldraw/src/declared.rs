//! Hand-authored connection files (`<main>.cxml`).

use log::warn;
use roxmltree::Document;

use crate::Result;
use crate::catalog::{ConnectionCatalog, XmlReader};
use crate::connection::LocalConnection;

/// Reads `<connections><cpoint type><base x y z/><dir x y z/></cpoint>...`.
///
/// Points naming an unknown type are logged and skipped; any other malformed
/// record fails the whole file.
pub(crate) fn parse_declared(
    xml: &str,
    source_name: &str,
    catalog: &ConnectionCatalog,
) -> Result<Vec<LocalConnection>> {
    let doc = Document::parse(xml)?;
    let reader = XmlReader::new(&doc, source_name);
    let root = reader.root("connections")?;

    let mut points = Vec::new();
    for cpoint in root.children().filter(|n| n.has_tag_name("cpoint")) {
        let type_name = reader.required(&cpoint, "type")?;
        let Some(kind) = catalog.by_name(type_name) else {
            let line = doc.text_pos_at(cpoint.range().start).row;
            warn!("{source_name} (line {line}): unknown connection type {type_name}, point dropped");
            continue;
        };
        let child = |tag: &str| {
            cpoint
                .children()
                .find(|n| n.has_tag_name(tag))
                .ok_or_else(|| reader.error(&cpoint, format!("<cpoint> without <{tag}>")))
        };
        let base = child("base")?;
        let dir = child("dir")?;
        points.push(LocalConnection {
            kind: kind.id,
            p1: reader.vec3(&base, ["x", "y", "z"])?,
            p2: reader.vec3(&dir, ["x", "y", "z"])?,
        });
    }
    Ok(points)
}

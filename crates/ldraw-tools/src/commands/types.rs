use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::json;

use ldraw::ConnectionCatalog;

use crate::OutputFormat;
use crate::utils::format;
use crate::utils::session::Locations;

pub fn execute(locations: &Locations, format: OutputFormat) -> Result<()> {
    let session = locations.open_with_connections()?;
    let catalog = session.catalog();

    match format {
        OutputFormat::Text => output_text(catalog),
        OutputFormat::Json => output_json(catalog),
    }
}

fn opposite_name(catalog: &ConnectionCatalog, id: ldraw::ConnectionTypeId) -> &str {
    catalog
        .opposite(id)
        .and_then(|o| catalog.get(o))
        .map(|t| t.name.as_str())
        .unwrap_or("")
}

fn output_text(catalog: &ConnectionCatalog) -> Result<()> {
    println!(
        "{} ({} types, {} autodetected primitives)",
        "Connection Types".bold(),
        catalog.types().len(),
        catalog.autodetect_names().count()
    );

    let mut table = format::table();
    table.set_header(vec!["Name", "Mates With", "Family", "Description"]);
    for t in catalog.types() {
        table.add_row(vec![
            Cell::new(&t.name).fg(Color::Cyan),
            Cell::new(opposite_name(catalog, t.id)),
            Cell::new(t.family.to_string()),
            Cell::new(&t.description),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn output_json(catalog: &ConnectionCatalog) -> Result<()> {
    let mut primitives: Vec<&str> = catalog.autodetect_names().collect();
    primitives.sort_unstable();

    let types: Vec<_> = catalog
        .types()
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "opposite": opposite_name(catalog, t.id),
                "family": t.family.to_string(),
                "description": t.description,
            })
        })
        .collect();

    let info = json!({
        "types": types,
        "autodetect": primitives,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

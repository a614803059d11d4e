use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::json;

use ldraw::{FlexPart, FlexSection};

use crate::OutputFormat;
use crate::utils::format;
use crate::utils::session::Locations;

pub fn execute(locations: &Locations, format: OutputFormat) -> Result<()> {
    let session = locations.open_with_connections()?;
    let mut parts: Vec<&FlexPart> = session.flex().iter().collect();
    parts.sort_by(|a, b| a.name.cmp(&b.name));

    match format {
        OutputFormat::Text => output_text(&parts),
        OutputFormat::Json => output_json(&parts),
    }
}

fn output_text(parts: &[&FlexPart]) -> Result<()> {
    println!("{} ({})", "Flexible Parts".bold(), parts.len());
    if parts.is_empty() {
        return Ok(());
    }

    let mut table = format::table();
    table.set_header(vec![
        "Part", "Kind", "Rigidity", "Max Length", "Start", "Mid", "End",
    ]);
    for part in parts {
        table.add_row(vec![
            Cell::new(&part.name).fg(Color::Cyan),
            Cell::new(part.kind.to_string()),
            Cell::new(format::number(part.rigidity)),
            Cell::new(format::number(part.max_length)),
            Cell::new(&part.start.part_id),
            Cell::new(&part.mid.part_id),
            Cell::new(&part.end.part_id),
        ]);
    }
    println!("{table}");
    Ok(())
}

fn section(s: &FlexSection) -> serde_json::Value {
    json!({
        "part": s.part_id,
        "base": s.base.to_array(),
        "head": s.head.to_array(),
    })
}

fn output_json(parts: &[&FlexPart]) -> Result<()> {
    let parts: Vec<_> = parts
        .iter()
        .map(|p| {
            json!({
                "name": p.name,
                "kind": p.kind.to_string(),
                "rigidity": p.rigidity,
                "max_length": p.max_length,
                "overlap": p.overlap,
                "start": section(&p.start),
                "mid": section(&p.mid),
                "end": section(&p.end),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&json!({ "parts": parts }))?);
    Ok(())
}

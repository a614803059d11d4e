use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::json;

use ldraw::{CommandId, ConnectionCatalog, ConnectionPoint, Session};

use crate::OutputFormat;
use crate::utils::format;
use crate::utils::session::{Locations, import_model};

/// Connection points of one placed part.
struct Placement {
    command: CommandId,
    part_id: String,
    points: Vec<ConnectionPoint>,
}

pub fn execute(locations: &Locations, file: &Path, format: OutputFormat) -> Result<()> {
    let mut session = locations.open_with_connections()?;
    let model = import_model(&mut session, file)?;
    let placements = collect(&mut session, &model.main)?;

    match format {
        OutputFormat::Text => output_text(session.catalog(), model.main.id(), &placements),
        OutputFormat::Json => output_json(session.catalog(), model.main.id(), &placements),
    }
}

fn collect(session: &mut Session, part: &ldraw::PartDefinition) -> Result<Vec<Placement>> {
    let mut placements = Vec::new();
    for (command, reference) in part.references() {
        let points = session
            .connections_of(command)
            .with_context(|| format!("Failed to resolve connections of {}", reference.part_id))?;
        placements.push(Placement {
            command: command.id(),
            part_id: reference.part_id.clone(),
            points,
        });
    }
    Ok(placements)
}

fn type_name(catalog: &ConnectionCatalog, point: &ConnectionPoint) -> String {
    catalog
        .get(point.kind)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| format!("#{}", point.kind.index()))
}

fn output_text(catalog: &ConnectionCatalog, model: &str, placements: &[Placement]) -> Result<()> {
    let total: usize = placements.iter().map(|p| p.points.len()).sum();
    println!(
        "{} {} ({} points on {} parts)",
        "Connections of".bold(),
        model.bold(),
        total,
        placements.len()
    );

    let mut table = format::table();
    table.set_header(vec!["Command", "Part", "Type", "Position", "Direction"]);
    for placement in placements {
        if placement.points.is_empty() {
            table.add_row(vec![
                Cell::new(placement.command.to_string()),
                Cell::new(&placement.part_id).fg(Color::Cyan),
                Cell::new("-").fg(Color::DarkGrey),
                Cell::new(""),
                Cell::new(""),
            ]);
            continue;
        }
        for point in &placement.points {
            table.add_row(vec![
                Cell::new(placement.command.to_string()),
                Cell::new(&placement.part_id).fg(Color::Cyan),
                Cell::new(type_name(catalog, point)),
                Cell::new(format::vec3(point.p1)),
                Cell::new(format::vec3(point.direction())),
            ]);
        }
    }
    println!("{table}");
    Ok(())
}

fn output_json(catalog: &ConnectionCatalog, model: &str, placements: &[Placement]) -> Result<()> {
    let parts: Vec<_> = placements
        .iter()
        .map(|placement| {
            let points: Vec<_> = placement
                .points
                .iter()
                .map(|point| {
                    json!({
                        "id": point.id.to_string(),
                        "type": type_name(catalog, point),
                        "p1": point.p1.to_array(),
                        "p2": point.p2.to_array(),
                        "delta": point.delta.to_array(),
                    })
                })
                .collect();
            json!({
                "command": placement.command.to_string(),
                "part": placement.part_id,
                "connections": points,
            })
        })
        .collect();

    let info = json!({
        "model": model,
        "total": placements.iter().map(|p| p.points.len()).sum::<usize>(),
        "parts": parts,
    });
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

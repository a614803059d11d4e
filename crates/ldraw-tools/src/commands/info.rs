use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Color};
use serde_json::json;

use ldraw::{ImportedModel, PartDefinition, Severity};

use crate::OutputFormat;
use crate::utils::format;
use crate::utils::session::{Locations, import_model};

pub fn execute(locations: &Locations, file: &Path, format: OutputFormat) -> Result<()> {
    let mut session = locations.open()?;
    let model = import_model(&mut session, file)?;

    match format {
        OutputFormat::Text => output_text(&model),
        OutputFormat::Json => output_json(&model),
    }
}

/// Placement count per referenced part, by part id.
fn part_usage(part: &PartDefinition) -> BTreeMap<String, usize> {
    let mut usage = BTreeMap::new();
    for (_, reference) in part.references() {
        *usage.entry(reference.part_id.to_lowercase()).or_insert(0) += 1;
    }
    usage
}

fn output_text(model: &ImportedModel) -> Result<()> {
    let main = &model.main;
    println!("{}", "Model Summary".bold());

    let mut table = format::table();
    table.add_row(vec![Cell::new("Name").fg(Color::Cyan), Cell::new(main.id())]);
    table.add_row(vec![
        Cell::new("Type").fg(Color::Cyan),
        Cell::new(main.kind.to_string()),
    ]);
    for (label, value) in [
        ("Description", &main.description),
        ("Author", &main.author),
        ("License", &main.license),
    ] {
        if !value.is_empty() {
            table.add_row(vec![Cell::new(label).fg(Color::Cyan), Cell::new(value)]);
        }
    }
    table.add_row(vec![
        Cell::new("Steps").fg(Color::Cyan),
        Cell::new(main.step_count().to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Commands").fg(Color::Cyan),
        Cell::new(main.len().to_string()),
    ]);
    table.add_row(vec![
        Cell::new("Placed Parts").fg(Color::Cyan),
        Cell::new(main.references().count().to_string()),
    ]);
    println!("{table}");

    if !model.submodels.is_empty() {
        println!();
        println!("{}", "Submodels".bold());
        let mut table = format::table();
        table.set_header(vec!["Name", "Description", "Placed Parts"]);
        for sub in &model.submodels {
            table.add_row(vec![
                Cell::new(sub.id()).fg(Color::Cyan),
                Cell::new(&sub.description),
                Cell::new(sub.references().count().to_string()),
            ]);
        }
        println!("{table}");
    }

    let usage = part_usage(main);
    if !usage.is_empty() {
        println!();
        println!("{}", "Parts".bold());
        let mut table = format::table();
        table.set_header(vec!["Part", "Count"]);
        for (part, count) in &usage {
            table.add_row(vec![
                Cell::new(part).fg(Color::Cyan),
                Cell::new(count.to_string()),
            ]);
        }
        println!("{table}");
    }

    if !model.diagnostics.is_empty() {
        println!();
        println!("{}", "Diagnostics".bold());
        for d in model.diagnostics.iter() {
            let line = d.to_string();
            match d.severity {
                Severity::Error => println!("  {}", line.red()),
                Severity::Warning => println!("  {}", line.yellow()),
            }
        }
    }
    Ok(())
}

fn output_json(model: &ImportedModel) -> Result<()> {
    let main = &model.main;
    let mut info = json!({
        "name": main.id(),
        "type": main.kind.to_string(),
        "description": main.description,
        "steps": main.step_count(),
        "commands": main.len(),
        "placed_parts": main.references().count(),
        "parts": part_usage(main),
    });
    if !main.author.is_empty() {
        info["author"] = json!(main.author);
    }
    if let Some(date) = main.last_update {
        info["last_update"] = json!(date.to_string());
    }

    info["submodels"] = model
        .submodels
        .iter()
        .map(|sub| {
            json!({
                "name": sub.id(),
                "description": sub.description,
                "placed_parts": sub.references().count(),
            })
        })
        .collect();

    info["diagnostics"] = model
        .diagnostics
        .iter()
        .map(|d| {
            json!({
                "file": d.file,
                "line": d.line,
                "severity": match d.severity {
                    Severity::Warning => "warning",
                    Severity::Error => "error",
                },
                "message": d.message,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

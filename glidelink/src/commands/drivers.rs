use anyhow::Result;
use colored::Colorize;
use comfy_table::Cell;
use glidelink_core::DriverRegistry;
use serde::Serialize;

use crate::output::{OutputFormat, create_table, print_output};

#[derive(Debug, Serialize)]
struct DriverEntry {
    name: String,
    kind: String,
    capabilities: Vec<&'static str>,
}

pub fn handle_drivers(registry: &DriverRegistry, format: OutputFormat) -> Result<()> {
    let entries: Vec<DriverEntry> = registry
        .iter()
        .map(|d| DriverEntry {
            name: d.name().to_string(),
            kind: d.kind().to_string(),
            capabilities: d.capabilities().names(),
        })
        .collect();

    match format {
        OutputFormat::Json => print_output(&entries)?,
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec!["Name", "Protocol", "Capabilities"]);
            for entry in &entries {
                table.add_row(vec![
                    Cell::new(&entry.name),
                    Cell::new(&entry.kind),
                    Cell::new(entry.capabilities.join(", ")),
                ]);
            }

            println!(
                "{title} ({count}/{max})",
                title = "Registered Drivers".bold(),
                count = registry.len(),
                max = glidelink_core::NUMREGDEV
            );
            println!("{table}");
        }
    }

    Ok(())
}

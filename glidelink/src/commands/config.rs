use std::path::Path;

use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Table};
use glidelink_core::{GlideConfig, NUMDEV};
use serde_json::Value;

use crate::cli::ConfigCommands;
use crate::output::{OutputFormat, create_table, print_output};
use crate::utils::{print_info, print_success};

const SLOT_FIELDS: [&str; 3] = ["port", "driver", "baud_rate"];
const LINK_FIELDS: [&str; 2] = ["timeout", "io_timeout"];

pub fn handle_config(path: &Path, subcommand: ConfigCommands, format: OutputFormat) -> Result<()> {
    match subcommand {
        ConfigCommands::Get { key } => {
            let config = GlideConfig::load_or_default(path)?;
            let entry = config.get_value(&key)?;

            match format {
                OutputFormat::Json => print_output(&entry)?,
                OutputFormat::Table => {
                    println!("{key}: {value}", key = key.cyan(), value = display(&entry["value"]));
                }
            }
        }

        ConfigCommands::Set { key, value } => {
            let mut config = GlideConfig::load_or_default(path)?;
            print_info(&format!("Setting {key} = {value}"));

            config.set_value(&key, &value)?;
            config.save(path)?;

            print_success(&format!(
                "Configuration updated: {key} = {value} ({file})",
                file = path.display()
            ));
        }

        ConfigCommands::Show => {
            let config = GlideConfig::load_or_default(path)?;

            match format {
                OutputFormat::Json => print_output(&config)?,
                OutputFormat::Table => {
                    let mut table = create_table();
                    table.set_header(vec!["Category", "Field", "Value"]);

                    for slot in 0..NUMDEV {
                        add_config_rows(&mut table, &config, &format!("slot{slot}"), &SLOT_FIELDS)?;
                    }
                    add_config_rows(&mut table, &config, "link", &LINK_FIELDS)?;

                    println!(
                        "{title} ({file})",
                        title = "Device Configuration".bold(),
                        file = path.display()
                    );
                    println!("{table}");
                }
            }
        }
    }

    Ok(())
}

fn add_config_rows(
    table: &mut Table,
    config: &GlideConfig,
    category: &str,
    fields: &[&str],
) -> Result<()> {
    for field in fields {
        let entry = config.get_value(&format!("{category}.{field}"))?;
        table.add_row(vec![
            Cell::new(category),
            Cell::new(field),
            Cell::new(display(&entry["value"])),
        ]);
    }
    Ok(())
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, ensure};
use colored::Colorize;
use glidelink_core::{DeviceManager, DriverRegistry, GlideConfig, MemoryTransport, NavFix};
use indicatif::{ProgressBar, ProgressStyle};

use crate::output::{FIX_HEADER, OutputFormat, create_table, fix_cells, print_output};
use crate::utils::print_info;

/// Port name the log is fed through.
const REPLAY_PORT: &str = "replay";

pub async fn handle_replay(
    registry: DriverRegistry,
    file: &Path,
    driver: &str,
    limit: Option<usize>,
    format: OutputFormat,
) -> Result<()> {
    let log = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read log file {}", file.display()))?;

    let defaults = GlideConfig::default();
    let manager = DeviceManager::new(
        registry,
        Arc::new(MemoryTransport::new()),
        defaults.link.timeout,
        defaults.link.io_timeout,
    );
    ensure!(
        manager.bind(0, REPLAY_PORT, driver).await,
        "Unknown driver {driver}. Run `glidelink drivers` for the list"
    );

    let lines: Vec<&str> = log.lines().collect();
    let progress = (format == OutputFormat::Table).then(|| {
        let pb = ProgressBar::new(lines.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb
    });

    let mut fixes: Vec<NavFix> = Vec::new();
    for line in &lines {
        if let Some(pb) = &progress {
            pb.inc(1);
        }
        if let Some(slot_fix) = manager.handle_line(REPLAY_PORT, line).await {
            fixes.push(slot_fix.fix);
            if limit.is_some_and(|limit| fixes.len() >= limit) {
                break;
            }
        }
    }
    if let Some(pb) = progress {
        pb.finish_and_clear();
    }

    match format {
        OutputFormat::Json => print_output(&fixes)?,
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(FIX_HEADER.to_vec());
            for fix in &fixes {
                table.add_row(fix_cells(fix));
            }

            println!("{title}", title = format!("Replay through {driver}").bold());
            println!("{table}");
            print_info(&format!(
                "{valid} valid fix(es) from {total} line(s)",
                valid = fixes.len(),
                total = lines.len()
            ));
        }
    }

    Ok(())
}

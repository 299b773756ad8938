use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use glidelink_core::{Declaration, DeclarationPhase, DeviceManager, DriverRegistry, GlideConfig, NUMDEV};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::output::{OutputFormat, print_output};
use crate::serial::SerialTransport;
use crate::utils::{phase_label, print_info, print_success};

#[derive(Debug, Serialize)]
struct DeclareResult {
    slot: usize,
    driver: String,
    pilot: String,
    waypoints: usize,
    accepted: bool,
    phase: DeclarationPhase,
}

pub async fn handle_declare(
    config: GlideConfig,
    registry: DriverRegistry,
    task_file: &Path,
    slot: usize,
    format: OutputFormat,
) -> Result<()> {
    ensure!(slot < NUMDEV, "Slot {slot} out of range (0..{max})", max = NUMDEV - 1);

    let text = std::fs::read_to_string(task_file)
        .with_context(|| format!("Failed to read task file {}", task_file.display()))?;
    let task: Declaration = serde_json::from_str(&text)
        .with_context(|| format!("Invalid task file {}", task_file.display()))?;

    let transport = Arc::new(SerialTransport::from_config(&config));
    let manager = DeviceManager::from_config(&config, registry, transport).await?;

    let info = manager.slot_info(slot).await.context("Slot not available")?;
    let Some(driver) = info.driver else {
        bail!("Slot {slot} is not configured. Set slot{slot}.port and slot{slot}.driver first");
    };
    ensure!(
        manager.is_logger(slot).await,
        "{driver} on slot {slot} does not accept declarations"
    );
    ensure!(
        manager.connect(slot).await,
        "Could not open {port} for slot {slot}",
        port = info.port.as_deref().unwrap_or("-")
    );

    if format == OutputFormat::Table {
        print_info(&format!(
            "Declaring {count} waypoint(s) for {pilot} to {driver}",
            count = task.waypoints.len(),
            pilot = task.pilot
        ));
    }
    let spinner = (format == OutputFormat::Table).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Waiting for the logger...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let accepted = manager.declare(slot, &task).await;
    let phase = manager
        .declaration_phase(slot)
        .await
        .unwrap_or(DeclarationPhase::Idle);
    manager.close(slot).await;

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    let result = DeclareResult {
        slot,
        driver: driver.clone(),
        pilot: task.pilot.clone(),
        waypoints: task.waypoints.len(),
        accepted,
        phase,
    };

    match format {
        OutputFormat::Json => print_output(&result)?,
        OutputFormat::Table if accepted => {
            print_success(&format!("Task declared to {driver} ({phase})", phase = phase_label(phase)));
        }
        OutputFormat::Table => {}
    }

    if !accepted {
        bail!("{driver} refused the declaration ({phase})");
    }
    Ok(())
}

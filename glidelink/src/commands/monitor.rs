use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, ensure};
use colored::Colorize;
use comfy_table::{Cell, Color};
use glidelink_core::{DeviceManager, DriverRegistry, GlideConfig, LinkStatus, SlotFix};
use tokio::sync::mpsc;
use tracing::debug;

use crate::output::{OutputFormat, create_table, fix_cells, print_record};
use crate::serial::{SerialTransport, spawn_line_reader};
use crate::utils::{print_info, print_success, print_warning};

/// Interval at which newly (re)opened ports get a stream reader.
const READER_CHECK: Duration = Duration::from_millis(500);

/// Values pushed to every bound slot once connected.
#[derive(Debug, Default, Clone, Copy)]
pub struct Settings {
    pub mac_cready: Option<f64>,
    pub bugs: Option<f64>,
    pub ballast: Option<f64>,
}

pub async fn handle_monitor(
    config: GlideConfig,
    registry: DriverRegistry,
    count: usize,
    period: u64,
    settings: Settings,
    format: OutputFormat,
) -> Result<()> {
    let transport = Arc::new(SerialTransport::from_config(&config));
    let manager = Arc::new(DeviceManager::from_config(&config, registry, transport.clone()).await?);

    let bound: Vec<usize> = manager
        .slot_infos()
        .await
        .into_iter()
        .filter(|info| info.port.is_some())
        .map(|info| info.index)
        .collect();
    ensure!(
        !bound.is_empty(),
        "No slot configured. Use: glidelink config set -k slot0.port --value /dev/ttyUSB0"
    );

    for &slot in &bound {
        if manager.connect(slot).await {
            print_success(&format!("Slot {slot} connected"));
        } else {
            print_warning(&format!("Slot {slot}: device did not open, will retry on link timeout"));
        }
        apply_settings(&manager, slot, settings).await;
    }

    let (line_tx, line_rx) = mpsc::channel(256);
    let (fix_tx, mut fix_rx) = mpsc::channel::<SlotFix>(256);
    let ingest = manager.spawn_ingest(line_rx, fix_tx);
    let link_monitor = manager.spawn_link_monitor(Duration::from_secs(period.max(1)));

    print_info("Monitoring devices... (Press Ctrl+C to stop)");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut reader_check = tokio::time::interval(READER_CHECK);
    let mut received = 0usize;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("Interrupted");
                break;
            }
            _ = reader_check.tick() => {
                for (port, reader) in transport.take_readers() {
                    debug!("Starting stream reader for {port}");
                    spawn_line_reader(port, reader, line_tx.clone());
                }
            }
            fix = fix_rx.recv() => {
                let Some(fix) = fix else {
                    break;
                };
                print_fix(&fix, format)?;
                received += 1;
                if count > 0 && received >= count {
                    break;
                }
            }
        }
    }

    // Dropping the receiver makes the blocking readers exit.
    link_monitor.abort();
    ingest.abort();
    drop(line_tx);

    if format == OutputFormat::Table {
        print_slot_summary(&manager).await;
    }
    for slot in bound {
        manager.close(slot).await;
    }

    Ok(())
}

async fn apply_settings(manager: &DeviceManager, slot: usize, settings: Settings) {
    if let Some(value) = settings.mac_cready {
        let accepted = manager.put_mac_cready(slot, value).await;
        report_setting(slot, "MacCready", value, accepted);
    }
    if let Some(value) = settings.bugs {
        let accepted = manager.put_bugs(slot, value).await;
        report_setting(slot, "bugs", value, accepted);
    }
    if let Some(value) = settings.ballast {
        let accepted = manager.put_ballast(slot, value).await;
        report_setting(slot, "ballast", value, accepted);
    }
}

fn report_setting(slot: usize, name: &str, value: f64, accepted: bool) {
    if accepted {
        print_success(&format!("Slot {slot}: {name} set to {value}"));
    } else {
        print_warning(&format!("Slot {slot}: {name} not accepted by the device"));
    }
}

fn print_fix(fix: &SlotFix, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_record(fix)?,
        OutputFormat::Table => {
            println!(
                "{slot} {cells}",
                slot = format!("[{}]", fix.slot).cyan(),
                cells = fix_cells(&fix.fix).join("  ")
            );
        }
    }
    Ok(())
}

async fn print_slot_summary(manager: &DeviceManager) {
    let mut table = create_table();
    table.set_header(vec![
        "Slot", "Port", "Driver", "Open", "Link", "Timeouts", "Declaration",
    ]);

    for info in manager.slot_infos().await {
        table.add_row(vec![
            Cell::new(info.index),
            Cell::new(info.port.as_deref().unwrap_or("-")),
            Cell::new(info.driver.as_deref().unwrap_or("-")),
            Cell::new(if info.open { "yes" } else { "no" }),
            Cell::new(info.link).fg(match info.link {
                LinkStatus::Live => Color::Green,
                LinkStatus::TimedOut => Color::Red,
            }),
            Cell::new(info.timeouts),
            Cell::new(info.declaration),
        ]);
    }

    println!("{title}", title = "Device Slots".bold());
    println!("{table}");
}

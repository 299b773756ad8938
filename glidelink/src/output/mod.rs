use anyhow::Result;
use comfy_table::{Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use glidelink_core::NavFix;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl OutputFormat {
    pub fn from_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Table }
    }
}

pub fn print_output<T: Serialize>(data: &T) -> Result<()> {
    println!("{json}", json = serde_json::to_string_pretty(data)?);
    Ok(())
}

/// One compact JSON document per line, for streamed records.
pub fn print_record<T: Serialize>(data: &T) -> Result<()> {
    println!("{json}", json = serde_json::to_string(data)?);
    Ok(())
}

pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).apply_modifier(UTF8_ROUND_CORNERS);
    table
}

pub const FIX_HEADER: [&str; 8] = [
    "Time", "Latitude", "Longitude", "Alt (m)", "Speed (m/s)", "Track", "Vario (m/s)", "Wind",
];

/// Display cells for a fix, `-` for anything the sentence did not carry.
pub fn fix_cells(fix: &NavFix) -> Vec<String> {
    vec![
        fix.time.map_or_else(dash, |t| t.format("%H:%M:%S").to_string()),
        fix.latitude.map_or_else(dash, |v| format!("{v:.5}")),
        fix.longitude.map_or_else(dash, |v| format!("{v:.5}")),
        fix.baro_altitude
            .or(fix.gps_altitude)
            .map_or_else(dash, |v| format!("{v:.0}")),
        fix.ground_speed
            .or(fix.true_airspeed)
            .map_or_else(dash, |v| format!("{v:.1}")),
        fix.track.map_or_else(dash, |v| format!("{v:.0}°")),
        fix.vario.map_or_else(dash, |v| format!("{v:+.1}")),
        fix.wind.map_or_else(dash, |w| {
            format!("{bearing:.0}°/{speed:.1}", bearing = w.bearing, speed = w.speed)
        }),
    ]
}

fn dash() -> String {
    "-".to_string()
}

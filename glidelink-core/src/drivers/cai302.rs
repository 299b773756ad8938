use tracing::debug;

use crate::declaration::Waypoint;
use crate::error::DeviceError;
use crate::fix::{NavFix, Wind};
use crate::nmea::{self, KNOTS_TO_MS, Sentence};
use crate::port::DeviceIo;

use super::generic::parse_gps;
use super::{DeviceDriver, Operation};

const PROMPT: &str = "cmd>";
const ERROR: &str = "Error";
/// Waypoint number that closes an upload.
const END_OF_TASK: u32 = 255;

/// Cambridge Aero Instruments CAI 302 vario and flight recorder.
///
/// Streams GPS sentences plus `!w` instrument data. Settings are written as
/// `!g` commands; declarations are uploaded in command mode, one
/// acknowledged line per record.
#[derive(Debug, Default)]
pub struct Cai302 {
    uploading: bool,
}

impl DeviceDriver for Cai302 {
    fn supports(&self, _op: Operation) -> bool {
        true
    }

    fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool {
        let Some(sentence) = Sentence::parse(line) else {
            return false;
        };
        match sentence.address() {
            "w" => parse_w(&sentence, fix),
            _ => parse_gps(&sentence, fix),
        }
    }

    fn init(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        // Leave any half finished command session and resume NMEA output.
        io.write_str("\x03LOG 0\r")
    }

    fn put_mac_cready(&mut self, io: &mut DeviceIo, mac_cready: f64) -> Result<(), DeviceError> {
        let tenths_of_knots = (mac_cready / KNOTS_TO_MS * 10.0).round() as i32;
        io.write_str(&format!("!g,m{tenths_of_knots}\r"))
    }

    fn put_bugs(&mut self, io: &mut DeviceIo, bugs: f64) -> Result<(), DeviceError> {
        let percent = ((1.0 - bugs.clamp(0.0, 1.0)) * 100.0).round() as i32;
        io.write_str(&format!("!g,u{percent}\r"))
    }

    fn put_ballast(&mut self, io: &mut DeviceIo, ballast: f64) -> Result<(), DeviceError> {
        let tenths = (ballast.clamp(0.0, 1.0) * 10.0).round() as i32;
        io.write_str(&format!("!g,b{tenths}\r"))
    }

    fn declare_begin(
        &mut self,
        io: &mut DeviceIo,
        pilot: &str,
        glider_class: &str,
        glider_id: &str,
    ) -> Result<(), DeviceError> {
        io.transact("\x03", PROMPT, ERROR)?;
        self.uploading = true;
        let record = format!(
            "O,{pilot},{class},{id}\r",
            pilot = nmea::clean_field(pilot, 24),
            class = nmea::clean_field(glider_class, 12),
            id = nmea::clean_field(glider_id, 12),
        );
        io.transact(&record, PROMPT, ERROR)?;
        Ok(())
    }

    fn declare_add_waypoint(
        &mut self,
        io: &mut DeviceIo,
        waypoint: &Waypoint,
    ) -> Result<(), DeviceError> {
        let record = format!(
            "D,{number},{lat:.5},{lon:.5},{name},{alt:.0}\r",
            number = waypoint.number,
            lat = waypoint.latitude,
            lon = waypoint.longitude,
            name = nmea::clean_field(&waypoint.name, 12),
            alt = waypoint.altitude,
        );
        io.transact(&record, PROMPT, ERROR)?;
        Ok(())
    }

    fn declare_end(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        io.transact(&format!("D,{END_OF_TASK}\r"), PROMPT, ERROR)?;
        self.uploading = false;
        io.write_str("LOG 0\r")
    }

    fn declare_abort(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        if self.uploading {
            self.uploading = false;
            debug!("Leaving CAI 302 command mode on {port}", port = io.port());
            io.write_str("\x03LOG 0\r")?;
        }
        Ok(())
    }
}

// !w,<wind dir>,<wind speed 0.1m/s>,<wind age>,<component wind>,<true alt +1000>,
//    <qnh>,<tas 0.01m/s>,<vario 0.1kn +200>,<average>,<netto 0.1kn +200>,
//    <mc 0.1kn>,<ballast %>,<bugs %>
fn parse_w(s: &Sentence<'_>, fix: &mut NavFix) -> bool {
    if s.len() < 13 {
        return false;
    }
    let (Some(wind_dir), Some(wind_speed), Some(altitude), Some(tas), Some(vario)) =
        (s.f64(0), s.f64(1), s.f64(4), s.f64(6), s.f64(7))
    else {
        return false;
    };

    fix.wind = Some(Wind {
        speed: wind_speed / 10.0,
        bearing: wind_dir,
    });
    fix.baro_altitude = Some(altitude - 1000.0);
    fix.true_airspeed = Some(tas / 100.0);
    fix.vario = Some((vario - 200.0) / 10.0 * KNOTS_TO_MS);
    fix.netto_vario = s.f64(9).map(|v| (v - 200.0) / 10.0 * KNOTS_TO_MS);
    fix.mac_cready = s.f64(10).map(|v| v / 10.0 * KNOTS_TO_MS);
    fix.ballast = s.f64(11).map(|v| v / 100.0);
    fix.bugs = s.f64(12).map(|v| 1.0 - v / 100.0);
    true
}

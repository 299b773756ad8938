use crate::declaration::Waypoint;
use crate::error::DeviceError;
use crate::fix::NavFix;
use crate::nmea::{self, Sentence};
use crate::port::DeviceIo;

use super::generic::parse_gps;
use super::{DeviceDriver, Operation};

const IO_MODE: &str = "IO Mode.";
const OK: &str = "OK";
const ERROR: &str = "ERR";
/// User waypoint slots available in the recorder.
const MAX_WAYPOINTS: usize = 6;

/// EW flight recorder with a GPS passthrough.
///
/// Declarations switch the recorder into IO mode and send `#` records, each
/// closed by an XOR checksum in hex and acknowledged with `OK`.
#[derive(Debug, Default)]
pub struct EwLogger {
    waypoints: usize,
    in_io_mode: bool,
}

impl EwLogger {
    fn record(io: &mut DeviceIo, payload: &str) -> Result<(), DeviceError> {
        let line = format!("#{payload}{sum:02X}\r\n", sum = nmea::checksum(payload));
        io.transact(&line, OK, ERROR)?;
        Ok(())
    }

    fn leave_io_mode(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        if self.in_io_mode {
            self.in_io_mode = false;
            io.write_str("NoMsg\r\n")?;
        }
        Ok(())
    }
}

impl DeviceDriver for EwLogger {
    fn supports(&self, op: Operation) -> bool {
        op.is_baseline()
            || matches!(
                op,
                Operation::DeclBegin | Operation::DeclAddWaypoint | Operation::DeclEnd
            )
    }

    fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool {
        match Sentence::parse(line) {
            Some(sentence) => parse_gps(&sentence, fix),
            None => false,
        }
    }

    fn declare_begin(
        &mut self,
        io: &mut DeviceIo,
        pilot: &str,
        glider_class: &str,
        glider_id: &str,
    ) -> Result<(), DeviceError> {
        self.waypoints = 0;
        io.transact("##\r\n", IO_MODE, ERROR)?;
        self.in_io_mode = true;

        let payload = format!(
            "SPI{pilot:<15}{class:<8}{id:<8}",
            pilot = nmea::clean_field(pilot, 15),
            class = nmea::clean_field(glider_class, 8),
            id = nmea::clean_field(glider_id, 8),
        );
        Self::record(io, &payload)
    }

    fn declare_add_waypoint(
        &mut self,
        io: &mut DeviceIo,
        waypoint: &Waypoint,
    ) -> Result<(), DeviceError> {
        if self.waypoints >= MAX_WAYPOINTS {
            return Err(DeviceError::Rejected("EW logger holds at most 6 waypoints"));
        }
        let payload = format!(
            "SUI{index:02},{name},{lat:.5},{lon:.5},{alt:.0}",
            index = self.waypoints,
            name = nmea::clean_field(&waypoint.name, 6),
            lat = waypoint.latitude,
            lon = waypoint.longitude,
            alt = waypoint.altitude,
        );
        Self::record(io, &payload)?;
        self.waypoints += 1;
        Ok(())
    }

    fn declare_end(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        if self.waypoints < 2 {
            // Nothing was committed yet; leave IO mode so logging continues.
            self.leave_io_mode(io)?;
            return Err(DeviceError::Rejected("task needs a start and a finish"));
        }
        Self::record(io, &format!("END{count:02}", count = self.waypoints))?;
        self.leave_io_mode(io)
    }

    fn declare_abort(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        self.waypoints = 0;
        self.leave_io_mode(io)
    }
}

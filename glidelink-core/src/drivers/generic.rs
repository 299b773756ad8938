use crate::fix::NavFix;
use crate::nmea::{self, FEET_TO_M, KNOTS_TO_MS, Sentence};

use super::DeviceDriver;

/// Plain NMEA 0183 GPS receiver.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericNmea;

impl DeviceDriver for GenericNmea {
    fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool {
        match Sentence::parse(line) {
            Some(sentence) => parse_gps(&sentence, fix),
            None => false,
        }
    }
}

/// Standard GPS sentences understood by every driver that passes GPS data
/// through.
pub(crate) fn parse_gps(sentence: &Sentence<'_>, fix: &mut NavFix) -> bool {
    match sentence.kind() {
        "RMC" => parse_rmc(sentence, fix),
        "GGA" => parse_gga(sentence, fix),
        "PGRMZ" => parse_pgrmz(sentence, fix),
        _ => false,
    }
}

// $GPRMC,time,status,lat,N,lon,E,speed(kn),track,date,...
fn parse_rmc(s: &Sentence<'_>, fix: &mut NavFix) -> bool {
    if s.len() < 9 || s.field(1) != Some("A") {
        return false;
    }
    let Some((lat, lon)) = position(s, 2) else {
        return false;
    };

    fix.latitude = Some(lat);
    fix.longitude = Some(lon);
    fix.time = s.field(0).and_then(nmea::parse_time);
    fix.date = s.field(8).and_then(nmea::parse_date);
    fix.ground_speed = s.f64(6).map(|kn| kn * KNOTS_TO_MS);
    fix.track = s.f64(7);
    true
}

// $GPGGA,time,lat,N,lon,E,quality,satellites,hdop,altitude,M,...
fn parse_gga(s: &Sentence<'_>, fix: &mut NavFix) -> bool {
    if s.len() < 9 {
        return false;
    }
    match s.u32(5) {
        Some(quality) if quality > 0 => {}
        _ => return false,
    }
    let Some((lat, lon)) = position(s, 1) else {
        return false;
    };

    fix.latitude = Some(lat);
    fix.longitude = Some(lon);
    fix.time = s.field(0).and_then(nmea::parse_time);
    fix.satellites = s.u32(6).and_then(|n| u8::try_from(n).ok());
    fix.gps_altitude = s.f64(8);
    true
}

// $PGRMZ,altitude,f|m,...
fn parse_pgrmz(s: &Sentence<'_>, fix: &mut NavFix) -> bool {
    let Some(altitude) = s.f64(0) else {
        return false;
    };
    fix.baro_altitude = match s.field(1) {
        Some("f") | Some("F") | None => Some(altitude * FEET_TO_M),
        Some("m") | Some("M") => Some(altitude),
        Some(_) => return false,
    };
    true
}

fn position(s: &Sentence<'_>, first: usize) -> Option<(f64, f64)> {
    let lat = nmea::parse_latitude(s.field(first)?, s.field(first + 1)?)?;
    let lon = nmea::parse_longitude(s.field(first + 2)?, s.field(first + 3)?)?;
    Some((lat, lon))
}

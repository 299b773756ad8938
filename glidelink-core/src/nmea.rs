//! NMEA 0183 sentence helpers shared by the drivers.
//!
//! Only framing, checksums and the common coordinate/time encodings live here.
//! Interpreting a sentence is the job of each driver.

use chrono::{NaiveDate, NaiveTime};

pub const KNOTS_TO_MS: f64 = 0.514_444;
pub const FEET_TO_M: f64 = 0.3048;

/// One checksum-verified sentence split into address and fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Sentence<'a> {
    address: &'a str,
    fields: Vec<&'a str>,
}

impl<'a> Sentence<'a> {
    /// Split a line such as `$GPRMC,...*6A`.
    ///
    /// Accepts `$` and `!` start characters. A checksum is verified when the
    /// line carries one; lines without `*hh` are accepted as-is since several
    /// varios never send one.
    pub fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        let body = line.strip_prefix('$').or_else(|| line.strip_prefix('!'))?;

        let body = match body.rsplit_once('*') {
            Some((body, sum)) => {
                let expected = u8::from_str_radix(sum, 16).ok()?;
                if sum.len() != 2 || checksum(body) != expected {
                    return None;
                }
                body
            }
            None => body,
        };

        let mut parts = body.split(',');
        let address = parts.next().filter(|a| !a.is_empty())?;

        Some(Self {
            address,
            fields: parts.collect(),
        })
    }

    /// Full address, e.g. `GPRMC`, `PGRMZ` or `w`.
    pub fn address(&self) -> &'a str {
        self.address
    }

    /// Sentence type without the talker, e.g. `RMC` for `GNRMC`.
    ///
    /// Proprietary (`P...`) and short addresses are returned unchanged.
    pub fn kind(&self) -> &'a str {
        if self.address.len() == 5 && !self.address.starts_with('P') {
            &self.address[2..]
        } else {
            self.address
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Non-empty field at `index`.
    pub fn field(&self, index: usize) -> Option<&'a str> {
        self.fields
            .get(index)
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
    }

    pub fn f64(&self, index: usize) -> Option<f64> {
        self.field(index)?.parse().ok().filter(|v: &f64| v.is_finite())
    }

    pub fn u32(&self, index: usize) -> Option<u32> {
        self.field(index)?.parse().ok()
    }
}

/// XOR of all bytes between the start character and `*`.
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// Frame `body` as a complete sentence: `$body*HH\r\n`.
pub fn sentence(body: &str) -> String {
    format!("${body}*{sum:02X}\r\n", sum = checksum(body))
}

/// Parse `ddmm.mmmm` with an `N`/`S` hemisphere into signed degrees.
pub fn parse_latitude(value: &str, hemisphere: &str) -> Option<f64> {
    let degrees = parse_degrees_minutes(value, 2, 90.0)?;
    match hemisphere {
        "N" => Some(degrees),
        "S" => Some(-degrees),
        _ => None,
    }
}

/// Parse `dddmm.mmmm` with an `E`/`W` hemisphere into signed degrees.
pub fn parse_longitude(value: &str, hemisphere: &str) -> Option<f64> {
    let degrees = parse_degrees_minutes(value, 3, 180.0)?;
    match hemisphere {
        "E" => Some(degrees),
        "W" => Some(-degrees),
        _ => None,
    }
}

fn parse_degrees_minutes(value: &str, degree_digits: usize, limit: f64) -> Option<f64> {
    if value.len() < degree_digits + 2 || !value.is_char_boundary(degree_digits) {
        return None;
    }
    let (deg, min) = value.split_at(degree_digits);
    let deg: f64 = deg.parse().ok()?;
    let min: f64 = min.parse().ok()?;
    if !(0.0..60.0).contains(&min) {
        return None;
    }
    let result = deg + min / 60.0;
    (result <= limit).then_some(result)
}

/// Parse `hhmmss` or `hhmmss.sss`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    if value.len() < 6 || !value.is_char_boundary(6) {
        return None;
    }
    let (hms, frac) = value.split_at(6);
    let hour = hms.get(0..2)?.parse().ok()?;
    let min = hms.get(2..4)?.parse().ok()?;
    let sec = hms.get(4..6)?.parse().ok()?;
    let millis = match frac.strip_prefix('.') {
        Some(f) if !f.is_empty() => {
            let f: f64 = format!("0.{f}").parse().ok()?;
            (f * 1000.0).round() as u32
        }
        _ => 0,
    };
    NaiveTime::from_hms_milli_opt(hour, min, sec, millis.min(999))
}

/// Parse `ddmmyy`; two-digit years are taken as 20xx.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if value.len() != 6 {
        return None;
    }
    let day = value.get(0..2)?.parse().ok()?;
    let month = value.get(2..4)?.parse().ok()?;
    let year: i32 = value.get(4..6)?.parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

/// Replace the characters that would break a comma separated field.
pub fn clean_field(value: &str, max_len: usize) -> String {
    value
        .chars()
        .map(|c| match c {
            ',' | '*' | '$' | '!' | '\r' | '\n' => ' ',
            c => c,
        })
        .take(max_len)
        .collect()
}

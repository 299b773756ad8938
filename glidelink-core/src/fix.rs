use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Wind vector as reported by an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    /// Wind speed in m/s
    pub speed: f64,
    /// Direction the wind blows from, degrees true
    pub bearing: f64,
}

/// Navigation state extracted from one inbound line.
///
/// Drivers only fill what their sentence carries, so every field is optional and
/// `None` means "not valid in this fix". Units are SI: metres, m/s, degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NavFix {
    pub time: Option<NaiveTime>,
    pub date: Option<NaiveDate>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub gps_altitude: Option<f64>,
    pub baro_altitude: Option<f64>,
    pub ground_speed: Option<f64>,
    pub track: Option<f64>,
    pub true_airspeed: Option<f64>,
    pub indicated_airspeed: Option<f64>,
    pub vario: Option<f64>,
    pub netto_vario: Option<f64>,
    pub wind: Option<Wind>,
    pub satellites: Option<u8>,
    /// MacCready setting echoed by the instrument, m/s
    pub mac_cready: Option<f64>,
    /// Water ballast as a fraction of capacity
    pub ballast: Option<f64>,
    /// Bug factor, 1.0 is a clean wing
    pub bugs: Option<f64>,
}

impl NavFix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_position(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }

    pub fn has_vario(&self) -> bool {
        self.vario.is_some()
    }

    pub fn has_wind(&self) -> bool {
        self.wind.is_some()
    }

    /// True when no field carries a value.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

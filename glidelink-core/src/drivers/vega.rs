use crate::error::DeviceError;
use crate::fix::{NavFix, Wind};
use crate::nmea::Sentence;
use crate::port::DeviceIo;

use super::generic::parse_gps;
use super::{DeviceDriver, Operation};

/// Vega variometer. Not a logger; forwards the GPS sentences of whatever
/// receiver is plugged into it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vega;

impl DeviceDriver for Vega {
    fn supports(&self, op: Operation) -> bool {
        op.is_baseline()
            || matches!(
                op,
                Operation::PutMacCready | Operation::PutBugs | Operation::PutBallast
            )
    }

    fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool {
        let Some(sentence) = Sentence::parse(line) else {
            return false;
        };
        match sentence.address() {
            "PDVDV" => parse_pdvdv(&sentence, fix),
            "PDVWI" => parse_pdvwi(&sentence, fix),
            _ => parse_gps(&sentence, fix),
        }
    }

    fn init(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        io.send_sentence("PDVSC,R,Version")
    }

    fn put_mac_cready(&mut self, io: &mut DeviceIo, mac_cready: f64) -> Result<(), DeviceError> {
        let decimetres = (mac_cready * 10.0).round() as i32;
        io.send_sentence(&format!("PDVMC,{decimetres}"))
    }

    fn put_bugs(&mut self, io: &mut DeviceIo, bugs: f64) -> Result<(), DeviceError> {
        let percent = (bugs.clamp(0.0, 1.0) * 100.0).round() as i32;
        io.send_sentence(&format!("PDVBG,{percent}"))
    }

    fn put_ballast(&mut self, io: &mut DeviceIo, ballast: f64) -> Result<(), DeviceError> {
        let permille = (ballast.clamp(0.0, 1.0) * 1000.0).round() as i32;
        io.send_sentence(&format!("PDVBL,{permille}"))
    }
}

// $PDVDV,<vario dm/s>,<netto dm/s>,<ias dm/s>,<tas/ias *1024>,<baro alt m>
fn parse_pdvdv(s: &Sentence<'_>, fix: &mut NavFix) -> bool {
    let (Some(vario), Some(netto), Some(ias), Some(ratio), Some(altitude)) =
        (s.f64(0), s.f64(1), s.f64(2), s.f64(3), s.f64(4))
    else {
        return false;
    };

    let ias = ias / 10.0;
    fix.vario = Some(vario / 10.0);
    fix.netto_vario = Some(netto / 10.0);
    fix.indicated_airspeed = Some(ias);
    fix.true_airspeed = Some(ias * ratio / 1024.0);
    fix.baro_altitude = Some(altitude);
    true
}

// $PDVWI,<bearing deg>,<speed dm/s>
fn parse_pdvwi(s: &Sentence<'_>, fix: &mut NavFix) -> bool {
    let (Some(bearing), Some(speed)) = (s.f64(0), s.f64(1)) else {
        return false;
    };
    if !(0.0..=360.0).contains(&bearing) || speed < 0.0 {
        return false;
    }
    fix.wind = Some(Wind {
        speed: speed / 10.0,
        bearing,
    });
    true
}

//! Concrete protocol drivers.
//!
//! Every driver implements [`DeviceDriver`]; [`Driver`] is the closed set the
//! dispatcher matches over. Operations a driver does not override report
//! [`DeviceError::Unsupported`] and are hidden behind [`DeviceDriver::supports`],
//! so the dispatcher never calls them.

mod cai302;
mod ew;
mod generic;
mod vega;

pub use cai302::Cai302;
pub use ew::EwLogger;
pub use generic::GenericNmea;
pub use vega::Vega;

use serde::Serialize;
use strum::{Display, EnumIter};

use crate::declaration::Waypoint;
use crate::error::DeviceError;
use crate::fix::NavFix;
use crate::port::DeviceIo;
use crate::registry::{Capabilities, DriverKind};

/// Operations the dispatcher forwards to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
pub enum Operation {
    #[strum(serialize = "parse")]
    Parse,
    #[strum(serialize = "set MacCready")]
    PutMacCready,
    #[strum(serialize = "set bugs")]
    PutBugs,
    #[strum(serialize = "set ballast")]
    PutBallast,
    #[strum(serialize = "open")]
    Open,
    #[strum(serialize = "close")]
    Close,
    #[strum(serialize = "init")]
    Init,
    #[strum(serialize = "link timeout")]
    LinkTimeout,
    #[strum(serialize = "declaration begin")]
    DeclBegin,
    #[strum(serialize = "declaration end")]
    DeclEnd,
    #[strum(serialize = "declaration waypoint")]
    DeclAddWaypoint,
}

impl Operation {
    /// Capability a driver must declare before the operation is forwarded.
    pub fn required_capability(self) -> Option<Capabilities> {
        match self {
            Self::PutMacCready => Some(Capabilities::MAC_CREADY),
            Self::PutBugs => Some(Capabilities::BUGS),
            Self::PutBallast => Some(Capabilities::BALLAST),
            Self::DeclBegin | Self::DeclEnd | Self::DeclAddWaypoint => Some(Capabilities::LOGGER),
            Self::Parse | Self::Open | Self::Close | Self::Init | Self::LinkTimeout => None,
        }
    }

    /// Operations every driver provides through the trait defaults.
    pub fn is_baseline(self) -> bool {
        matches!(
            self,
            Self::Parse | Self::Open | Self::Close | Self::Init | Self::LinkTimeout
        )
    }
}

/// The operation set of one protocol implementation.
pub trait DeviceDriver {
    /// Whether this driver implements `op`.
    fn supports(&self, op: Operation) -> bool {
        op.is_baseline()
    }

    /// Parse one delimited line into `fix`. Returns false on anything that is
    /// not a usable sentence for this driver.
    fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool;

    fn open(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        io.open()
    }

    fn close(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        io.close()
    }

    /// Called once the port is open.
    fn init(&mut self, _io: &mut DeviceIo) -> Result<(), DeviceError> {
        Ok(())
    }

    /// No valid data for a whole link window; try to get the device back.
    fn link_timeout(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        io.reopen()
    }

    fn put_mac_cready(&mut self, _io: &mut DeviceIo, _mac_cready: f64) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Operation::PutMacCready))
    }

    fn put_bugs(&mut self, _io: &mut DeviceIo, _bugs: f64) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Operation::PutBugs))
    }

    fn put_ballast(&mut self, _io: &mut DeviceIo, _ballast: f64) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Operation::PutBallast))
    }

    fn declare_begin(
        &mut self,
        _io: &mut DeviceIo,
        _pilot: &str,
        _glider_class: &str,
        _glider_id: &str,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Operation::DeclBegin))
    }

    fn declare_add_waypoint(
        &mut self,
        _io: &mut DeviceIo,
        _waypoint: &Waypoint,
    ) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Operation::DeclAddWaypoint))
    }

    fn declare_end(&mut self, _io: &mut DeviceIo) -> Result<(), DeviceError> {
        Err(DeviceError::Unsupported(Operation::DeclEnd))
    }

    /// Best effort cleanup after a declaration was abandoned.
    fn declare_abort(&mut self, _io: &mut DeviceIo) -> Result<(), DeviceError> {
        Ok(())
    }
}

/// A driver instance bound to a slot.
#[derive(Debug)]
pub enum Driver {
    Generic(GenericNmea),
    Cai302(Cai302),
    Ew(EwLogger),
    Vega(Vega),
}

impl Driver {
    pub fn new(kind: DriverKind) -> Self {
        match kind {
            DriverKind::Generic => Self::Generic(GenericNmea),
            DriverKind::Cai302 => Self::Cai302(Cai302::default()),
            DriverKind::Ew => Self::Ew(EwLogger::default()),
            DriverKind::Vega => Self::Vega(Vega),
        }
    }

    pub fn kind(&self) -> DriverKind {
        match self {
            Self::Generic(_) => DriverKind::Generic,
            Self::Cai302(_) => DriverKind::Cai302,
            Self::Ew(_) => DriverKind::Ew,
            Self::Vega(_) => DriverKind::Vega,
        }
    }
}

macro_rules! each_driver {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            Driver::Generic($d) => $call,
            Driver::Cai302($d) => $call,
            Driver::Ew($d) => $call,
            Driver::Vega($d) => $call,
        }
    };
}

impl DeviceDriver for Driver {
    fn supports(&self, op: Operation) -> bool {
        each_driver!(self, d => d.supports(op))
    }

    fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool {
        each_driver!(self, d => d.parse_line(line, fix))
    }

    fn open(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        each_driver!(self, d => d.open(io))
    }

    fn close(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        each_driver!(self, d => d.close(io))
    }

    fn init(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        each_driver!(self, d => d.init(io))
    }

    fn link_timeout(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        each_driver!(self, d => d.link_timeout(io))
    }

    fn put_mac_cready(&mut self, io: &mut DeviceIo, mac_cready: f64) -> Result<(), DeviceError> {
        each_driver!(self, d => d.put_mac_cready(io, mac_cready))
    }

    fn put_bugs(&mut self, io: &mut DeviceIo, bugs: f64) -> Result<(), DeviceError> {
        each_driver!(self, d => d.put_bugs(io, bugs))
    }

    fn put_ballast(&mut self, io: &mut DeviceIo, ballast: f64) -> Result<(), DeviceError> {
        each_driver!(self, d => d.put_ballast(io, ballast))
    }

    fn declare_begin(
        &mut self,
        io: &mut DeviceIo,
        pilot: &str,
        glider_class: &str,
        glider_id: &str,
    ) -> Result<(), DeviceError> {
        each_driver!(self, d => d.declare_begin(io, pilot, glider_class, glider_id))
    }

    fn declare_add_waypoint(
        &mut self,
        io: &mut DeviceIo,
        waypoint: &Waypoint,
    ) -> Result<(), DeviceError> {
        each_driver!(self, d => d.declare_add_waypoint(io, waypoint))
    }

    fn declare_end(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        each_driver!(self, d => d.declare_end(io))
    }

    fn declare_abort(&mut self, io: &mut DeviceIo) -> Result<(), DeviceError> {
        each_driver!(self, d => d.declare_abort(io))
    }
}

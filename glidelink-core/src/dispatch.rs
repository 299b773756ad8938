//! Capability-aware forwarding of slot operations to the bound driver.
//!
//! Every operation follows the same rule: an unbound slot, a missing
//! capability or an operation the driver does not implement all give `false`
//! without reaching the driver. Otherwise the driver runs and its outcome is
//! reported as a boolean; driver errors are logged here and go no further.

use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::declaration::Waypoint;
use crate::drivers::{DeviceDriver, Driver, Operation};
use crate::error::DeviceError;
use crate::fix::NavFix;
use crate::port::DeviceIo;
use crate::registry::Capabilities;
use crate::slot::DeviceSlot;

impl DeviceSlot {
    /// Whether `op` would be forwarded to a driver right now.
    pub fn permits(&self, op: Operation) -> bool {
        self.binding.as_ref().is_some_and(|b| b.permits(op))
    }

    pub(crate) fn forward<F>(&mut self, op: Operation, call: F) -> bool
    where
        F: FnOnce(&mut Driver, &mut DeviceIo) -> Result<(), DeviceError>,
    {
        let index = self.index();
        let Some(binding) = self.binding.as_mut() else {
            debug!("Slot {index}: {op} ignored, slot is unbound");
            return false;
        };
        if !binding.permits(op) {
            debug!(
                "Slot {index}: {op} not supported by {name}",
                name = binding.descriptor.name()
            );
            return false;
        }

        match call(&mut binding.driver, &mut binding.io) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Slot {index}: {op} failed on {name}: {e}",
                    name = binding.descriptor.name()
                );
                false
            }
        }
    }

    /// Parse one line; `fix` is only written when a valid fix was extracted.
    pub fn parse_line(&mut self, line: &str, fix: &mut NavFix) -> bool {
        self.parse_line_at(line, fix, Instant::now())
    }

    /// [`parse_line`](Self::parse_line) with an explicit receive time for the
    /// link monitor.
    pub fn parse_line_at(&mut self, line: &str, fix: &mut NavFix, now: Instant) -> bool {
        let Some(binding) = self.binding.as_mut() else {
            return false;
        };
        if !binding.permits(Operation::Parse) {
            return false;
        }

        let mut scratch = fix.clone();
        if !binding.driver.parse_line(line, &mut scratch) {
            trace!("Slot {index}: discarded {line:?}", index = self.index());
            return false;
        }

        *fix = scratch;
        self.link.record_fix(now);
        true
    }

    pub fn put_mac_cready(&mut self, mac_cready: f64) -> bool {
        self.forward(Operation::PutMacCready, |d, io| {
            d.put_mac_cready(io, mac_cready)
        })
    }

    pub fn put_bugs(&mut self, bugs: f64) -> bool {
        self.forward(Operation::PutBugs, |d, io| d.put_bugs(io, bugs))
    }

    pub fn put_ballast(&mut self, ballast: f64) -> bool {
        self.forward(Operation::PutBallast, |d, io| d.put_ballast(io, ballast))
    }

    pub fn open(&mut self) -> bool {
        self.forward(Operation::Open, |d, io| d.open(io))
    }

    pub fn close(&mut self) -> bool {
        self.forward(Operation::Close, |d, io| d.close(io))
    }

    pub fn init(&mut self) -> bool {
        self.forward(Operation::Init, |d, io| d.init(io))
    }

    /// Open the port and run the driver's post-open initialisation.
    pub fn connect(&mut self) -> bool {
        self.open() && self.init()
    }

    pub fn link_timeout(&mut self) -> bool {
        self.forward(Operation::LinkTimeout, |d, io| d.link_timeout(io))
    }

    pub(crate) fn forward_declare_begin(
        &mut self,
        pilot: &str,
        glider_class: &str,
        glider_id: &str,
    ) -> bool {
        self.forward(Operation::DeclBegin, |d, io| {
            d.declare_begin(io, pilot, glider_class, glider_id)
        })
    }

    pub(crate) fn forward_declare_add_waypoint(&mut self, waypoint: &Waypoint) -> bool {
        self.forward(Operation::DeclAddWaypoint, |d, io| {
            d.declare_add_waypoint(io, waypoint)
        })
    }

    pub(crate) fn forward_declare_end(&mut self) -> bool {
        self.forward(Operation::DeclEnd, |d, io| d.declare_end(io))
    }

    pub(crate) fn forward_declare_abort(&mut self) {
        let index = self.index();
        if let Some(binding) = self.binding.as_mut()
            && let Err(e) = binding.driver.declare_abort(&mut binding.io)
        {
            debug!("Slot {index}: declaration cleanup failed: {e}");
        }
    }

    pub fn is_logger(&self) -> bool {
        self.has_capability(Capabilities::LOGGER)
    }

    pub fn is_gps_source(&self) -> bool {
        self.has_capability(Capabilities::GPS)
    }

    fn has_capability(&self, capability: Capabilities) -> bool {
        self.binding
            .as_ref()
            .is_some_and(|b| b.descriptor.has(capability))
    }
}

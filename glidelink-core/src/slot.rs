use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::declaration::{DeclarationPhase, DeclarationSession};
use crate::drivers::{DeviceDriver, Driver, Operation};
use crate::link::{LinkMonitor, LinkStatus};
use crate::port::DeviceIo;
use crate::registry::DriverDescriptor;

/// Number of device slots.
pub const NUMDEV: usize = 2;

/// A driver instance together with its descriptor and port.
#[derive(Debug)]
pub(crate) struct Binding {
    pub(crate) descriptor: DriverDescriptor,
    pub(crate) driver: Driver,
    pub(crate) io: DeviceIo,
}

impl Binding {
    /// Declared capability and driver implementation both allow `op`.
    pub(crate) fn permits(&self, op: Operation) -> bool {
        let declared = op
            .required_capability()
            .is_none_or(|cap| self.descriptor.has(cap));
        declared && self.driver.supports(op)
    }
}

/// One communication endpoint.
///
/// Slots are never destroyed, only rebound. All operations on a slot take
/// `&mut self`; the owner serializes access (see `DeviceManager`).
#[derive(Debug)]
pub struct DeviceSlot {
    index: usize,
    pub(crate) binding: Option<Binding>,
    pub(crate) link: LinkMonitor,
    pub(crate) session: Option<DeclarationSession>,
}

impl DeviceSlot {
    pub fn new(index: usize, link_window: Duration) -> Self {
        Self {
            index,
            binding: None,
            link: LinkMonitor::new(link_window, Instant::now()),
            session: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    /// Port identifier this slot claims.
    pub fn port(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.io.port())
    }

    /// Display name of the bound driver.
    pub fn name(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.descriptor.name())
    }

    pub fn descriptor(&self) -> Option<&DriverDescriptor> {
        self.binding.as_ref().map(|b| &b.descriptor)
    }

    pub fn is_open(&self) -> bool {
        self.binding.as_ref().is_some_and(|b| b.io.is_open())
    }

    pub fn link(&self) -> &LinkMonitor {
        &self.link
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.status()
    }

    pub fn set_link_window(&mut self, window: Duration) {
        self.link.set_window(window);
    }

    pub fn session(&self) -> Option<&DeclarationSession> {
        self.session.as_ref()
    }

    pub fn declaration_phase(&self) -> DeclarationPhase {
        self.session
            .as_ref()
            .map_or(DeclarationPhase::Idle, |s| s.phase())
    }

    /// Install a new driver on `io`'s port, releasing whatever was bound.
    ///
    /// Callers validate the index, driver name and port ownership first.
    pub fn bind(&mut self, descriptor: DriverDescriptor, io: DeviceIo, now: Instant) {
        self.release();

        info!(
            "Slot {index} bound to {port} with driver {name}",
            index = self.index,
            port = io.port(),
            name = descriptor.name()
        );

        self.binding = Some(Binding {
            driver: Driver::new(descriptor.kind()),
            descriptor,
            io,
        });
        self.link.reset(now);
    }

    pub fn unbind(&mut self) {
        if self.release() {
            info!("Slot {index} unbound", index = self.index);
        }
    }

    /// Fail any open declaration and give the driver a chance to close its
    /// port. Returns whether something was bound.
    fn release(&mut self) -> bool {
        if self.declaration_phase().is_active() {
            self.declare_abort();
        }

        let Some(mut binding) = self.binding.take() else {
            return false;
        };
        if binding.io.is_open()
            && let Err(e) = binding.driver.close(&mut binding.io)
        {
            warn!(
                "Driver {name} failed to close {port}: {e}",
                name = binding.descriptor.name(),
                port = binding.io.port()
            );
        }
        true
    }
}

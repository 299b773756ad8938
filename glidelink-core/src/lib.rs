//! Core library for glidelink
//!
//! This crate provides the device layer of a glide computer: a registry of
//! protocol drivers, two device slots bound to ports, capability-aware
//! dispatch of inbound NMEA lines and outbound commands, link supervision and
//! task declaration to flight recorders.

pub mod config;
pub mod connection;
pub mod declaration;
mod dispatch;
pub mod drivers;
pub mod error;
pub mod fix;
pub mod link;
pub mod nmea;
pub mod port;
pub mod registry;
pub mod slot;
pub mod state;

// Re-export commonly used types
pub use anyhow::Result;
pub use config::GlideConfig;
pub use connection::DeviceManager;
pub use declaration::{Declaration, DeclarationPhase, Waypoint, WaypointFlags};
pub use error::DeviceError;
pub use fix::{NavFix, Wind};
pub use link::LinkStatus;
pub use port::{DeviceIo, Link, MemoryTransport, Transport};
pub use registry::{Capabilities, DriverDescriptor, DriverKind, DriverRegistry, NUMREGDEV};
pub use slot::{DeviceSlot, NUMDEV};
pub use state::{PortLine, SlotFix, SlotInfo};

#[cfg(test)]
mod tests;

use serde::Serialize;

use crate::declaration::DeclarationPhase;
use crate::fix::NavFix;
use crate::link::LinkStatus;
use crate::slot::DeviceSlot;

/// Point-in-time view of one slot, for display and diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct SlotInfo {
    pub index: usize,
    pub port: Option<String>,
    pub driver: Option<String>,
    pub capabilities: Vec<String>,
    pub open: bool,
    pub link: LinkStatus,
    pub timeouts: u32,
    pub declaration: DeclarationPhase,
}

impl From<&DeviceSlot> for SlotInfo {
    fn from(slot: &DeviceSlot) -> Self {
        Self {
            index: slot.index(),
            port: slot.port().map(str::to_string),
            driver: slot.name().map(str::to_string),
            capabilities: slot
                .descriptor()
                .map(|d| {
                    d.capabilities()
                        .names()
                        .into_iter()
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            open: slot.is_open(),
            link: slot.link_status(),
            timeouts: slot.link().timeouts(),
            declaration: slot.declaration_phase(),
        }
    }
}

/// One delimited line received on a port.
#[derive(Debug, Clone, PartialEq)]
pub struct PortLine {
    pub port: String,
    pub line: String,
}

impl PortLine {
    pub fn new(port: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            line: line.into(),
        }
    }
}

/// A parsed fix together with the slot that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotFix {
    pub slot: usize,
    pub fix: NavFix,
}

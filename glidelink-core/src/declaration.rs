//! Task declaration to logger devices.
//!
//! A declaration is uploaded in three steps: begin (pilot and glider), one
//! call per waypoint in flight order, end. Calls outside their phase are
//! rejected before anything reaches the driver; a driver failure at any step
//! fails the whole session.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::Display;
use tracing::{info, warn};

use crate::drivers::Operation;
use crate::slot::DeviceSlot;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WaypointFlags: u8 {
        const TURNPOINT = 1 << 0;
        const AIRPORT = 1 << 1;
        const LANDPOINT = 1 << 2;
        const HOME = 1 << 3;
        const START = 1 << 4;
        const FINISH = 1 << 5;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub number: u32,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above mean sea level
    #[serde(default)]
    pub altitude: f64,
    #[serde(default)]
    pub flags: WaypointFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// A complete task as supplied by flight logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Declaration {
    pub pilot: String,
    pub glider_class: String,
    pub glider_id: String,
    pub waypoints: Vec<Waypoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum DeclarationPhase {
    Idle,
    Begun,
    Adding,
    Ended,
    Failed,
}

impl DeclarationPhase {
    /// Begun or Adding: an upload is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Begun | Self::Adding)
    }
}

/// Progress of the declaration running on one slot.
#[derive(Debug, Clone, Serialize)]
pub struct DeclarationSession {
    pilot: String,
    glider_class: String,
    glider_id: String,
    waypoints: Vec<Waypoint>,
    phase: DeclarationPhase,
}

impl DeclarationSession {
    fn new(pilot: &str, glider_class: &str, glider_id: &str, phase: DeclarationPhase) -> Self {
        Self {
            pilot: pilot.to_string(),
            glider_class: glider_class.to_string(),
            glider_id: glider_id.to_string(),
            waypoints: Vec::new(),
            phase,
        }
    }

    pub fn pilot(&self) -> &str {
        &self.pilot
    }

    pub fn glider_class(&self) -> &str {
        &self.glider_class
    }

    pub fn glider_id(&self) -> &str {
        &self.glider_id
    }

    /// Waypoints accepted so far, in submission order.
    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    pub fn phase(&self) -> DeclarationPhase {
        self.phase
    }
}

impl DeviceSlot {
    /// Start a declaration. Valid when no upload is in progress; a finished
    /// or failed session is replaced.
    pub fn declare_begin(&mut self, pilot: &str, glider_class: &str, glider_id: &str) -> bool {
        let phase = self.declaration_phase();
        if phase.is_active() {
            warn!(
                "Slot {index}: declaration already in progress ({phase})",
                index = self.index()
            );
            return false;
        }
        if !self.permits(Operation::DeclBegin) {
            return false;
        }

        let accepted = self.forward_declare_begin(pilot, glider_class, glider_id);
        let phase = if accepted {
            DeclarationPhase::Begun
        } else {
            self.forward_declare_abort();
            DeclarationPhase::Failed
        };
        self.session = Some(DeclarationSession::new(
            pilot,
            glider_class,
            glider_id,
            phase,
        ));
        accepted
    }

    pub fn declare_add_waypoint(&mut self, waypoint: &Waypoint) -> bool {
        if !self.declaration_phase().is_active() {
            warn!(
                "Slot {index}: waypoint {name} rejected, no declaration in progress",
                index = self.index(),
                name = waypoint.name
            );
            return false;
        }

        let accepted = self.forward_declare_add_waypoint(waypoint);
        if !accepted {
            self.forward_declare_abort();
        }
        if let Some(session) = self.session.as_mut() {
            if accepted {
                session.waypoints.push(waypoint.clone());
                session.phase = DeclarationPhase::Adding;
            } else {
                session.phase = DeclarationPhase::Failed;
            }
        }
        accepted
    }

    /// Finish the upload. `true` means the device accepted the whole task.
    ///
    /// Allowed straight after begin; whether an empty task is acceptable is
    /// the driver's decision.
    pub fn declare_end(&mut self) -> bool {
        if !self.declaration_phase().is_active() {
            warn!(
                "Slot {index}: end rejected, no declaration in progress",
                index = self.index()
            );
            return false;
        }

        let accepted = self.forward_declare_end();
        if !accepted {
            self.forward_declare_abort();
        }
        if let Some(session) = self.session.as_mut() {
            session.phase = if accepted {
                info!(
                    "Declared {count} waypoint(s) for {pilot}",
                    count = session.waypoints.len(),
                    pilot = session.pilot
                );
                DeclarationPhase::Ended
            } else {
                DeclarationPhase::Failed
            };
        }
        accepted
    }

    /// Abandon an in-progress declaration. Returns false when none was active.
    pub fn declare_abort(&mut self) -> bool {
        if !self.declaration_phase().is_active() {
            return false;
        }
        self.forward_declare_abort();
        let index = self.index();
        if let Some(session) = self.session.as_mut() {
            warn!(
                "Slot {index}: declaration for {pilot} aborted",
                pilot = session.pilot
            );
            session.phase = DeclarationPhase::Failed;
        }
        true
    }

    /// Run a whole declaration, stopping at the first refused step.
    pub fn declare(&mut self, declaration: &Declaration) -> bool {
        if !self.declare_begin(
            &declaration.pilot,
            &declaration.glider_class,
            &declaration.glider_id,
        ) {
            return false;
        }
        for waypoint in &declaration.waypoints {
            if !self.declare_add_waypoint(waypoint) {
                return false;
            }
        }
        self.declare_end()
    }
}

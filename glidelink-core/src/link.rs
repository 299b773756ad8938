use std::time::{Duration, Instant};

use serde::Serialize;
use strum::Display;
use tracing::{info, warn};

use crate::slot::DeviceSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
pub enum LinkStatus {
    Live,
    TimedOut,
}

/// Liveness of one slot, measured from the last successfully parsed fix.
#[derive(Debug, Clone)]
pub struct LinkMonitor {
    window: Duration,
    last_fix: Instant,
    timeouts: u32,
    status: LinkStatus,
}

impl LinkMonitor {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            last_fix: now,
            timeouts: 0,
            status: LinkStatus::Live,
        }
    }

    pub fn status(&self) -> LinkStatus {
        self.status
    }

    /// Consecutive timeouts since the last valid fix.
    pub fn timeouts(&self) -> u32 {
        self.timeouts
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
    }

    pub fn last_fix(&self) -> Instant {
        self.last_fix
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_fix) >= self.window
    }

    pub fn record_fix(&mut self, now: Instant) {
        self.last_fix = now;
        self.timeouts = 0;
        self.status = LinkStatus::Live;
    }

    /// Fresh state after a (re)bind.
    pub fn reset(&mut self, now: Instant) {
        self.record_fix(now);
    }

    fn mark_timed_out(&mut self) {
        self.status = LinkStatus::TimedOut;
        self.timeouts = self.timeouts.saturating_add(1);
    }

    /// The driver recovered the link; start a new window at `now`.
    fn mark_recovered(&mut self, now: Instant) {
        self.status = LinkStatus::Live;
        self.last_fix = now;
    }
}

impl DeviceSlot {
    /// Periodic liveness check.
    ///
    /// A live link whose window has run out, or a link that is already timed
    /// out, gets the driver's link-timeout handler. Success starts a new window;
    /// failure leaves the link timed out until the next tick. Returns `None`
    /// for an unbound slot.
    pub fn check_link(&mut self, now: Instant) -> Option<LinkStatus> {
        if !self.is_bound() {
            return None;
        }
        if self.link.status() == LinkStatus::Live && !self.link.is_expired(now) {
            return Some(LinkStatus::Live);
        }

        self.link.mark_timed_out();
        warn!(
            "Slot {index}: no valid data for {window:?} (timeout #{count})",
            index = self.index(),
            window = self.link.window(),
            count = self.link.timeouts()
        );

        if self.link_timeout() {
            info!("Slot {index}: link recovered", index = self.index());
            self.link.mark_recovered(now);
        }
        Some(self.link.status())
    }
}

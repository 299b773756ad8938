use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, ensure};
use tokio::sync::{Mutex, MutexGuard, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GlideConfig;
use crate::declaration::{Declaration, DeclarationPhase, Waypoint};
use crate::fix::NavFix;
use crate::link::LinkStatus;
use crate::port::{DeviceIo, Transport};
use crate::registry::DriverRegistry;
use crate::slot::{DeviceSlot, NUMDEV};
use crate::state::{PortLine, SlotFix, SlotInfo};

/// Owner of the device slots.
///
/// Each slot sits behind its own lock, so everything done to one slot
/// (parsing, commands, link checks, declaration steps) is serialized while
/// the two slots stay independent of each other.
pub struct DeviceManager {
    registry: DriverRegistry,
    transport: Arc<dyn Transport>,
    slots: [Arc<Mutex<DeviceSlot>>; NUMDEV],
    link_timeout: Duration,
    io_timeout: Duration,
}

impl DeviceManager {
    pub fn new(
        registry: DriverRegistry,
        transport: Arc<dyn Transport>,
        link_timeout: Duration,
        io_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            slots: std::array::from_fn(|index| {
                Arc::new(Mutex::new(DeviceSlot::new(index, link_timeout)))
            }),
            link_timeout,
            io_timeout,
        }
    }

    /// Build a manager and bind every slot that has both a port and a driver
    /// configured.
    pub async fn from_config(
        config: &GlideConfig,
        registry: DriverRegistry,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let manager = Self::new(
            registry,
            transport,
            config.link.timeout,
            config.link.io_timeout,
        );

        for (index, slot) in config.slots.iter().enumerate() {
            let (Some(port), Some(driver)) = (&slot.port, &slot.driver) else {
                debug!("Slot {index} not configured");
                continue;
            };
            ensure!(
                manager.bind(index, port, driver).await,
                "Failed to bind slot {index} to {port} with driver {driver}"
            );
        }

        Ok(manager)
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn link_timeout(&self) -> Duration {
        self.link_timeout
    }

    async fn slot(&self, index: usize) -> Option<MutexGuard<'_, DeviceSlot>> {
        match self.slots.get(index) {
            Some(slot) => Some(slot.lock().await),
            None => {
                error!("Invalid slot index {index} (have {NUMDEV})");
                None
            }
        }
    }

    /// Bind `slot` to `port` with the registered driver `driver_name`.
    ///
    /// Fails for an invalid index, an unknown driver, or a port that the
    /// other slot already claims. A previous binding is released first, which
    /// fails any declaration in progress.
    pub async fn bind(&self, slot: usize, port: &str, driver_name: &str) -> bool {
        if slot >= NUMDEV {
            error!("Invalid slot index {slot} (have {NUMDEV})");
            return false;
        }
        let Some(descriptor) = self.registry.lookup(driver_name).cloned() else {
            error!("Unknown driver {driver_name}");
            return false;
        };

        // Lock in index order so concurrent binds cannot deadlock.
        let mut guards = Vec::with_capacity(NUMDEV);
        for s in &self.slots {
            guards.push(s.lock().await);
        }

        if let Some(owner) = guards
            .iter()
            .find(|g| g.index() != slot && g.port() == Some(port))
        {
            error!(
                "Port {port} already claimed by slot {owner}",
                owner = owner.index()
            );
            return false;
        }

        let io = DeviceIo::new(port, self.transport.clone(), self.io_timeout);
        guards[slot].bind(descriptor, io, Instant::now());
        true
    }

    pub async fn unbind(&self, slot: usize) -> bool {
        let Some(mut guard) = self.slot(slot).await else {
            return false;
        };
        guard.unbind();
        true
    }

    /// Slot currently claiming `port`.
    pub async fn resolve(&self, port: &str) -> Option<usize> {
        for slot in &self.slots {
            let guard = slot.lock().await;
            if guard.port() == Some(port) {
                return Some(guard.index());
            }
        }
        None
    }

    pub async fn open(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.open()).await
    }

    pub async fn close(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.close()).await
    }

    pub async fn init(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.init()).await
    }

    /// Open the port and initialise the device.
    pub async fn connect(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.connect()).await
    }

    pub async fn parse_line(&self, slot: usize, line: &str, fix: &mut NavFix) -> bool {
        self.with_slot(slot, |s| s.parse_line(line, fix)).await
    }

    /// Route a line received on `port` to the slot that claims it.
    ///
    /// Lines for ports nobody claims, including lines still in flight when a
    /// slot was unbound or rebound, are dropped.
    pub async fn handle_line(&self, port: &str, line: &str) -> Option<SlotFix> {
        let Some(index) = self.resolve(port).await else {
            debug!("Dropping line from unclaimed port {port}");
            return None;
        };

        let mut guard = self.slots[index].lock().await;
        if guard.port() != Some(port) {
            debug!("Slot {index} rebound while a line from {port} was in flight, dropping it");
            return None;
        }

        let mut fix = NavFix::new();
        guard
            .parse_line(line, &mut fix)
            .then_some(SlotFix { slot: index, fix })
    }

    pub async fn put_mac_cready(&self, slot: usize, mac_cready: f64) -> bool {
        self.with_slot(slot, |s| s.put_mac_cready(mac_cready)).await
    }

    pub async fn put_bugs(&self, slot: usize, bugs: f64) -> bool {
        self.with_slot(slot, |s| s.put_bugs(bugs)).await
    }

    pub async fn put_ballast(&self, slot: usize, ballast: f64) -> bool {
        self.with_slot(slot, |s| s.put_ballast(ballast)).await
    }

    pub async fn link_timeout_notify(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.link_timeout()).await
    }

    pub async fn is_logger(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.is_logger()).await
    }

    pub async fn is_gps_source(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.is_gps_source()).await
    }

    pub async fn declare_begin(
        &self,
        slot: usize,
        pilot: &str,
        glider_class: &str,
        glider_id: &str,
    ) -> bool {
        self.with_slot(slot, |s| s.declare_begin(pilot, glider_class, glider_id))
            .await
    }

    pub async fn declare_add_waypoint(&self, slot: usize, waypoint: &Waypoint) -> bool {
        self.with_slot(slot, |s| s.declare_add_waypoint(waypoint))
            .await
    }

    pub async fn declare_end(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.declare_end()).await
    }

    pub async fn declare_abort(&self, slot: usize) -> bool {
        self.with_slot(slot, |s| s.declare_abort()).await
    }

    /// Upload a whole task while holding the slot, so no inbound line is
    /// parsed in the middle of the sequence.
    pub async fn declare(&self, slot: usize, declaration: &Declaration) -> bool {
        self.with_slot(slot, |s| s.declare(declaration)).await
    }

    pub async fn declaration_phase(&self, slot: usize) -> Option<DeclarationPhase> {
        let guard = self.slot(slot).await?;
        Some(guard.declaration_phase())
    }

    pub async fn check_link(&self, slot: usize, now: Instant) -> Option<LinkStatus> {
        let mut guard = self.slot(slot).await?;
        guard.check_link(now)
    }

    pub async fn slot_info(&self, slot: usize) -> Option<SlotInfo> {
        let guard = self.slot(slot).await?;
        Some(SlotInfo::from(&*guard))
    }

    pub async fn slot_infos(&self) -> Vec<SlotInfo> {
        let mut infos = Vec::with_capacity(NUMDEV);
        for slot in &self.slots {
            infos.push(SlotInfo::from(&*slot.lock().await));
        }
        infos
    }

    async fn with_slot<R: Default>(&self, slot: usize, f: impl FnOnce(&mut DeviceSlot) -> R) -> R {
        match self.slot(slot).await {
            Some(mut guard) => f(&mut guard),
            None => R::default(),
        }
    }

    /// Feed lines from the stream reader into the slots and push every parsed
    /// fix to `fixes`. Ends when either channel closes.
    pub fn spawn_ingest(
        self: &Arc<Self>,
        mut lines: mpsc::Receiver<PortLine>,
        fixes: mpsc::Sender<SlotFix>,
    ) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            info!("Starting line ingest loop");

            while let Some(PortLine { port, line }) = lines.recv().await {
                let Some(fix) = manager.handle_line(&port, &line).await else {
                    continue;
                };
                if fixes.send(fix).await.is_err() {
                    debug!("Telemetry receiver dropped");
                    break;
                }
            }

            info!("Line ingest loop ended");
        })
    }

    /// Check both links every `period`.
    pub fn spawn_link_monitor(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                for index in 0..NUMDEV {
                    if let Some(LinkStatus::TimedOut) =
                        manager.check_link(index, Instant::now()).await
                    {
                        warn!("Slot {index} link still timed out");
                    }
                }
            }
        })
    }
}

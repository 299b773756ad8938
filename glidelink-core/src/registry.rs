use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use tracing::{debug, error};

/// Maximum number of driver descriptors the registry holds.
pub const NUMREGDEV: usize = 10;

bitflags! {
    /// What a driver declares it can do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Capabilities: u16 {
        /// Provides position fixes
        const GPS = 1 << 0;
        /// Accepts task declarations
        const LOGGER = 1 << 1;
        const SPEED = 1 << 2;
        const VARIO = 1 << 3;
        const BARO_ALT = 1 << 4;
        const WIND = 1 << 5;
        /// Accepts a MacCready setting
        const MAC_CREADY = 1 << 6;
        /// Accepts a bug (polar degradation) setting
        const BUGS = 1 << 7;
        /// Accepts a water ballast setting
        const BALLAST = 1 << 8;
    }
}

impl Capabilities {
    /// Flag names, e.g. `["GPS", "LOGGER"]`.
    pub fn names(&self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }
}

/// The closed set of protocol implementations shipped with the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize)]
pub enum DriverKind {
    /// Plain NMEA 0183 GPS
    #[strum(serialize = "Generic")]
    Generic,
    /// Cambridge Aero Instruments CAI 302
    #[strum(serialize = "CAI 302")]
    Cai302,
    /// EW flight recorder
    #[strum(serialize = "EW Logger")]
    Ew,
    /// Vega variometer
    #[strum(serialize = "Vega")]
    Vega,
}

impl DriverKind {
    pub fn default_capabilities(self) -> Capabilities {
        match self {
            Self::Generic => Capabilities::GPS,
            Self::Cai302 => Capabilities::all(),
            Self::Ew => Capabilities::GPS | Capabilities::LOGGER,
            Self::Vega => {
                Capabilities::SPEED
                    | Capabilities::VARIO
                    | Capabilities::BARO_ALT
                    | Capabilities::WIND
                    | Capabilities::MAC_CREADY
                    | Capabilities::BUGS
                    | Capabilities::BALLAST
            }
        }
    }
}

/// Immutable description of one registered driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDescriptor {
    name: String,
    kind: DriverKind,
    capabilities: Capabilities,
}

impl DriverDescriptor {
    pub fn new(name: impl Into<String>, kind: DriverKind, capabilities: Capabilities) -> Self {
        Self {
            name: name.into(),
            kind,
            capabilities,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DriverKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn has(&self, capability: Capabilities) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Bounded table of driver descriptors.
///
/// Filled during start-up and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct DriverRegistry {
    drivers: Vec<DriverDescriptor>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self {
            drivers: Vec::with_capacity(NUMREGDEV),
        }
    }

    /// Registry holding every built-in driver under its display name.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in DriverKind::iter() {
            registry.register_kind(kind.to_string(), kind, kind.default_capabilities());
        }
        registry
    }

    /// Register a generic NMEA driver under `name`.
    pub fn register(&mut self, name: impl Into<String>, capabilities: Capabilities) -> bool {
        self.register_kind(name, DriverKind::Generic, capabilities)
    }

    /// Register `kind` under `name`. Fails without touching the table when the
    /// registry is full or the name is taken.
    pub fn register_kind(
        &mut self,
        name: impl Into<String>,
        kind: DriverKind,
        capabilities: Capabilities,
    ) -> bool {
        let name = name.into();

        if self.is_full() {
            error!("Driver registry full ({NUMREGDEV} entries), cannot register {name}");
            return false;
        }
        if self.lookup(&name).is_some() {
            error!("Driver {name} is already registered");
            return false;
        }

        debug!(
            "Registered driver {name} ({kind}) with {caps:?}",
            caps = capabilities.names()
        );
        self.drivers
            .push(DriverDescriptor::new(name, kind, capabilities));
        true
    }

    pub fn lookup(&self, name: &str) -> Option<&DriverDescriptor> {
        self.drivers.iter().find(|d| d.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.drivers.iter()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.drivers.len() >= NUMREGDEV
    }
}

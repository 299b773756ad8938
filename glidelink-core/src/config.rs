use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::slot::NUMDEV;

const DEFAULT_LINK_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_BAUD_RATE: u32 = 4800;

/// Port and driver assignment of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            port: None,
            driver: None,
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// Link supervision settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Window without a valid fix before a slot is considered timed out
    #[serde(with = "duration_str", default = "default_link_timeout")]
    pub timeout: Duration,
    /// Upper bound for a single device reply
    #[serde(with = "duration_str", default = "default_io_timeout")]
    pub io_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_LINK_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

/// Device configuration, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlideConfig {
    #[serde(default)]
    pub slots: [SlotConfig; NUMDEV],
    #[serde(default)]
    pub link: LinkConfig,
}

impl GlideConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Load `path`, or defaults when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to encode config")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }

    /// Get a configuration value by key, e.g. `link.timeout` or `slot0.port`.
    pub fn get_value(&self, key: &str) -> Result<serde_json::Value> {
        let (category, field) = split_key(key)?;

        let value = match category {
            "link" => match field {
                "timeout" => json!(humantime::format_duration(self.link.timeout).to_string()),
                "io_timeout" => {
                    json!(humantime::format_duration(self.link.io_timeout).to_string())
                }
                _ => bail!("Unknown link config field: {field}"),
            },
            slot => {
                let config = &self.slots[slot_index(slot)?];
                match field {
                    "port" => json!(config.port),
                    "driver" => json!(config.driver),
                    "baud_rate" => json!(config.baud_rate),
                    _ => bail!("Unknown slot config field: {field}"),
                }
            }
        };

        Ok(json!({
            "key": key,
            "value": value
        }))
    }

    /// Set a configuration value by key. An empty value clears optional fields.
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let (category, field) = split_key(key)?;

        match category {
            "link" => {
                let duration = humantime::parse_duration(value)
                    .with_context(|| format!("Invalid duration for {key}: {value}"))?;
                ensure!(!duration.is_zero(), "{key} must be greater than zero");
                match field {
                    "timeout" => self.link.timeout = duration,
                    "io_timeout" => self.link.io_timeout = duration,
                    _ => bail!("Unknown link config field: {field}"),
                }
            }
            slot => {
                let config = &mut self.slots[slot_index(slot)?];
                let optional = (!value.is_empty()).then(|| value.to_string());
                match field {
                    "port" => config.port = optional,
                    "driver" => config.driver = optional,
                    "baud_rate" => {
                        config.baud_rate = value
                            .parse()
                            .with_context(|| format!("Invalid baud rate: {value}"))?
                    }
                    _ => bail!("Unknown slot config field: {field}"),
                }
            }
        }

        Ok(())
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    let parts: Vec<&str> = key.split('.').collect();
    ensure!(
        parts.len() == 2,
        "Invalid config key format. Use format: category.field (e.g., link.timeout)"
    );
    Ok((parts[0], parts[1]))
}

fn slot_index(category: &str) -> Result<usize> {
    let Some(index) = category.strip_prefix("slot") else {
        bail!("Unknown config category: {category}");
    };
    let index: usize = index
        .parse()
        .with_context(|| format!("Invalid slot in config key: {category}"))?;
    ensure!(
        index < NUMDEV,
        "Slot {index} out of range (0..{max})",
        max = NUMDEV - 1
    );
    Ok(index)
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_link_timeout() -> Duration {
    DEFAULT_LINK_TIMEOUT
}

fn default_io_timeout() -> Duration {
    DEFAULT_IO_TIMEOUT
}

/// Durations written as human readable strings ("20s", "1m 30s").
mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}

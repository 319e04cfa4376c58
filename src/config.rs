/// Configuration document model.
///
/// The document is loaded once at boot and is read-only afterwards; the
/// current location (chosen by the associated network) is the only runtime
/// selector into it.
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use serde::Deserialize;

use crate::defaults::OUTPUT_TIMEOUT_SECS;
use crate::Error;

/// location → beacon name → ordered output ids
pub type Mapping = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    /// Beacon identifier ("AA:BB:CC:DD:EE:FF") → beacon
    #[serde(default)]
    pub beacon: BTreeMap<String, BeaconConfig>,
    #[serde(default)]
    pub output: BTreeMap<String, OutputConfig>,
    /// SSID → credentials and location
    #[serde(default)]
    pub wifi: BTreeMap<String, NetworkConfig>,
    #[serde(default)]
    pub mapping: Mapping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BeaconConfig {
    pub name: String,
    #[serde(default = "enabled")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Gpio,
    Led,
    #[serde(alias = "tuya")]
    Cloud,
    /// Any type this firmware cannot drive; the entry is skipped at load
    #[serde(other)]
    Unsupported,
}

/// One output entry. Type-specific fields are optional here and checked by
/// [`OutputConfig::settings`].
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(rename = "type")]
    pub kind: OutputType,
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Idle timeout in seconds
    #[serde(default = "output_timeout")]
    pub timeout: u64,
    // gpio / led
    pub pin: Option<String>,
    // cloud
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub device_id: Option<String>,
    pub server: Option<String>,
    pub name: Option<String>,
}

/// Validated, type-specific output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSettings {
    Gpio { pin: String },
    Led { pin: String },
    Cloud(CloudSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSettings {
    pub server: String,
    pub client_id: String,
    pub client_secret: String,
    pub device_id: String,
    /// Data point code switched by commands, e.g. "switch_1"
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub password: String,
    pub location: String,
}

fn enabled() -> bool {
    true
}

fn output_timeout() -> u64 {
    OUTPUT_TIMEOUT_SECS
}

impl Configuration {
    pub fn from_json(data: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(data).map_err(|e| Error::Config(e.to_string()))
    }
}

impl OutputConfig {
    pub fn settings(&self, id: &str) -> Result<OutputSettings, Error> {
        let field = |value: &Option<String>, name: &str| {
            value
                .clone()
                .ok_or_else(|| Error::Config(alloc::format!("output `{id}` is missing `{name}`")))
        };

        Ok(match self.kind {
            OutputType::Gpio => OutputSettings::Gpio {
                pin: field(&self.pin, "pin")?,
            },
            OutputType::Led => OutputSettings::Led {
                pin: field(&self.pin, "pin")?,
            },
            OutputType::Cloud => OutputSettings::Cloud(CloudSettings {
                server: field(&self.server, "server")?
                    .trim_end_matches('/')
                    .to_string(),
                client_id: field(&self.client_id, "client_id")?,
                client_secret: field(&self.client_secret, "client_secret")?,
                device_id: field(&self.device_id, "device_id")?,
                code: field(&self.name, "name")?,
            }),
            OutputType::Unsupported => {
                return Err(Error::Config(alloc::format!("output `{id}` has an unsupported type")))
            }
        })
    }
}

// config/mod.rs
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub metrics: MetricsSettings,
    pub registry: RegistrySettings,
    pub adapters: AdapterSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    pub snapshot_path: PathBuf,
    /// Free text stored alongside the device list.
    pub notes: String,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            snapshot_path: PathBuf::from("data/devices.json"),
            notes: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdapterSettings {
    pub kasa: KasaSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KasaSettings {
    pub port: u16,
    pub timeout_ms: u64,
}

impl KasaSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for KasaSettings {
    fn default() -> Self {
        Self {
            port: crate::devices::kasa::DEFAULT_PORT,
            timeout_ms: crate::devices::kasa::DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("config/config")
    }

    pub fn from_file(name: &str) -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        settings.try_deserialize()
    }
}

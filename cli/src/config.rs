// Configuration management for the fleetlink CLI
//
// Cross-platform config stored in:
// - macOS/Linux: ~/.config/fleetlink/config.json
// - Windows: %APPDATA%\fleetlink\config.json

use anyhow::{Context, Result};
use fleetlink_core::fleet::{
    DeviceSchema, FleetSchema, MeasurementKind, PollerConfig, RetryPolicy, SensorSchema,
};
use fleetlink_core::ingest::ListenerConfig;
use fleetlink_core::relay::RelayConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
    /// The device/sensor/measurement roster, shared by the gateway's poller
    /// and the server's error walker.
    pub fleet: FleetSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Ingestion endpoint host (must match its TLS certificate)
    pub relay_host: String,
    pub relay_port: u16,

    /// Extra root certificate for self-signed endpoints
    pub root_ca: Option<PathBuf>,

    /// Offline cache file; defaults to the platform data directory
    pub cache_path: Option<PathBuf>,

    /// Seconds between poll cycles
    pub poll_interval_secs: u64,

    /// BLE scan window per cycle
    pub scan_window_secs: u64,

    /// Connection retries per device per cycle
    pub connect_attempts: u32,
    pub connect_timeout_secs: u64,
    pub connect_backoff_ms: u64,

    /// Timeout for the framed measurement response
    pub request_timeout_secs: u64,

    /// Relay connect/handshake/frame timeout
    pub send_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// TLS certificate chain and private key (PEM)
    pub cert_path: PathBuf,
    pub key_path: PathBuf,

    /// Per-connection read timeout
    pub read_timeout_secs: u64,

    /// Minutes between digest notifications
    pub digest_interval_mins: u64,

    /// Minutes of silence before the relay-silent notification
    pub silence_window_mins: u64,

    /// Battery voltage at or below this is a low-battery warning
    pub low_voltage_threshold: f64,

    /// Measurement store endpoint; batches are logged locally when unset
    pub store_url: Option<String>,
    /// Verbatim Authorization header for the store endpoint
    pub store_auth_header: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            relay_host: "localhost".to_string(),
            relay_port: 8443,
            root_ca: None,
            cache_path: None,
            poll_interval_secs: 10,
            scan_window_secs: 5,
            connect_attempts: 5,
            connect_timeout_secs: 10,
            connect_backoff_ms: 500,
            request_timeout_secs: 4,
            send_timeout_secs: 5,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8443".to_string(),
            cert_path: PathBuf::from("certificate.crt"),
            key_path: PathBuf::from("certificate.key"),
            read_timeout_secs: 5,
            digest_interval_mins: 60,
            silence_window_mins: 10,
            low_voltage_threshold: 3.5,
            store_url: None,
            store_auth_header: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            server: ServerConfig::default(),
            fleet: classroom_fleet(),
        }
    }
}

/// The reference deployment: three classroom nodes with CO2/humidity/
/// temperature, light, battery, and (node 3) window contact sensors.
fn classroom_fleet() -> FleetSchema {
    fn sensor(measurements: &[(&str, MeasurementKind)]) -> SensorSchema {
        SensorSchema {
            measurements: measurements
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
        }
    }

    let base_sensors = || -> BTreeMap<String, SensorSchema> {
        let mut sensors = BTreeMap::new();
        sensors.insert(
            "scd_30_sensor".to_string(),
            sensor(&[
                ("SCD_30_CO2", MeasurementKind::Float),
                ("SCD_30_HUM", MeasurementKind::Float),
                ("SCD_30_TEMP", MeasurementKind::Float),
            ]),
        );
        sensors.insert(
            "light_sensor".to_string(),
            sensor(&[("LS_lightStrength", MeasurementKind::Float)]),
        );
        sensors.insert(
            "battery_voltage".to_string(),
            sensor(&[("bat_voltage", MeasurementKind::BatteryVoltage)]),
        );
        sensors
    };

    let mut devices = BTreeMap::new();
    devices.insert(
        "Device1".to_string(),
        DeviceSchema {
            sensors: base_sensors(),
        },
    );
    devices.insert(
        "Device2".to_string(),
        DeviceSchema {
            sensors: base_sensors(),
        },
    );

    let mut third = base_sensors();
    third.insert(
        "magnetic_sensors".to_string(),
        sensor(&[
            ("MS_S1", MeasurementKind::Bool),
            ("MS_S2", MeasurementKind::Bool),
            ("MS_S3", MeasurementKind::Bool),
            ("MS_S4", MeasurementKind::Bool),
            ("MS_S5", MeasurementKind::Bool),
        ]),
    );
    devices.insert("Device3".to_string(), DeviceSchema { sensors: third });

    FleetSchema { devices }
}

impl GatewayConfig {
    pub fn poller_config(&self) -> PollerConfig {
        PollerConfig {
            scan_window: Duration::from_secs(self.scan_window_secs),
            retry: RetryPolicy {
                max_attempts: self.connect_attempts,
                attempt_timeout: Duration::from_secs(self.connect_timeout_secs),
                backoff: Duration::from_millis(self.connect_backoff_ms),
            },
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            host: self.relay_host.clone(),
            port: self.relay_port,
            timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }

    pub fn resolve_cache_path(&self) -> Result<PathBuf> {
        match &self.cache_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::data_dir()?.join("cache.log")),
        }
    }
}

impl ServerConfig {
    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            bind_addr: self.bind_addr.clone(),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    pub fn digest_interval(&self) -> Duration {
        Duration::from_secs(self.digest_interval_mins * 60)
    }

    pub fn silence_window(&self) -> Duration {
        Duration::from_secs(self.silence_window_mins * 60)
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("fleetlink");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the data directory path (cross-platform)
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to determine data directory")?
            .join("fleetlink");

        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        Ok(data_dir)
    }

    pub fn default_config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the given file (or the default location), creating a
    /// default config file if none exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_file()?,
        };

        if config_file.exists() {
            let contents = std::fs::read_to_string(&config_file)
                .with_context(|| format!("Failed to read {}", config_file.display()))?;
            let config: Config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse {}", config_file.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_file)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let contents = serde_json::to_string_pretty(self).context("Failed to encode config")?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}

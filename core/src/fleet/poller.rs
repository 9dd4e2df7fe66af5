// Fleet poller — one measurement batch per poll cycle
//
// Cycle: Idle → Scanning → Connecting(device) → Requesting → Disconnecting,
// sequentially per device because the radio link is a single shared medium.
// Devices that never answer are recorded as unreachable; the batch always
// carries one entry per configured device.

use super::radio::{Advertisement, DeviceLink, Radio, RadioError};
use super::schema::{DeviceSchema, FleetSchema};
use crate::reading::{self, CodecError, DeviceReading, MeasurementBatch, SensorReading};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Request token a device answers with its measurement document.
pub const MEASURE_REQUEST: &str = "measure_request";

/// Bounded retry policy for device connections.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_timeout: Duration::from_secs(10),
            backoff: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// How long one broadcast scan runs.
    pub scan_window: Duration,
    /// Connection retry policy per device.
    pub retry: RetryPolicy,
    /// Timeout for the framed measurement response.
    pub request_timeout: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            scan_window: Duration::from_secs(5),
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(4),
        }
    }
}

/// Poll cycle state, for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollPhase {
    Idle,
    Scanning,
    Connecting,
    Requesting,
    Disconnecting,
}

#[derive(Debug, Error)]
pub enum PollError {
    /// The radio stack faulted during the scan; the stack was restarted and
    /// the cycle abandoned. The owning loop retries on its next pass.
    #[error("radio fault during scan: {0}")]
    RadioFault(RadioError),
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Radio(#[from] RadioError),
    #[error("malformed measurement document: {0}")]
    Malformed(#[from] CodecError),
}

pub struct FleetPoller {
    radio: Box<dyn Radio>,
    schema: FleetSchema,
    config: PollerConfig,
}

impl FleetPoller {
    pub fn new(radio: Box<dyn Radio>, schema: FleetSchema, config: PollerConfig) -> Self {
        Self {
            radio,
            schema,
            config,
        }
    }

    /// Run one poll cycle and produce the batch for it.
    ///
    /// The batch is timestamped at scan start regardless of how many devices
    /// actually answered.
    pub async fn poll_cycle(&self) -> Result<MeasurementBatch, PollError> {
        let collected_at = chrono::Local::now().naive_local();

        debug!(phase = ?PollPhase::Scanning, "starting poll cycle");
        let adverts = match self.radio.scan(self.config.scan_window).await {
            Ok(adverts) => adverts,
            Err(fault) => {
                warn!("scan failed, restarting radio stack: {fault}");
                if let Err(e) = self.radio.restart().await {
                    warn!("radio stack restart failed: {e}");
                }
                return Err(PollError::RadioFault(fault));
            }
        };

        let discovered = self.roster_matches(adverts);

        let mut devices = BTreeMap::new();
        for (device_id, device_schema) in &self.schema.devices {
            let reading = match discovered.get(device_id) {
                Some(advert) => self.query_device(device_id, advert, device_schema).await,
                None => {
                    debug!(device = %device_id, "never discovered during scan");
                    DeviceReading::Unreachable
                }
            };
            devices.insert(device_id.clone(), reading);
        }

        Ok(MeasurementBatch {
            collected_at,
            devices,
        })
    }

    /// Deduplicate advertisements by address and keep roster names only.
    fn roster_matches(&self, adverts: Vec<Advertisement>) -> BTreeMap<String, Advertisement> {
        let mut seen_addresses = HashSet::new();
        let mut matches: BTreeMap<String, Advertisement> = BTreeMap::new();

        for advert in adverts {
            if !seen_addresses.insert(advert.address.clone()) {
                continue;
            }
            if advert.name.is_empty() || !self.schema.contains_device(&advert.name) {
                continue;
            }
            debug!(device = %advert.name, address = %advert.address, "device discovered");
            matches.entry(advert.name.clone()).or_insert(advert);
        }

        matches
    }

    /// Query one device with bounded retries; exhaustion yields Unreachable.
    async fn query_device(
        &self,
        device_id: &str,
        advert: &Advertisement,
        device_schema: &DeviceSchema,
    ) -> DeviceReading {
        let policy = &self.config.retry;

        for attempt in 1..=policy.max_attempts {
            match self.attempt_query(advert).await {
                Ok(reading) => {
                    self.warn_unknown_names(device_id, device_schema, &reading);
                    return reading;
                }
                Err(e) => {
                    warn!(
                        device = %device_id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        "measurement request failed: {e}"
                    );
                    if attempt < policy.max_attempts && !policy.backoff.is_zero() {
                        sleep(policy.backoff).await;
                    }
                }
            }
        }

        DeviceReading::Unreachable
    }

    /// One connection attempt: connect, verify the streaming channel, request
    /// the measurement document, and always disconnect afterwards.
    async fn attempt_query(&self, advert: &Advertisement) -> Result<DeviceReading, AttemptError> {
        debug!(phase = ?PollPhase::Connecting, device = %advert.name);
        let mut link = timeout(self.config.retry.attempt_timeout, self.radio.connect(advert))
            .await
            .map_err(|_| RadioError::Timeout)??;

        if !link.has_stream_channel() {
            link.disconnect().await;
            return Err(RadioError::StreamChannelMissing.into());
        }

        debug!(phase = ?PollPhase::Requesting, device = %advert.name);
        let response = link
            .request(MEASURE_REQUEST, self.config.request_timeout)
            .await;

        // The link is released whether or not the device answered, so the
        // shared radio medium is free for the next device.
        debug!(phase = ?PollPhase::Disconnecting, device = %advert.name);
        link.disconnect().await;

        Ok(reading::decode_device_reading(&response?)?)
    }

    fn warn_unknown_names(
        &self,
        device_id: &str,
        device_schema: &DeviceSchema,
        reading: &DeviceReading,
    ) {
        let DeviceReading::Sensors(sensors) = reading else {
            return;
        };
        for (sensor_id, sensor_reading) in sensors {
            let Some(sensor_schema) = device_schema.sensors.get(sensor_id) else {
                warn!(device = %device_id, sensor = %sensor_id, "unknown sensor in response");
                continue;
            };
            if let SensorReading::Measurements(values) = sensor_reading {
                for name in values.keys() {
                    if !sensor_schema.measurements.contains_key(name) {
                        warn!(
                            device = %device_id,
                            sensor = %sensor_id,
                            measurement = %name,
                            "unknown measurement in response"
                        );
                    }
                }
            }
        }
    }
}

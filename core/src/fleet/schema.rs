// Fleet schema — the device/sensor/measurement roster as data
//
// Both the poller (which devices to look for) and the error walker (which
// measurements are battery voltages) consume the same declarative mapping, so
// the set of known names lives in configuration instead of branching logic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What a measurement slot is expected to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    Float,
    Bool,
    /// A float carrying the device's battery voltage; the error walker checks
    /// these against the low-voltage threshold.
    BatteryVoltage,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorSchema {
    pub measurements: BTreeMap<String, MeasurementKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceSchema {
    pub sensors: BTreeMap<String, SensorSchema>,
}

/// The configured fleet: device id → enabled sensors → measurement kinds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSchema {
    pub devices: BTreeMap<String, DeviceSchema>,
}

impl FleetSchema {
    /// Advertised names the poller keeps during a scan.
    pub fn device_names(&self) -> impl Iterator<Item = &str> {
        self.devices.keys().map(String::as_str)
    }

    pub fn contains_device(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    /// Kind of a known measurement, `None` for names outside the schema.
    pub fn measurement_kind(
        &self,
        device_id: &str,
        sensor_id: &str,
        measurement: &str,
    ) -> Option<MeasurementKind> {
        self.devices
            .get(device_id)?
            .sensors
            .get(sensor_id)?
            .measurements
            .get(measurement)
            .copied()
    }

    pub fn sensor(&self, device_id: &str, sensor_id: &str) -> Option<&SensorSchema> {
        self.devices.get(device_id)?.sensors.get(sensor_id)
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// Measurement model — sentinel-aware reading tree
//
// Every level of the tree (device, sensor, measurement) shares its slot with
// an error sentinel on the wire. The sentinels are plain strings in the JSON
// documents; in memory they are explicit enum variants so a consumer can never
// mistake an error marker for data.

use chrono::NaiveDateTime;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Device-level sentinel: the gateway could not reach this device over BLE.
pub const BLE_ERROR: &str = "BLE_error";

/// Sensor-level sentinel: the device could not talk to this sensor.
pub const PHYSICAL_CONNECTION_ERROR: &str = "physical_connection_error";

/// Measurement-level sentinel: the sensor was reachable but the read failed.
pub const READ_FAILED: &str = "read_failed";

/// Prefix of the low-battery warning text embedded in error traces.
/// Full form: `Battery_Low_Voltage only <value>V`.
pub const BATTERY_LOW_VOLTAGE: &str = "Battery_Low_Voltage";

/// Wire timestamp format for batch documents.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M:%S";

/// All device readings collected during one poll cycle.
///
/// Immutable once created. The map always holds one entry per configured
/// device — devices that never answered are present as
/// [`DeviceReading::Unreachable`], never as a missing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    /// Collection timestamp, taken at scan start for the whole cycle.
    #[serde(rename = "timeStamp", with = "ts_format")]
    pub collected_at: NaiveDateTime,
    /// Readings keyed by device id.
    #[serde(rename = "data")]
    pub devices: BTreeMap<String, DeviceReading>,
}

impl MeasurementBatch {
    pub fn new(collected_at: NaiveDateTime) -> Self {
        Self {
            collected_at,
            devices: BTreeMap::new(),
        }
    }
}

/// One device's contribution to a batch: either the BLE sentinel or a map of
/// sensor readings.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceReading {
    /// The device never advertised or exhausted its connection retries.
    Unreachable,
    /// Readings keyed by sensor id.
    Sensors(BTreeMap<String, SensorReading>),
}

/// One sensor's contribution: either the physical-connection sentinel or a
/// map of named measurement values.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorReading {
    /// The device could not communicate with this sensor.
    Disconnected,
    /// Measurement values keyed by measurement name.
    Measurements(BTreeMap<String, MeasurementValue>),
}

/// A single measurement slot: the read-failure sentinel or a typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementValue {
    /// The sensor answered but this particular read failed.
    ReadFailure,
    Float(f64),
    Bool(bool),
}

impl Serialize for DeviceReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DeviceReading::Unreachable => serializer.serialize_str(BLE_ERROR),
            DeviceReading::Sensors(sensors) => sensors.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for DeviceReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Sentinel(String),
            Sensors(BTreeMap<String, SensorReading>),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Sentinel(s) if s == BLE_ERROR => Ok(DeviceReading::Unreachable),
            Wire::Sentinel(other) => Err(D::Error::custom(format!(
                "unknown device sentinel: {other:?}"
            ))),
            Wire::Sensors(sensors) => Ok(DeviceReading::Sensors(sensors)),
        }
    }
}

impl Serialize for SensorReading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SensorReading::Disconnected => serializer.serialize_str(PHYSICAL_CONNECTION_ERROR),
            SensorReading::Measurements(values) => values.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for SensorReading {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Sentinel(String),
            Measurements(BTreeMap<String, MeasurementValue>),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Sentinel(s) if s == PHYSICAL_CONNECTION_ERROR => Ok(SensorReading::Disconnected),
            Wire::Sentinel(other) => Err(D::Error::custom(format!(
                "unknown sensor sentinel: {other:?}"
            ))),
            Wire::Measurements(values) => Ok(SensorReading::Measurements(values)),
        }
    }
}

impl Serialize for MeasurementValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MeasurementValue::ReadFailure => serializer.serialize_str(READ_FAILED),
            MeasurementValue::Float(v) => serializer.serialize_f64(*v),
            MeasurementValue::Bool(v) => serializer.serialize_bool(*v),
        }
    }
}

impl<'de> Deserialize<'de> for MeasurementValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Sentinel(String),
            Bool(bool),
            Float(f64),
        }

        match Wire::deserialize(deserializer)? {
            Wire::Sentinel(s) if s == READ_FAILED => Ok(MeasurementValue::ReadFailure),
            Wire::Sentinel(other) => Err(D::Error::custom(format!(
                "unknown measurement sentinel: {other:?}"
            ))),
            Wire::Bool(v) => Ok(MeasurementValue::Bool(v)),
            Wire::Float(v) => Ok(MeasurementValue::Float(v)),
        }
    }
}

pub(crate) mod ts_format {
    use super::TIMESTAMP_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(TIMESTAMP_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 3, 14)
            .unwrap()
            .and_hms_opt(9, 26, 53)
            .unwrap()
    }

    #[test]
    fn test_batch_serializes_wire_field_names() {
        let mut batch = MeasurementBatch::new(ts());
        batch
            .devices
            .insert("Device1".into(), DeviceReading::Unreachable);

        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(
            json,
            r#"{"timeStamp":"14/03/2023 09:26:53","data":{"Device1":"BLE_error"}}"#
        );
    }

    #[test]
    fn test_sentinels_roundtrip_at_every_level() {
        let mut measurements = BTreeMap::new();
        measurements.insert("SCD_30_CO2".to_string(), MeasurementValue::Float(412.5));
        measurements.insert("SCD_30_TEMP".to_string(), MeasurementValue::ReadFailure);

        let mut sensors = BTreeMap::new();
        sensors.insert(
            "scd_30_sensor".to_string(),
            SensorReading::Measurements(measurements),
        );
        sensors.insert("light_sensor".to_string(), SensorReading::Disconnected);

        let mut batch = MeasurementBatch::new(ts());
        batch
            .devices
            .insert("Device1".into(), DeviceReading::Sensors(sensors));
        batch
            .devices
            .insert("Device2".into(), DeviceReading::Unreachable);

        let json = serde_json::to_string(&batch).unwrap();
        let restored: MeasurementBatch = serde_json::from_str(&json).unwrap();
        assert_eq!(batch, restored);
    }

    #[test]
    fn test_bool_measurements_survive() {
        let json = r#"{"MS_S1":true,"MS_S2":false}"#;
        let values: BTreeMap<String, MeasurementValue> = serde_json::from_str(json).unwrap();
        assert_eq!(values["MS_S1"], MeasurementValue::Bool(true));
        assert_eq!(values["MS_S2"], MeasurementValue::Bool(false));
    }

    #[test]
    fn test_unknown_sentinel_is_rejected() {
        let result: Result<MeasurementValue, _> = serde_json::from_str(r#""totally_fine""#);
        assert!(result.is_err());

        let result: Result<DeviceReading, _> = serde_json::from_str(r#""read_failed""#);
        assert!(result.is_err(), "device slot must not accept other sentinels");
    }

    #[test]
    fn test_timestamp_format_is_day_first() {
        let batch = MeasurementBatch::new(ts());
        let json = serde_json::to_string(&batch).unwrap();
        assert!(json.contains("14/03/2023 09:26:53"));

        let bad = r#"{"timeStamp":"2023-03-14T09:26:53","data":{}}"#;
        assert!(serde_json::from_str::<MeasurementBatch>(bad).is_err());
    }
}

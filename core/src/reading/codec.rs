// Batch document codec — JSON encoding with the `;`-joined payload layout
//
// Batch documents must not contain the payload separator or the frame
// terminator; schema-controlled device/sensor/measurement names keep both out
// of the serialized form (sender invariant, not re-checked here).

use super::types::{DeviceReading, MeasurementBatch};
use thiserror::Error;

/// Separator between batch documents inside one protocol payload.
pub const BATCH_SEPARATOR: char = ';';

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed batch document: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize one batch to a single-line JSON document.
pub fn encode_batch(batch: &MeasurementBatch) -> Result<String, CodecError> {
    Ok(serde_json::to_string(batch)?)
}

/// Parse one batch document.
pub fn decode_batch(raw: &str) -> Result<MeasurementBatch, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

/// Parse a device's measurement response document.
pub fn decode_device_reading(raw: &str) -> Result<DeviceReading, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

/// Join batches into one protocol payload.
pub fn encode_payload(batches: &[MeasurementBatch]) -> Result<String, CodecError> {
    let docs = batches
        .iter()
        .map(encode_batch)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs.join(&BATCH_SEPARATOR.to_string()))
}

/// Split and parse a protocol payload, all-or-nothing.
///
/// One malformed document rejects the whole payload — the ingestion side
/// accepts or discards a submission as a unit.
pub fn decode_payload(payload: &str) -> Result<Vec<MeasurementBatch>, CodecError> {
    payload
        .split(BATCH_SEPARATOR)
        .map(decode_batch)
        .collect::<Result<Vec<_>, _>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::types::{MeasurementValue, SensorReading};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn batch(day: u32) -> MeasurementBatch {
        let mut measurements = BTreeMap::new();
        measurements.insert("bat_voltage".to_string(), MeasurementValue::Float(3.7));
        let mut sensors = BTreeMap::new();
        sensors.insert(
            "battery_voltage".to_string(),
            SensorReading::Measurements(measurements),
        );

        let mut batch = MeasurementBatch::new(
            NaiveDate::from_ymd_opt(2023, 5, day)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
        );
        batch
            .devices
            .insert("Device1".into(), DeviceReading::Sensors(sensors));
        batch
    }

    #[test]
    fn test_payload_roundtrip_preserves_entries() {
        let batches = vec![batch(1), batch(2), batch(3)];
        let payload = encode_payload(&batches).unwrap();
        assert_eq!(payload.matches(BATCH_SEPARATOR).count(), 2);

        let restored = decode_payload(&payload).unwrap();
        assert_eq!(batches, restored);
    }

    #[test]
    fn test_encoded_batch_is_single_line() {
        let doc = encode_batch(&batch(1)).unwrap();
        assert!(!doc.contains('\n'));
        assert!(!doc.contains(BATCH_SEPARATOR));
    }

    #[test]
    fn test_payload_decode_is_all_or_nothing() {
        let good = encode_batch(&batch(1)).unwrap();
        let payload = format!("{good};not json at all");
        assert!(decode_payload(&payload).is_err());
    }

    #[test]
    fn test_device_reading_document() {
        let reading = decode_device_reading(r#"{"light_sensor":"physical_connection_error"}"#)
            .unwrap();
        match reading {
            DeviceReading::Sensors(sensors) => {
                assert_eq!(sensors["light_sensor"], SensorReading::Disconnected)
            }
            other => panic!("unexpected reading: {other:?}"),
        }
    }
}

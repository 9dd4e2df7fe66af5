// Reading module — measurement data model and batch document codec

pub mod codec;
pub mod types;

pub use codec::{
    decode_batch, decode_device_reading, decode_payload, encode_batch, encode_payload,
    CodecError, BATCH_SEPARATOR,
};
pub use types::{
    DeviceReading, MeasurementBatch, MeasurementValue, SensorReading, BATTERY_LOW_VOLTAGE,
    BLE_ERROR, PHYSICAL_CONNECTION_ERROR, READ_FAILED, TIMESTAMP_FORMAT,
};

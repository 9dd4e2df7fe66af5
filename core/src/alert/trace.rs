// Error walker — extracts the error trace of one batch
//
// Walks devices → sensors → measurements and records every sentinel verbatim
// against the batch timestamp, plus low-battery warnings for measurements the
// schema marks as battery voltages. One merged trace per batch; batches
// without findings produce none.

use crate::fleet::{FleetSchema, MeasurementKind};
use crate::reading::{
    DeviceReading, MeasurementBatch, MeasurementValue, SensorReading, BATTERY_LOW_VOLTAGE,
    BLE_ERROR, PHYSICAL_CONNECTION_ERROR, READ_FAILED, TIMESTAMP_FORMAT,
};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementFault {
    ReadFailure,
    /// Battery at or below the configured threshold; carries the actual
    /// voltage for the digest text.
    LowBattery(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorTrace {
    Disconnected,
    Measurements(BTreeMap<String, MeasurementFault>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceTrace {
    Unreachable,
    Sensors(BTreeMap<String, SensorTrace>),
}

/// All findings of one batch, keyed by device.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorTrace {
    pub collected_at: NaiveDateTime,
    pub devices: BTreeMap<String, DeviceTrace>,
}

/// Walk one batch; `None` when it contains no findings.
pub fn trace_batch(
    batch: &MeasurementBatch,
    schema: &FleetSchema,
    low_voltage_threshold: f64,
) -> Option<ErrorTrace> {
    let mut devices = BTreeMap::new();

    for (device_id, device_reading) in &batch.devices {
        let sensors = match device_reading {
            DeviceReading::Unreachable => {
                devices.insert(device_id.clone(), DeviceTrace::Unreachable);
                continue;
            }
            DeviceReading::Sensors(sensors) => sensors,
        };

        let mut sensor_traces = BTreeMap::new();
        for (sensor_id, sensor_reading) in sensors {
            let values = match sensor_reading {
                SensorReading::Disconnected => {
                    sensor_traces.insert(sensor_id.clone(), SensorTrace::Disconnected);
                    continue;
                }
                SensorReading::Measurements(values) => values,
            };

            let mut faults = BTreeMap::new();
            for (name, value) in values {
                match value {
                    MeasurementValue::ReadFailure => {
                        faults.insert(name.clone(), MeasurementFault::ReadFailure);
                    }
                    MeasurementValue::Float(voltage) => {
                        match schema.measurement_kind(device_id, sensor_id, name) {
                            Some(MeasurementKind::BatteryVoltage)
                                if *voltage <= low_voltage_threshold =>
                            {
                                faults.insert(name.clone(), MeasurementFault::LowBattery(*voltage));
                            }
                            Some(_) => {}
                            None => {
                                warn!(
                                    device = %device_id,
                                    sensor = %sensor_id,
                                    measurement = %name,
                                    "measurement not in schema, skipped by error walk"
                                );
                            }
                        }
                    }
                    MeasurementValue::Bool(_) => {}
                }
            }
            if !faults.is_empty() {
                sensor_traces.insert(sensor_id.clone(), SensorTrace::Measurements(faults));
            }
        }

        if !sensor_traces.is_empty() {
            devices.insert(device_id.clone(), DeviceTrace::Sensors(sensor_traces));
        }
    }

    if devices.is_empty() {
        return None;
    }

    Some(ErrorTrace {
        collected_at: batch.collected_at,
        devices,
    })
}

impl fmt::Display for MeasurementFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementFault::ReadFailure => f.write_str(READ_FAILED),
            MeasurementFault::LowBattery(voltage) => {
                write!(f, "{BATTERY_LOW_VOLTAGE} only {voltage}V")
            }
        }
    }
}

impl fmt::Display for ErrorTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Timestamp: {}",
            self.collected_at.format(TIMESTAMP_FORMAT)
        )?;
        for (device_id, device_trace) in &self.devices {
            match device_trace {
                DeviceTrace::Unreachable => writeln!(f, "{device_id}: {BLE_ERROR}")?,
                DeviceTrace::Sensors(sensors) => {
                    writeln!(f, "{device_id}:")?;
                    for (sensor_id, sensor_trace) in sensors {
                        match sensor_trace {
                            SensorTrace::Disconnected => {
                                writeln!(f, "  {sensor_id}: {PHYSICAL_CONNECTION_ERROR}")?
                            }
                            SensorTrace::Measurements(faults) => {
                                writeln!(f, "  {sensor_id}:")?;
                                for (name, fault) in faults {
                                    writeln!(f, "    {name}: {fault}")?;
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

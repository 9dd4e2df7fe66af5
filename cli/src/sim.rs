// Simulated radio backend — a deterministic in-process fleet
//
// Lets the whole gateway→server path run on machines without BLE hardware:
// every configured device "advertises" each cycle and answers the request
// token with a plausible measurement document derived from the schema. The
// battery voltage sweeps below the default low-voltage threshold every few
// cycles so the alerting path gets exercised too.

use async_trait::async_trait;
use fleetlink_core::fleet::{
    Advertisement, DeviceLink, FleetSchema, MeasurementKind, Radio, RadioError,
};
use fleetlink_core::reading::{DeviceReading, MeasurementValue, SensorReading};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct SimRadio {
    schema: FleetSchema,
    cycle: AtomicU64,
}

impl SimRadio {
    pub fn new(schema: FleetSchema) -> Self {
        Self {
            schema,
            cycle: AtomicU64::new(0),
        }
    }

    fn document_for(&self, device_id: &str, cycle: u64) -> Option<String> {
        let device = self.schema.devices.get(device_id)?;
        let salt = device_id.bytes().map(u64::from).sum::<u64>();

        let mut sensors = BTreeMap::new();
        for (sensor_id, sensor_schema) in &device.sensors {
            let mut values = BTreeMap::new();
            for (name, kind) in &sensor_schema.measurements {
                let jitter = (cycle + salt + name.len() as u64) % 100;
                let value = match kind {
                    MeasurementKind::Float => {
                        MeasurementValue::Float(20.0 + jitter as f64 * 0.25)
                    }
                    MeasurementKind::Bool => MeasurementValue::Bool(jitter % 2 == 0),
                    MeasurementKind::BatteryVoltage => {
                        MeasurementValue::Float(4.1 - ((cycle + salt) % 16) as f64 * 0.05)
                    }
                };
                values.insert(name.clone(), value);
            }
            sensors.insert(sensor_id.clone(), SensorReading::Measurements(values));
        }

        serde_json::to_string(&DeviceReading::Sensors(sensors)).ok()
    }
}

#[async_trait]
impl Radio for SimRadio {
    async fn scan(&self, _window: Duration) -> Result<Vec<Advertisement>, RadioError> {
        let adverts = self
            .schema
            .device_names()
            .enumerate()
            .map(|(i, name)| Advertisement::new(format!("sim:{i:02x}"), name))
            .collect();
        self.cycle.fetch_add(1, Ordering::Relaxed);
        Ok(adverts)
    }

    async fn connect(&self, advert: &Advertisement) -> Result<Box<dyn DeviceLink>, RadioError> {
        let cycle = self.cycle.load(Ordering::Relaxed);
        let document = self
            .document_for(&advert.name, cycle)
            .ok_or_else(|| RadioError::ConnectFailed(format!("unknown device {}", advert.name)))?;
        Ok(Box::new(SimLink {
            document: Some(document),
        }))
    }

    async fn restart(&self) -> Result<(), RadioError> {
        Ok(())
    }
}

struct SimLink {
    document: Option<String>,
}

#[async_trait]
impl DeviceLink for SimLink {
    fn has_stream_channel(&self) -> bool {
        true
    }

    async fn request(&mut self, _token: &str, _timeout: Duration) -> Result<String, RadioError> {
        self.document.take().ok_or(RadioError::ConnectionLost)
    }

    async fn disconnect(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetlink_core::fleet::{DeviceSchema, SensorSchema};
    use fleetlink_core::reading::decode_device_reading;

    fn schema() -> FleetSchema {
        let mut measurements = BTreeMap::new();
        measurements.insert("bat_voltage".to_string(), MeasurementKind::BatteryVoltage);
        measurements.insert("MS_S1".to_string(), MeasurementKind::Bool);
        let mut sensors = BTreeMap::new();
        sensors.insert("mixed".to_string(), SensorSchema { measurements });
        let mut devices = BTreeMap::new();
        devices.insert("Device1".to_string(), DeviceSchema { sensors });
        FleetSchema { devices }
    }

    #[tokio::test]
    async fn test_sim_documents_parse_as_device_readings() {
        let radio = SimRadio::new(schema());
        let adverts = radio.scan(Duration::from_millis(1)).await.unwrap();
        assert_eq!(adverts.len(), 1);

        let mut link = radio.connect(&adverts[0]).await.unwrap();
        assert!(link.has_stream_channel());

        let raw = link
            .request("measure_request", Duration::from_secs(1))
            .await
            .unwrap();
        let reading = decode_device_reading(&raw).unwrap();
        match reading {
            DeviceReading::Sensors(sensors) => {
                assert!(sensors.contains_key("mixed"));
            }
            other => panic!("unexpected reading: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_battery_dips_below_threshold_over_cycles() {
        let radio = SimRadio::new(schema());
        let mut seen_low = false;
        for _ in 0..20 {
            let adverts = radio.scan(Duration::from_millis(1)).await.unwrap();
            let mut link = radio.connect(&adverts[0]).await.unwrap();
            let raw = link
                .request("measure_request", Duration::from_secs(1))
                .await
                .unwrap();
            if let DeviceReading::Sensors(sensors) = decode_device_reading(&raw).unwrap() {
                if let SensorReading::Measurements(values) = &sensors["mixed"] {
                    if let MeasurementValue::Float(v) = values["bat_voltage"] {
                        seen_low |= v <= 3.5;
                    }
                }
            }
        }
        assert!(seen_low, "the sweep must cross the default threshold");
    }
}

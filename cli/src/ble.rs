// btleplug radio backend — the real BLE stack behind the `Radio` trait
//
// Fleet devices expose a Nordic-UART-style streaming channel: the gateway
// writes the request token to the RX characteristic and the device streams
// its measurement document back through TX notifications, newline-terminated.

use async_trait::async_trait;
use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use fleetlink_core::fleet::{Advertisement, DeviceLink, Radio, RadioError};
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Nordic UART Service and its characteristics.
const UART_SERVICE: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);
const UART_RX: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);
const UART_TX: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

fn stack_fault(e: btleplug::Error) -> RadioError {
    RadioError::StackFault(e.to_string())
}

pub struct BtleRadio {
    adapter: Adapter,
}

impl BtleRadio {
    pub async fn new() -> Result<Self, RadioError> {
        let manager = Manager::new().await.map_err(stack_fault)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(stack_fault)?
            .into_iter()
            .next()
            .ok_or_else(|| RadioError::StackFault("no BLE adapter present".to_string()))?;
        Ok(Self { adapter })
    }

    async fn find_peripheral(&self, address: &str) -> Result<Peripheral, RadioError> {
        let peripherals = self.adapter.peripherals().await.map_err(stack_fault)?;
        for peripheral in peripherals {
            if peripheral.address().to_string() == address {
                return Ok(peripheral);
            }
        }
        Err(RadioError::ConnectFailed(format!(
            "peripheral {address} no longer known to the adapter"
        )))
    }
}

#[async_trait]
impl Radio for BtleRadio {
    async fn scan(&self, window: Duration) -> Result<Vec<Advertisement>, RadioError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(stack_fault)?;
        tokio::time::sleep(window).await;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("failed to stop BLE scan: {e}");
        }

        let mut adverts = Vec::new();
        for peripheral in self.adapter.peripherals().await.map_err(stack_fault)? {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };
            let Some(name) = properties.local_name else {
                continue;
            };
            adverts.push(Advertisement::new(peripheral.address().to_string(), &name));
        }
        Ok(adverts)
    }

    async fn connect(&self, advert: &Advertisement) -> Result<Box<dyn DeviceLink>, RadioError> {
        let peripheral = self.find_peripheral(&advert.address).await?;
        peripheral
            .connect()
            .await
            .map_err(|e| RadioError::ConnectFailed(e.to_string()))?;
        if let Err(e) = peripheral.discover_services().await {
            let _ = peripheral.disconnect().await;
            return Err(RadioError::ConnectFailed(e.to_string()));
        }

        let characteristics = peripheral.characteristics();
        let rx = characteristics
            .iter()
            .find(|c| c.uuid == UART_RX && c.service_uuid == UART_SERVICE)
            .cloned();
        let tx = characteristics
            .iter()
            .find(|c| c.uuid == UART_TX && c.service_uuid == UART_SERVICE)
            .cloned();

        debug!(device = %advert.name, stream = rx.is_some() && tx.is_some(), "connected");
        Ok(Box::new(BtleLink { peripheral, rx, tx }))
    }

    async fn restart(&self) -> Result<(), RadioError> {
        // Best effort: abort any scan in flight so the next cycle starts from
        // a known adapter state. Power-cycling the controller itself is a
        // host-OS operation outside btleplug's reach.
        let _ = self.adapter.stop_scan().await;
        Ok(())
    }
}

struct BtleLink {
    peripheral: Peripheral,
    rx: Option<Characteristic>,
    tx: Option<Characteristic>,
}

#[async_trait]
impl DeviceLink for BtleLink {
    fn has_stream_channel(&self) -> bool {
        self.rx.is_some() && self.tx.is_some()
    }

    async fn request(&mut self, token: &str, timeout: Duration) -> Result<String, RadioError> {
        let (Some(rx), Some(tx)) = (self.rx.clone(), self.tx.clone()) else {
            return Err(RadioError::StreamChannelMissing);
        };

        self.peripheral
            .subscribe(&tx)
            .await
            .map_err(|_| RadioError::ConnectionLost)?;
        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|_| RadioError::ConnectionLost)?;

        self.peripheral
            .write(&rx, format!("{token}\n").as_bytes(), WriteType::WithoutResponse)
            .await
            .map_err(|_| RadioError::ConnectionLost)?;

        let collect = async {
            let mut message = String::new();
            while let Some(notification) = notifications.next().await {
                if notification.uuid != tx.uuid {
                    continue;
                }
                message.push_str(&String::from_utf8_lossy(&notification.value));
                if let Some(end) = message.find('\n') {
                    message.truncate(end);
                    return Ok(message);
                }
            }
            Err(RadioError::ConnectionLost)
        };

        tokio::time::timeout(timeout, collect)
            .await
            .map_err(|_| RadioError::Timeout)?
    }

    async fn disconnect(&mut self) {
        if let Err(e) = self.peripheral.disconnect().await {
            debug!("disconnect failed: {e}");
        }
    }
}

// Radio abstraction — the seam between the poller and a concrete BLE stack
//
// Hardware backends (btleplug on desktops, vendor stacks on embedded hosts)
// implement these traits; the poller only ever talks through them, so the
// cycle state machine is testable without a radio.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RadioError {
    /// The scan/connect stack itself failed; the poller restarts the stack
    /// and abandons the cycle.
    #[error("radio stack fault: {0}")]
    StackFault(String),
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    /// The device does not expose the streaming-data channel the request
    /// protocol needs. Counted as a failed connection attempt.
    #[error("streaming channel not available")]
    StreamChannelMissing,
    #[error("timed out")]
    Timeout,
    #[error("connection lost")]
    ConnectionLost,
}

/// A discovered advertisement: radio address plus the advertised name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: String,
}

impl Advertisement {
    /// Some firmwares pad advertised names with trailing NULs; strip them so
    /// roster matching works on the human name.
    pub fn new(address: impl Into<String>, raw_name: &str) -> Self {
        Self {
            address: address.into(),
            name: raw_name.trim_end_matches('\0').to_string(),
        }
    }
}

/// An open link to one device.
#[async_trait]
pub trait DeviceLink: Send {
    /// Whether the link exposes the streaming-data channel.
    fn has_stream_channel(&self) -> bool;

    /// Send the request token and read one newline-terminated response.
    ///
    /// The returned string excludes the terminator. Absence of data for the
    /// full timeout is [`RadioError::Timeout`]; premature disconnection is
    /// [`RadioError::ConnectionLost`].
    async fn request(&mut self, token: &str, timeout: Duration) -> Result<String, RadioError>;

    /// Release the radio link. Runs after every read attempt, success or not.
    async fn disconnect(&mut self);
}

/// A short-range radio able to scan for and connect to fleet devices.
#[async_trait]
pub trait Radio: Send + Sync {
    /// Broadcast-scan for advertisements for the given window.
    async fn scan(&self, window: Duration) -> Result<Vec<Advertisement>, RadioError>;

    /// Connect to a previously discovered device.
    async fn connect(&self, advert: &Advertisement) -> Result<Box<dyn DeviceLink>, RadioError>;

    /// Restart the radio stack after a [`RadioError::StackFault`].
    async fn restart(&self) -> Result<(), RadioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advertisement_strips_trailing_nuls() {
        let advert = Advertisement::new("aa:bb:cc", "Device1\0\0");
        assert_eq!(advert.name, "Device1");
        assert_eq!(advert.address, "aa:bb:cc");
    }

    #[test]
    fn test_interior_nuls_are_kept() {
        let advert = Advertisement::new("aa:bb:cc", "Dev\0ice");
        assert_eq!(advert.name, "Dev\0ice");
    }
}

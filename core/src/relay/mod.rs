// Relay module — the gateway-side uplink to the ingestion endpoint

pub mod client;

pub use client::{RelayClient, RelayConfig};

// Fleetlink Core — Store-and-Forward Telemetry Spine
//
// "Does this get a measurement from a battery-powered sensor node
//  into the datalake, even when the network was down for a week?"
//
// If the answer is no, it doesn't belong here.

pub mod alert;
pub mod fleet;
pub mod ingest;
pub mod reading;
pub mod relay;
pub mod storage;
pub mod store;
pub mod tls;
pub mod wire;

pub use alert::{Notification, Notifier, NotifyError};
pub use fleet::{Advertisement, DeviceLink, FleetPoller, FleetSchema, Radio, RadioError};
pub use ingest::{IngestListener, ListenerConfig};
pub use reading::{DeviceReading, MeasurementBatch, MeasurementValue, SensorReading};
pub use relay::{RelayClient, RelayConfig};
pub use storage::{MeasurementStore, StoreDispatcher, StoreError};
pub use store::{Inbox, OfflineCache};

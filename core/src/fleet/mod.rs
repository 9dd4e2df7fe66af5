// Fleet module — device roster schema, radio abstraction, and the poller

pub mod poller;
pub mod radio;
pub mod schema;

pub use poller::{FleetPoller, PollError, PollPhase, PollerConfig, RetryPolicy, MEASURE_REQUEST};
pub use radio::{Advertisement, DeviceLink, Radio, RadioError};
pub use schema::{DeviceSchema, FleetSchema, MeasurementKind, SensorSchema};

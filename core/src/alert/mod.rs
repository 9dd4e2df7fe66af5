// Alert module — error aggregation, digest notifications, silence watchdog

pub mod digest;
pub mod notify;
pub mod trace;
pub mod watchdog;

pub use digest::{digest_notification, DigestAccumulator, ALL_OK_SUBJECT, DIGEST_SUBJECT};
pub use notify::{Notification, Notifier, NotifyError};
pub use trace::{trace_batch, DeviceTrace, ErrorTrace, MeasurementFault, SensorTrace};
pub use watchdog::{
    watchdog_notification, SilenceWatchdog, WatchdogEvent, RELAY_RECONNECTED_SUBJECT,
    RELAY_SILENT_SUBJECT,
};

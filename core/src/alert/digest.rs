// Digest accumulator — collects error traces between digest flushes
//
// Owned by the single drain loop; the interval timing lives there too. A
// flush with no accumulated traces still produces a clean "all OK" digest.

use super::notify::Notification;
use super::trace::ErrorTrace;

pub const DIGEST_SUBJECT: &str = "Status report: sensor errors and warnings";
pub const ALL_OK_SUBJECT: &str = "Status report: OK";

#[derive(Default)]
pub struct DigestAccumulator {
    traces: Vec<ErrorTrace>,
}

impl DigestAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trace: ErrorTrace) {
        self.traces.push(trace);
    }

    pub fn len(&self) -> usize {
        self.traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Take everything accumulated since the last flush.
    pub fn flush(&mut self) -> Vec<ErrorTrace> {
        std::mem::take(&mut self.traces)
    }
}

/// Render one digest notification from flushed traces.
pub fn digest_notification(traces: &[ErrorTrace]) -> Notification {
    if traces.is_empty() {
        return Notification::new(
            ALL_OK_SUBJECT,
            "No errors or warnings have been recorded since the last report.",
        );
    }

    let mut body = String::from(
        "The following errors and warnings were recorded since the last report:\n\n",
    );
    for trace in traces {
        body.push_str(&trace.to_string());
        body.push('\n');
    }
    Notification::new(DIGEST_SUBJECT, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::trace::DeviceTrace;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn trace(minute: u32) -> ErrorTrace {
        let mut devices = BTreeMap::new();
        devices.insert("Device1".to_string(), DeviceTrace::Unreachable);
        ErrorTrace {
            collected_at: NaiveDate::from_ymd_opt(2023, 6, 2)
                .unwrap()
                .and_hms_opt(10, minute, 0)
                .unwrap(),
            devices,
        }
    }

    #[test]
    fn test_flush_empties_the_accumulator() {
        let mut acc = DigestAccumulator::new();
        acc.record(trace(1));
        acc.record(trace(2));
        assert_eq!(acc.len(), 2);

        let flushed = acc.flush();
        assert_eq!(flushed.len(), 2);
        assert!(acc.is_empty());
        assert!(acc.flush().is_empty());
    }

    #[test]
    fn test_digest_lists_every_trace() {
        let notification = digest_notification(&[trace(1), trace(2)]);
        assert_eq!(notification.subject, DIGEST_SUBJECT);
        assert_eq!(
            notification.body.matches("Device1: BLE_error").count(),
            2
        );
        assert!(notification.body.contains("10:01:00"));
        assert!(notification.body.contains("10:02:00"));
    }

    #[test]
    fn test_empty_flush_is_still_a_clean_report() {
        let notification = digest_notification(&[]);
        assert_eq!(notification.subject, ALL_OK_SUBJECT);
        assert!(notification.body.contains("No errors"));
    }
}

// Inbox — shared queue of accepted batches awaiting aggregation/storage
//
// Appended to by arbitrarily many listener tasks, drained by exactly one
// consumer loop at its own pace (poll-and-drain, never a blocking consume).
// FIFO and unbounded; the mutex makes the multi-producer append explicit
// rather than relying on incidental atomicity.

use crate::reading::MeasurementBatch;
use parking_lot::Mutex;
use std::collections::VecDeque;

#[derive(Default)]
pub struct Inbox {
    queue: Mutex<VecDeque<MeasurementBatch>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a whole accepted submission in one step.
    ///
    /// All batches of one connection land contiguously; the consumer never
    /// observes a partially appended submission.
    pub fn append_all(&self, batches: Vec<MeasurementBatch>) {
        if batches.is_empty() {
            return;
        }
        self.queue.lock().extend(batches);
    }

    /// Take everything currently queued, oldest first.
    pub fn drain(&self) -> Vec<MeasurementBatch> {
        self.queue.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::DeviceReading;
    use chrono::NaiveDate;

    fn batch(second: u32) -> MeasurementBatch {
        let mut batch = MeasurementBatch::new(
            NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(8, 0, second)
                .unwrap(),
        );
        batch
            .devices
            .insert("Device1".into(), DeviceReading::Unreachable);
        batch
    }

    #[test]
    fn test_fifo_across_submissions() {
        let inbox = Inbox::new();
        inbox.append_all(vec![batch(1), batch(2)]);
        inbox.append_all(vec![batch(3)]);

        assert_eq!(inbox.len(), 3);
        assert_eq!(inbox.drain(), vec![batch(1), batch(2), batch(3)]);
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_drain_on_empty_is_empty() {
        let inbox = Inbox::new();
        assert!(inbox.drain().is_empty());
    }

    #[test]
    fn test_concurrent_appends_stay_contiguous() {
        use std::sync::Arc;

        let inbox = Arc::new(Inbox::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let inbox = Arc::clone(&inbox);
            handles.push(std::thread::spawn(move || {
                inbox.append_all(vec![batch(10), batch(11)]);
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let drained = inbox.drain();
        assert_eq!(drained.len(), 16);
        // Submissions are never interleaved: pairs arrive adjacent.
        for pair in drained.chunks(2) {
            assert_eq!(pair[0], batch(10));
            assert_eq!(pair[1], batch(11));
        }
    }
}

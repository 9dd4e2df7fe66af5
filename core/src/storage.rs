// Storage dispatch — hands accepted batches to the external store
//
// The store itself (cloud database, file sink) is a collaborator behind the
// `MeasurementStore` trait. Batches that fail to store are buffered in memory
// and retried one per drain tick, before new work, so a flaky backend drains
// its backlog gradually instead of hammering it.

use crate::reading::MeasurementBatch;
use async_trait::async_trait;
use std::collections::VecDeque;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn store(&self, batch: &MeasurementBatch) -> Result<(), StoreError>;
}

#[async_trait]
impl MeasurementStore for Box<dyn MeasurementStore> {
    async fn store(&self, batch: &MeasurementBatch) -> Result<(), StoreError> {
        (**self).store(batch).await
    }
}

pub struct StoreDispatcher<S> {
    store: S,
    pending: VecDeque<MeasurementBatch>,
}

impl<S: MeasurementStore> StoreDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            pending: VecDeque::new(),
        }
    }

    /// Try to store one batch; buffer it on failure.
    pub async fn dispatch(&mut self, batch: MeasurementBatch) {
        if let Err(e) = self.store.store(&batch).await {
            self.pending.push_back(batch);
            warn!(
                buffered = self.pending.len(),
                "store failed, batch buffered for retry: {e}"
            );
        }
    }

    /// Retry a single buffered batch. Called once per drain tick.
    pub async fn retry_one(&mut self) {
        let Some(batch) = self.pending.pop_front() else {
            return;
        };
        match self.store.store(&batch).await {
            Ok(()) => debug!(
                buffered = self.pending.len(),
                "buffered batch stored on retry"
            ),
            Err(e) => {
                self.pending.push_back(batch);
                warn!(
                    buffered = self.pending.len(),
                    "retry failed, batch kept buffered: {e}"
                );
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

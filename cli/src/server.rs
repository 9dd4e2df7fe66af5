// Server loop — ingestion listener plus the drain/aggregation cycle
//
// The listener tasks only feed the inbox; everything else (storage dispatch,
// error aggregation, digest timing, the silence watchdog) runs here in the
// single drain loop, one tick per second like the reference deployment.

use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fleetlink_core::alert::{
    digest_notification, trace_batch, watchdog_notification, DigestAccumulator, Notification,
    Notifier, NotifyError, SilenceWatchdog,
};
use fleetlink_core::ingest::IngestListener;
use fleetlink_core::reading::{self, MeasurementBatch};
use fleetlink_core::storage::{MeasurementStore, StoreDispatcher, StoreError};
use fleetlink_core::store::Inbox;
use fleetlink_core::tls;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub async fn run(config: Config) -> Result<()> {
    let server = &config.server;

    // Missing TLS material aborts before anything is bound.
    let server_tls = tls::server_config(&server.cert_path, &server.key_path)
        .context("loading TLS certificate material")?;

    let inbox = Arc::new(Inbox::new());
    let listener = IngestListener::bind(server.listener_config(), server_tls, Arc::clone(&inbox))
        .await
        .with_context(|| format!("binding ingestion listener to {}", server.bind_addr))?;
    info!(addr = %listener.local_addr()?, "server started");
    tokio::spawn(listener.run());

    let notifier = LogNotifier;
    let store: Box<dyn MeasurementStore> = match &server.store_url {
        Some(url) => Box::new(HttpStore {
            url: url.clone(),
            auth_header: server.store_auth_header.clone(),
        }),
        None => Box::new(LogStore),
    };
    let mut dispatcher = StoreDispatcher::new(store);
    let mut accumulator = DigestAccumulator::new();

    let silence_window = server.silence_window();
    let digest_interval = server.digest_interval();
    let mut watchdog = SilenceWatchdog::new(silence_window, Instant::now());
    let mut last_digest = Instant::now();

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        ticker.tick().await;
        let now = Instant::now();

        dispatcher.retry_one().await;

        let batches = inbox.drain();
        if !batches.is_empty() {
            if let Some(event) = watchdog.batch_received(now) {
                send(&notifier, watchdog_notification(event, silence_window)).await;
            }
            for batch in batches {
                if let Some(trace) =
                    trace_batch(&batch, &config.fleet, server.low_voltage_threshold)
                {
                    accumulator.record(trace);
                }
                dispatcher.dispatch(batch).await;
            }
        }

        if now.duration_since(last_digest) >= digest_interval {
            last_digest = now;
            let traces = accumulator.flush();
            send(&notifier, digest_notification(&traces)).await;
        }

        if let Some(event) = watchdog.poll(now) {
            send(&notifier, watchdog_notification(event, silence_window)).await;
        }
    }
}

async fn send(notifier: &dyn Notifier, notification: Notification) {
    if let Err(e) = notifier.notify(notification).await {
        warn!("notification not delivered: {e}");
    }
}

/// Notification sink writing to the log. Mail/webhook sinks slot in behind
/// the same trait.
struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        info!(
            subject = %notification.subject,
            "notification:\n{}",
            notification.body
        );
        Ok(())
    }
}

/// Fallback store when no endpoint is configured: keep the batch in the log.
struct LogStore;

#[async_trait]
impl MeasurementStore for LogStore {
    async fn store(&self, batch: &MeasurementBatch) -> Result<(), StoreError> {
        debug!(
            collected_at = %batch.collected_at,
            devices = batch.devices.len(),
            "batch accepted (no store endpoint configured)"
        );
        Ok(())
    }
}

/// Posts each batch document to the configured HTTP endpoint.
struct HttpStore {
    url: String,
    auth_header: Option<String>,
}

#[async_trait]
impl MeasurementStore for HttpStore {
    async fn store(&self, batch: &MeasurementBatch) -> Result<(), StoreError> {
        let body =
            reading::encode_batch(batch).map_err(|e| StoreError::Backend(e.to_string()))?;
        let url = self.url.clone();
        let auth_header = self.auth_header.clone();

        // ureq blocks; keep the drain loop responsive.
        let response = tokio::task::spawn_blocking(move || {
            let mut request = ureq::post(&url).set("Content-Type", "application/json");
            if let Some(auth) = &auth_header {
                request = request.set("Authorization", auth);
            }
            request.send_string(&body)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?;

        response
            .map(|_| ())
            .map_err(|e| StoreError::Backend(e.to_string()))
    }
}

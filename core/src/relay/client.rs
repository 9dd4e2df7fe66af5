// Relay client — pushes measurement batches to the ingestion endpoint
//
// Every send carries the current batch plus everything still sitting in the
// offline cache. A confirmed reply clears the cache; any other outcome
// appends the new batch to it, which is what makes delivery at-least-once
// across outages (downstream storage tolerates the resulting duplicates).

use crate::reading::{self, CodecError, MeasurementBatch};
use crate::store::{CacheError, OfflineCache};
use crate::wire::{self, FrameError, CMD_DATA, REPLY_CONFIRMED, REPLY_FAILED};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::rustls::pki_types::{InvalidDnsNameError, ServerName};
use tokio_rustls::rustls::ClientConfig;
use tokio_rustls::TlsConnector;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Ingestion endpoint host name (must match its certificate).
    pub host: String,
    pub port: u16,
    /// Connect, handshake, and per-frame I/O timeout.
    pub timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8443,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
enum SendError {
    #[error("offline cache unavailable: {0}")]
    Cache(#[from] CacheError),
    #[error("batch serialization failed: {0}")]
    Codec(#[from] CodecError),
    #[error("connect to {0} timed out")]
    ConnectTimeout(String),
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("endpoint rejected the submission")]
    Rejected,
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(String),
}

pub struct RelayClient {
    config: RelayConfig,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    cache: Arc<OfflineCache>,
}

impl RelayClient {
    pub fn new(
        config: RelayConfig,
        tls: Arc<ClientConfig>,
        cache: Arc<OfflineCache>,
    ) -> Result<Self, InvalidDnsNameError> {
        let server_name = ServerName::try_from(config.host.clone())?;
        Ok(Self {
            config,
            server_name,
            connector: TlsConnector::from(tls),
            cache,
        })
    }

    /// Send one batch, merged with everything currently cached.
    ///
    /// Returns `true` when the endpoint confirmed the submission (the cache
    /// is cleared), `false` on any failure (the new batch was appended to the
    /// cache; previously cached entries were never cleared and stay put).
    pub async fn send_batch(&self, batch: &MeasurementBatch) -> bool {
        match self.try_send(batch).await {
            Ok(delivered) => {
                if let Err(e) = self.cache.clear().await {
                    warn!("failed to clear cache after confirmed delivery: {e}");
                }
                info!(batches = delivered, "delivery confirmed");
                true
            }
            Err(e) => {
                warn!("relay send failed: {e}");
                if let Err(e) = self.cache.append(batch).await {
                    warn!(
                        "could not cache undelivered batch, measurements lost for this attempt: {e}"
                    );
                }
                false
            }
        }
    }

    async fn try_send(&self, batch: &MeasurementBatch) -> Result<usize, SendError> {
        let mut outgoing = self.cache.read_all().await?;
        outgoing.push(batch.clone());

        let payload = reading::encode_payload(&outgoing)?;
        let frame = wire::encode_frame(CMD_DATA, &payload);

        let endpoint = format!("{}:{}", self.config.host, self.config.port);
        let tcp = timeout(self.config.timeout, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| SendError::ConnectTimeout(endpoint.clone()))??;
        let mut tls = timeout(
            self.config.timeout,
            self.connector.connect(self.server_name.clone(), tcp),
        )
        .await
        .map_err(|_| SendError::ConnectTimeout(endpoint))??;

        let result = self.exchange(&mut tls, &frame).await;
        // Teardown runs on every exit path, confirmed or not.
        let _ = tls.shutdown().await;
        result.map(|()| outgoing.len())
    }

    async fn exchange<S>(&self, stream: &mut S, frame: &str) -> Result<(), SendError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        wire::write_frame(stream, frame, self.config.timeout).await?;

        let reply = wire::read_frame(stream, self.config.timeout).await?;
        match reply.as_str() {
            REPLY_CONFIRMED => Ok(()),
            REPLY_FAILED => Err(SendError::Rejected),
            other => Err(SendError::UnexpectedReply(other.to_string())),
        }
    }
}

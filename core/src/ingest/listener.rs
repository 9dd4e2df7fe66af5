// Ingestion listener — concurrent TLS server feeding the inbox
//
// One task per accepted connection; each connection carries exactly one
// framed request and gets exactly one reply line. The inbox is the only
// state the connection tasks share.

use crate::reading::{self, MeasurementBatch};
use crate::store::Inbox;
use crate::wire::{self, CMD_DATA, REPLY_CONFIRMED, REPLY_FAILED};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub bind_addr: String,
    /// Per-connection read (and reply write) timeout.
    pub read_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8443".to_string(),
            read_timeout: Duration::from_secs(5),
        }
    }
}

pub struct IngestListener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    inbox: Arc<Inbox>,
    read_timeout: Duration,
}

impl IngestListener {
    /// Bind the listening socket. TLS material problems surface before this,
    /// when the `ServerConfig` is built.
    pub async fn bind(
        config: ListenerConfig,
        tls: Arc<ServerConfig>,
        inbox: Arc<Inbox>,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            inbox,
            read_timeout: config.read_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. Runs until the owning task is dropped.
    pub async fn run(self) {
        match self.local_addr() {
            Ok(addr) => info!(%addr, "ingestion listener started"),
            Err(_) => info!("ingestion listener started"),
        }

        loop {
            let (tcp, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };

            let acceptor = self.acceptor.clone();
            let inbox = Arc::clone(&self.inbox);
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                match acceptor.accept(tcp).await {
                    Ok(mut stream) => {
                        handle_connection(&mut stream, &inbox, read_timeout).await;
                        // Shutdown + close regardless of outcome.
                        let _ = stream.shutdown().await;
                    }
                    Err(e) => warn!(%peer, "TLS handshake failed: {e}"),
                }
                debug!(%peer, "connection closed");
            });
        }
    }
}

/// Serve one connection: read one frame, dispatch, reply.
pub(crate) async fn handle_connection<S>(stream: &mut S, inbox: &Inbox, read_timeout: Duration)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let reply = match wire::read_frame(stream, read_timeout).await {
        Ok(line) => dispatch_frame(&line, inbox),
        Err(e) => {
            warn!("failed to read request frame: {e}");
            REPLY_FAILED
        }
    };

    if let Err(e) = wire::write_line(stream, reply, read_timeout).await {
        warn!("failed to write reply: {e}");
    }
}

/// Decode one request frame and feed accepted batches to the inbox.
///
/// Submissions are all-or-nothing: one malformed document discards the whole
/// connection's payload.
fn dispatch_frame(line: &str, inbox: &Inbox) -> &'static str {
    let (command, payload) = match wire::decode_frame(line) {
        Ok(fields) => fields,
        Err(e) => {
            warn!("malformed request frame: {e}");
            return REPLY_FAILED;
        }
    };

    if command != CMD_DATA {
        warn!(command = %command, "unknown command received");
        return REPLY_FAILED;
    }

    match reading::decode_payload(payload) {
        Ok(batches) => {
            accept_batches(inbox, batches);
            REPLY_CONFIRMED
        }
        Err(e) => {
            warn!("rejected submission: {e}");
            REPLY_FAILED
        }
    }
}

fn accept_batches(inbox: &Inbox, batches: Vec<MeasurementBatch>) {
    debug!(batches = batches.len(), "submission accepted");
    inbox.append_all(batches);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{encode_batch, encode_payload, DeviceReading};
    use chrono::NaiveDate;
    use tokio::io::AsyncReadExt;

    fn batch(hour: u32) -> MeasurementBatch {
        let mut batch = MeasurementBatch::new(
            NaiveDate::from_ymd_opt(2023, 6, 2)
                .unwrap()
                .and_hms_opt(hour, 0, 0)
                .unwrap(),
        );
        batch
            .devices
            .insert("Device1".into(), DeviceReading::Unreachable);
        batch
    }

    async fn submit(request: &[u8], inbox: &Inbox) -> String {
        let (mut client, mut server) = tokio::io::duplex(4096);

        let _ = tokio::io::AsyncWriteExt::write_all(&mut client, request).await;
        // Half-close so a frame without terminator reads as a lost connection.
        let _ = tokio::io::AsyncWriteExt::shutdown(&mut client).await;
        handle_connection(&mut server, inbox, Duration::from_secs(1)).await;
        drop(server);

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        reply
    }

    #[tokio::test]
    async fn test_valid_submission_is_confirmed_and_queued() {
        let inbox = Inbox::new();
        let payload = encode_payload(&[batch(8), batch(9)]).unwrap();
        let request = wire::encode_frame(CMD_DATA, &payload);

        let reply = submit(request.as_bytes(), &inbox).await;
        assert_eq!(reply, "confirmed\n");
        assert_eq!(inbox.drain(), vec![batch(8), batch(9)]);
    }

    #[tokio::test]
    async fn test_missing_separator_fails_and_leaves_inbox_unchanged() {
        let inbox = Inbox::new();
        let reply = submit(b"just a line with no separator\n", &inbox).await;
        assert_eq!(reply, "failed\n");
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_command_fails() {
        let inbox = Inbox::new();
        let reply = submit(b"telemetry~{}\n", &inbox).await;
        assert_eq!(reply, "failed\n");
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn test_partial_garbage_discards_whole_submission() {
        let inbox = Inbox::new();
        let good = encode_batch(&batch(8)).unwrap();
        let request = format!("data~{good};{{broken\n");

        let reply = submit(request.as_bytes(), &inbox).await;
        assert_eq!(reply, "failed\n");
        assert!(inbox.is_empty(), "all-or-nothing per connection");
    }

    #[tokio::test]
    async fn test_closed_stream_without_frame_fails() {
        let inbox = Inbox::new();
        let reply = submit(b"data~no terminator", &inbox).await;
        assert_eq!(reply, "failed\n");
        assert!(inbox.is_empty());
    }
}

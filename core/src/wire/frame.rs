// Frame codec — `command~payload` lines terminated by `\n`
//
// One frame per direction per connection: the sender writes a single framed
// request, the receiver answers with a single bare reply line. Frames are
// unbounded in length except by memory; payload content must not contain the
// terminator (sender invariant, not checked by the decoder).

use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Top-level separator between command and payload.
pub const FIELD_SEPARATOR: char = '~';

/// Frame terminator.
pub const TERMINATOR: u8 = b'\n';

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("timed out waiting for frame")]
    Timeout,
    #[error("connection lost")]
    ConnectionLost,
}

/// Build a framed message: `<command>~<payload>\n`.
pub fn encode_frame(command: &str, payload: &str) -> String {
    format!("{command}{FIELD_SEPARATOR}{payload}\n")
}

/// Split a received line into `(command, payload)`.
///
/// Fails when no separator is present, or when more than one top-level
/// separator appears where exactly one is expected.
pub fn decode_frame(line: &str) -> Result<(&str, &str), FrameError> {
    let mut fields = line.splitn(3, FIELD_SEPARATOR);
    let command = fields
        .next()
        .ok_or_else(|| FrameError::Malformed("empty frame".to_string()))?;
    let payload = fields
        .next()
        .ok_or_else(|| FrameError::Malformed(format!("missing {FIELD_SEPARATOR:?} separator")))?;
    if fields.next().is_some() {
        return Err(FrameError::Malformed(format!(
            "more than one top-level {FIELD_SEPARATOR:?} separator"
        )));
    }
    Ok((command, payload))
}

/// Read one line from the stream: bytes until the terminator.
///
/// The terminator is not included in the result. The whole read is bounded by
/// `limit`; an elapsed timer is `Timeout`, end-of-stream before the terminator
/// is `ConnectionLost`.
pub async fn read_frame<S>(stream: &mut S, limit: Duration) -> Result<String, FrameError>
where
    S: AsyncRead + Unpin,
{
    let read = async {
        let mut line: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream
                .read(&mut chunk)
                .await
                .map_err(|_| FrameError::ConnectionLost)?;
            if n == 0 {
                return Err(FrameError::ConnectionLost);
            }
            if let Some(pos) = chunk[..n].iter().position(|b| *b == TERMINATOR) {
                line.extend_from_slice(&chunk[..pos]);
                return Ok(line);
            }
            line.extend_from_slice(&chunk[..n]);
        }
    };

    let line = timeout(limit, read).await.map_err(|_| FrameError::Timeout)??;
    String::from_utf8(line).map_err(|e| FrameError::Malformed(format!("invalid UTF-8: {e}")))
}

/// Write a pre-encoded frame (or bare reply line) within `limit`.
pub async fn write_frame<S>(stream: &mut S, frame: &str, limit: Duration) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    let write = async {
        stream
            .write_all(frame.as_bytes())
            .await
            .map_err(|_| FrameError::ConnectionLost)?;
        stream.flush().await.map_err(|_| FrameError::ConnectionLost)
    };
    timeout(limit, write).await.map_err(|_| FrameError::Timeout)?
}

/// Write a bare reply line (`confirmed` / `failed`) within `limit`.
pub async fn write_line<S>(stream: &mut S, line: &str, limit: Duration) -> Result<(), FrameError>
where
    S: AsyncWrite + Unpin,
{
    write_frame(stream, &format!("{line}\n"), limit).await
}

//! Upstream ingest socket
//!
//! The trading backend connects over TCP and writes one JSON message per
//! line. Lines are decoded in arrival order and forwarded to the relay one
//! at a time, so the relay sees a single ordered stream. Only one upstream
//! connection is served at a time; a second one waits in the accept queue.
//!
//! The same socket carries subscription notices the other way: whenever a
//! client subscribes, the topic name is written back as a line so the
//! backend can push a fresh value for it. Notices are written by their own
//! task; a backend that never reads them cannot stall ingest.
//!
//! Lines are framed as raw bytes. Invalid UTF-8 is a decode failure of that
//! one message, not of the connection.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead, FramedWrite, LinesCodec};
use tracing::{debug, info, warn};

use crate::broker::RelayHandle;
use crate::ingest::adapter::IngestAdapter;
use crate::utils::RelayError;

/// Fan-out of subscription notices to whichever upstream is connected.
#[derive(Debug, Clone)]
pub struct UpstreamLink {
    tx: broadcast::Sender<String>,
}

impl UpstreamLink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Queue a notice for `topic`. Dropped when no upstream is connected.
    pub fn notify(&self, topic: &str) {
        if self.tx.send(topic.to_string()).is_err() {
            debug!("No upstream connected; dropping notice for {topic}");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for UpstreamLink {
    fn default() -> Self {
        Self::new(256)
    }
}

pub async fn start_ingest_server(
    addr: String,
    relay: RelayHandle,
    adapter: &IngestAdapter,
    upstream: &UpstreamLink,
    max_frame_bytes: usize,
) -> Result<(), RelayError> {
    let listener = TcpListener::bind(&addr).await?;
    info!("Ingest listening on tcp://{addr}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Ingest accept failed: {e}");
                continue;
            }
        };
        info!("Upstream connected from {peer}");

        match serve_upstream(stream, &relay, adapter, upstream, max_frame_bytes).await {
            Ok(()) => info!("Upstream {peer} disconnected"),
            Err(RelayError::RelayClosed) => return Err(RelayError::RelayClosed),
            Err(e) => warn!("Upstream {peer} failed: {e}"),
        }
        let counts = adapter.counts();
        info!(
            "Ingest totals: {} published, {} filtered, {} malformed, {} persisted",
            counts.published, counts.filtered, counts.malformed, counts.persisted
        );
    }
}

/// Pump one upstream connection until it closes.
pub async fn serve_upstream<S>(
    stream: S,
    relay: &RelayHandle,
    adapter: &IngestAdapter,
    upstream: &UpstreamLink,
    max_frame_bytes: usize,
) -> Result<(), RelayError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let mut lines = FramedRead::new(
        read_half,
        AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), max_frame_bytes),
    );
    let notice_writer = tokio::spawn(write_notices(
        FramedWrite::new(write_half, LinesCodec::new()),
        upstream.subscribe(),
    ));

    let result = read_lines(&mut lines, relay, adapter, max_frame_bytes).await;
    notice_writer.abort();
    result
}

async fn read_lines<R>(
    lines: &mut FramedRead<R, AnyDelimiterCodec>,
    relay: &RelayHandle,
    adapter: &IngestAdapter,
    max_frame_bytes: usize,
) -> Result<(), RelayError>
where
    R: AsyncRead + Unpin,
{
    // a decode error is followed by a single `None` before the stream resumes
    let mut resuming = false;

    loop {
        match lines.next().await {
            Some(Ok(line)) => {
                resuming = false;
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                if let Some(event) = adapter.handle(&line) {
                    relay.publish(event).await?;
                }
            }
            Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => {
                // the codec skips to the next newline on its own
                adapter.record_malformed();
                resuming = true;
                warn!("Dropped ingest line longer than {max_frame_bytes} bytes");
            }
            Some(Err(AnyDelimiterCodecError::Io(e))) => return Err(e.into()),
            None if resuming => resuming = false,
            None => return Ok(()),
        }
    }
}

/// Forward subscription notices upstream until the channel closes or the
/// peer stops accepting writes.
async fn write_notices<W>(
    mut out: FramedWrite<W, LinesCodec>,
    mut notices: broadcast::Receiver<String>,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        match notices.recv().await {
            Ok(topic) => {
                if let Err(e) = out.send(topic).await {
                    warn!("Failed to send subscription notice upstream: {e}");
                    return;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Skipped {skipped} subscription notices for a slow upstream");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

//! Relay WebSocket connection and its read loop.
//!
//! A [`RelayTransport`] owns one physical connection to the relay.  Opening
//! it splits the socket into two halves:
//!
//! - the **write half** stays inside the transport and is used by the
//!   dispatch loop through the [`RelaySink`] trait;
//! - the **read half** is moved into a dedicated Tokio task by
//!   [`RelayTransport::spawn_read_loop`].
//!
//! The read loop talks to the rest of the bridge only through two channels
//! returned in [`RelayInbound`]:
//!
//! ```text
//!   relay ──► read loop ──► mpsc (capacity 10) ──► dispatch loop
//!                      └──► oneshot CloseNotice ─┘   (unexpected close only)
//! ```
//!
//! The queue is bounded: a slow dispatch loop delays the reader instead of
//! growing memory.
//!
//! # Expected vs. unexpected close
//!
//! When the session's cancellation token fires, the read loop returns its
//! stream half to whoever awaits its `JoinHandle` so [`graceful_close`] can
//! wait for the peer's close acknowledgement on it.  No notice is published.
//! Any other ending (peer close frame, I/O error, end of stream) publishes
//! exactly one [`CloseNotice`].
//!
//! [`graceful_close`]: RelayTransport::graceful_close

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use overlay_core::ActionEnvelope;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{RelaySink, SendError};
use crate::domain::CloseNotice;

/// Capacity of the inbound message queue.
pub const INBOUND_QUEUE_CAPACITY: usize = 10;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, WsMessage>;
type WsReader = SplitStream<WsStream>;

/// Errors produced by the relay transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to relay: {0}")]
    Connect(#[source] WsError),

    #[error("a read loop is already running for this connection")]
    ReadLoopActive,

    #[error("relay write failed: {0}")]
    Send(#[source] WsError),

    #[error("relay close failed: {0}")]
    Close(#[source] WsError),
}

/// Receiving ends of the read loop's two channels.
pub struct RelayInbound {
    /// Normalized text frames, in arrival order.
    pub messages: mpsc::Receiver<String>,
    /// Fires at most once, only when the connection ends unexpectedly.
    pub closed: oneshot::Receiver<CloseNotice>,
}

/// One open relay connection.
pub struct RelayTransport {
    writer: WsWriter,
    /// Present until the read loop is spawned.
    reader: Option<WsReader>,
    /// Resolves to the read half when the loop stopped because of
    /// cancellation, or `None` when the connection ended on its own.
    read_loop: Option<JoinHandle<Option<WsReader>>>,
}

impl RelayTransport {
    /// Dials `address`.  Fails fast; there is no retry.
    pub async fn open(address: &str) -> Result<Self, TransportError> {
        let (ws, response) = connect_async(address)
            .await
            .map_err(TransportError::Connect)?;
        debug!("relay handshake completed with status {}", response.status());

        let (writer, reader) = ws.split();
        Ok(Self {
            writer,
            reader: Some(reader),
            read_loop: None,
        })
    }

    /// Moves the read half into a new task bound to `token`.
    ///
    /// # Errors
    ///
    /// [`TransportError::ReadLoopActive`] if a loop was already spawned for
    /// this connection.
    pub fn spawn_read_loop(
        &mut self,
        token: CancellationToken,
    ) -> Result<RelayInbound, TransportError> {
        let reader = self.reader.take().ok_or(TransportError::ReadLoopActive)?;
        let (message_tx, message_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (close_tx, close_rx) = oneshot::channel();

        self.read_loop = Some(tokio::spawn(run_read_loop(
            reader, message_tx, close_tx, token,
        )));

        Ok(RelayInbound {
            messages: message_rx,
            closed: close_rx,
        })
    }

    /// Writes one text frame.
    pub async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.writer
            .send(WsMessage::Text(text))
            .await
            .map_err(TransportError::Send)
    }

    /// Shuts the connection down politely.
    ///
    /// 1. Waits up to `timeout` for the (already cancelled) read loop to hand
    ///    back the read half.
    /// 2. Sends a Normal close frame.
    /// 3. Waits up to `timeout` for the peer's close acknowledgement.
    /// 4. Releases the connection whether or not the acknowledgement came.
    ///
    /// Never blocks longer than twice `timeout`.
    pub async fn graceful_close(mut self, timeout: Duration) -> Result<(), TransportError> {
        let reader = match self.read_loop.take() {
            Some(handle) => join_or_abort(handle, timeout).await,
            None => self.reader.take(),
        };

        let close = WsMessage::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        match self.writer.send(close).await {
            Ok(()) => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => {
                debug!("relay connection already closed");
                return Ok(());
            }
            Err(e) => return Err(TransportError::Close(e)),
        }

        if let Some(mut reader) = reader {
            let acknowledged = tokio::time::timeout(timeout, async {
                while let Some(frame) = reader.next().await {
                    match frame {
                        Ok(WsMessage::Close(_)) | Err(_) => break,
                        Ok(_) => continue,
                    }
                }
            })
            .await;
            if acknowledged.is_err() {
                debug!("no close acknowledgement within {timeout:?}");
            }
        }

        info!("relay connection closed");
        Ok(())
    }

    /// Drops the connection without a close frame.  Used after the peer has
    /// already gone away.
    pub fn release(mut self) {
        if let Some(handle) = self.read_loop.take() {
            handle.abort();
        }
        debug!("relay connection released");
    }
}

#[async_trait]
impl RelaySink for RelayTransport {
    async fn send_envelope(&mut self, envelope: &ActionEnvelope) -> Result<(), SendError> {
        let text = envelope.to_json()?;
        debug!("bridge → relay: {text}");
        self.send_text(text)
            .await
            .map_err(|e| SendError::Transport(Box::new(e)))
    }
}

/// Collapses line breaks into spaces and trims the frame.
pub fn normalize_frame(text: &str) -> String {
    text.replace(['\r', '\n'], " ").trim().to_string()
}

/// Waits up to `timeout` for a stopping task, aborting it otherwise.  The
/// task has ended by the time this returns.
async fn join_or_abort<T>(mut handle: JoinHandle<Option<T>>, timeout: Duration) -> Option<T> {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            warn!("relay read loop ended abnormally: {e}");
            None
        }
        Err(_) => {
            warn!("relay read loop did not stop within {timeout:?}; aborting it");
            handle.abort();
            let _ = handle.await;
            None
        }
    }
}

// ── Read loop ─────────────────────────────────────────────────────────────────

async fn run_read_loop(
    mut reader: WsReader,
    messages: mpsc::Sender<String>,
    closed: oneshot::Sender<CloseNotice>,
    token: CancellationToken,
) -> Option<WsReader> {
    let notice = loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Some(reader),
            next = reader.next() => next,
        };

        match next {
            Some(Ok(WsMessage::Text(text))) => {
                let frame = normalize_frame(&text);
                debug!("relay → bridge: {frame}");
                // A full queue parks the reader here; cancellation still wins.
                let delivered = tokio::select! {
                    biased;
                    _ = token.cancelled() => false,
                    sent = messages.send(frame) => sent.is_ok(),
                };
                if !delivered {
                    return Some(reader);
                }
            }
            Some(Ok(WsMessage::Binary(data))) => {
                warn!("unexpected binary relay frame ({} bytes, ignored)", data.len());
            }
            Some(Ok(WsMessage::Close(frame))) => {
                break match frame {
                    Some(frame) => CloseNotice {
                        code: Some(u16::from(frame.code)),
                        reason: frame.reason.into_owned(),
                    },
                    None => CloseNotice {
                        code: None,
                        reason: "close frame without status".to_string(),
                    },
                };
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                break CloseNotice {
                    code: None,
                    reason: e.to_string(),
                }
            }
            None => {
                break CloseNotice {
                    code: None,
                    reason: "stream ended".to_string(),
                }
            }
        }
    };

    if token.is_cancelled() {
        debug!("relay read ended during shutdown: {notice}");
    } else {
        warn!("relay connection {notice}");
        let _ = closed.send(notice);
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Starts a one-connection relay and returns its address plus the
    /// server-side socket once a client connects.
    async fn local_relay() -> (
        String,
        JoinHandle<WebSocketStream<TcpStream>>,
    ) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            accept_async(tcp).await.unwrap()
        });
        (format!("ws://{addr}"), server)
    }

    #[test]
    fn test_normalize_frame_collapses_newlines() {
        assert_eq!(normalize_frame("  {\"a\":\n1}\r\n"), "{\"a\": 1}");
        assert_eq!(normalize_frame("plain"), "plain");
    }

    #[tokio::test]
    async fn test_open_fails_fast_on_refused_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = RelayTransport::open(&format!("ws://{addr}")).await;

        assert!(matches!(result, Err(TransportError::Connect(_))));
    }

    #[tokio::test]
    async fn test_second_read_loop_is_refused() {
        let (addr, server) = local_relay().await;
        let mut transport = RelayTransport::open(&addr).await.unwrap();
        let _peer = server.await.unwrap();
        let token = CancellationToken::new();

        let _inbound = transport.spawn_read_loop(token.clone()).unwrap();
        let second = transport.spawn_read_loop(token.clone());

        assert!(matches!(second, Err(TransportError::ReadLoopActive)));
        token.cancel();
    }

    #[tokio::test]
    async fn test_frames_are_queued_in_order() {
        // Arrange
        let (addr, server) = local_relay().await;
        let mut transport = RelayTransport::open(&addr).await.unwrap();
        let mut inbound = transport.spawn_read_loop(CancellationToken::new()).unwrap();
        let mut peer = server.await.unwrap();

        // Act
        peer.send(WsMessage::Text("first\n".into())).await.unwrap();
        peer.send(WsMessage::Text("second".into())).await.unwrap();

        // Assert
        assert_eq!(inbound.messages.recv().await.unwrap(), "first");
        assert_eq!(inbound.messages.recv().await.unwrap(), "second");
    }

    #[tokio::test]
    async fn test_peer_drop_publishes_one_notice() {
        let (addr, server) = local_relay().await;
        let mut transport = RelayTransport::open(&addr).await.unwrap();
        let mut inbound = transport.spawn_read_loop(CancellationToken::new()).unwrap();

        // Drop the TCP connection without a close handshake.
        drop(server.await.unwrap());

        let notice = tokio::time::timeout(Duration::from_secs(5), &mut inbound.closed)
            .await
            .expect("close notice in time")
            .expect("sender not dropped");
        assert!(notice.code.is_none() || notice.code == Some(1006));
        // The queue closes with the loop; nothing else was published.
        assert!(inbound.messages.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_publishes_no_notice() {
        let (addr, server) = local_relay().await;
        let mut transport = RelayTransport::open(&addr).await.unwrap();
        let token = CancellationToken::new();
        let inbound = transport.spawn_read_loop(token.clone()).unwrap();
        let _peer = server.await.unwrap();

        token.cancel();
        transport
            .graceful_close(Duration::from_millis(200))
            .await
            .unwrap();

        assert!(inbound.closed.await.is_err(), "no notice on expected close");
    }

    #[tokio::test]
    async fn test_graceful_close_sends_normal_close_frame() {
        // Arrange
        let (addr, server) = local_relay().await;
        let mut transport = RelayTransport::open(&addr).await.unwrap();
        let token = CancellationToken::new();
        let _inbound = transport.spawn_read_loop(token.clone()).unwrap();
        let mut peer = server.await.unwrap();

        // Act
        token.cancel();
        let closing = tokio::spawn(transport.graceful_close(Duration::from_secs(2)));

        // Assert: the peer sees a Normal close frame
        let frame = loop {
            match peer.next().await {
                Some(Ok(WsMessage::Close(frame))) => break frame,
                Some(Ok(_)) => continue,
                other => panic!("expected close frame, got {other:?}"),
            }
        };
        assert_eq!(frame.map(|f| f.code), Some(CloseCode::Normal));
        closing.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_graceful_close_does_not_wait_forever_without_ack() {
        // The peer accepts but never reads, so no acknowledgement comes back.
        let (addr, server) = local_relay().await;
        let mut transport = RelayTransport::open(&addr).await.unwrap();
        let token = CancellationToken::new();
        let _inbound = transport.spawn_read_loop(token.clone()).unwrap();
        let _peer = server.await.unwrap();

        token.cancel();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            transport.graceful_close(Duration::from_millis(100)),
        )
        .await;

        assert!(result.is_ok(), "graceful_close must be bounded");
    }

    #[tokio::test]
    async fn test_stuck_read_loop_has_ended_when_join_or_abort_returns() {
        // Arrange: a task that never finishes and owns a sender
        let (guard, mut released) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
            Some(())
        });

        // Act
        let value = join_or_abort(handle, Duration::from_millis(50)).await;

        // Assert: aborted and already dropped, not merely signalled
        assert_eq!(value, None);
        assert!(matches!(
            released.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_join_or_abort_returns_value_of_finished_task() {
        let handle = tokio::spawn(async { Some(7) });

        assert_eq!(join_or_abort(handle, Duration::from_secs(1)).await, Some(7));
    }
}

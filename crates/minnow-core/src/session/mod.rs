//! Connection session for Minnow.
//!
//! A [`ChatClient`] owns at most one active session to a peer. Each session
//! runs exactly two background tasks:
//!
//! - one persistent *reader* task: reads the inbound stream line by line,
//!   decodes each line through the codec, and dispatches plain frames to the
//!   listener and control frames to the inbound transfer tracker;
//! - one persistent *writer* task: owns the write half of the socket and
//!   drains a bounded command channel, so every outbound frame is written
//!   and flushed as one atomic unit and concurrent sends can never
//!   interleave their bytes on the wire.
//!
//! Sends are fire-and-forget: `send_text` and `send_file` enqueue work and
//! return; write failures surface later through the listener, never to the
//! caller. The sole teardown path is the reader task exiting, which emits
//! exactly one "connection lost" system message whether the session ended
//! by local disconnect, peer close, or read error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::listener::ChatListener;
use crate::protocol::{self, Frame};
use crate::transfer::{self, InboundTransfer};

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time before the OS starts TCP keep-alive probing
    pub keepalive_time: Duration,
    /// Interval between keep-alive probes
    pub keepalive_interval: Duration,
    /// Depth of the outbound write queue (backpressure bound)
    pub write_queue_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            keepalive_time: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(5),
            write_queue_depth: 64,
        }
    }
}

/// Configure low-latency mode and TCP keep-alive on a freshly connected
/// socket.
///
/// Nagle coalescing is disabled so each flushed frame leaves immediately,
/// and OS-level keep-alive probing prevents network equipment from closing
/// the idle connection.
fn configure_socket(stream: &TcpStream, config: &SessionConfig) -> Result<()> {
    stream.set_nodelay(true)?;

    let socket_ref = SockRef::from(stream);
    let keepalive = TcpKeepalive::new()
        .with_time(config.keepalive_time)
        .with_interval(config.keepalive_interval);
    socket_ref.set_tcp_keepalive(&keepalive)?;

    tracing::debug!("TCP_NODELAY and keep-alive enabled on socket");
    Ok(())
}

/// Work items drained by the session's single writer task.
enum WriteCommand {
    /// One plain chat line (pre-validated: no embedded terminator).
    Text(String),
    /// One complete outbound file transfer, run inline by the writer so its
    /// frames never interleave with concurrent text sends.
    File {
        name: String,
        bytes: Vec<u8>,
    },
    /// Best-effort farewell line before the writer exits. Task shutdown
    /// itself is driven by channel closure, not by this command, so a
    /// farewell lost to a full queue cannot strand the writer.
    Close {
        farewell: Option<String>,
    },
}

/// One active connection to a peer.
struct ChatSession {
    display_name: String,
    writer_tx: mpsc::Sender<WriteCommand>,
    stop_tx: oneshot::Sender<()>,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    open: Arc<AtomicBool>,
}

/// A chat client holding at most one active [`ChatSession`].
///
/// Connecting while a session is active tears the old session down first.
/// All decoded protocol events are delivered through the [`ChatListener`]
/// supplied at construction.
pub struct ChatClient {
    listener: Arc<dyn ChatListener>,
    config: SessionConfig,
    session: Option<ChatSession>,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Create a client with the default configuration.
    #[must_use]
    pub fn new(listener: Arc<dyn ChatListener>) -> Self {
        Self::with_config(listener, SessionConfig::default())
    }

    /// Create a client with an explicit configuration.
    #[must_use]
    pub fn with_config(listener: Arc<dyn ChatListener>, config: SessionConfig) -> Self {
        Self {
            listener,
            config,
            session: None,
        }
    }

    /// Whether a session is currently open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.open.load(Ordering::SeqCst))
    }

    /// Open a TCP connection to `host:port` and start the session.
    ///
    /// On success the join announcement is the first frame on the wire,
    /// then the background reader and writer tasks take over; this call
    /// does not block beyond the connection attempt itself. On failure the
    /// listener receives exactly one system message, the client stays
    /// closed, and the error is also returned so the caller may retry.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection attempt or socket setup fails.
    pub async fn connect(&mut self, host: &str, port: u16, display_name: &str) -> Result<()> {
        // At most one active session per client.
        self.disconnect().await;

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("connect to {host}:{port} failed: {e}");
                self.listener
                    .on_message(&format!("[system] failed to connect to {host}:{port}: {e}"));
                return Err(e.into());
            }
        };

        if let Err(e) = configure_socket(&stream, &self.config) {
            tracing::warn!("socket setup for {host}:{port} failed: {e}");
            self.listener
                .on_message(&format!("[system] failed to connect to {host}:{port}: {e}"));
            return Err(e);
        }

        tracing::info!("connected to {host}:{port} as '{display_name}'");

        let (read_half, write_half) = stream.into_split();
        let (writer_tx, writer_rx) = mpsc::channel(self.config.write_queue_depth);
        let (stop_tx, stop_rx) = oneshot::channel();
        let open = Arc::new(AtomicBool::new(true));

        let writer_task = tokio::spawn(writer_loop(
            write_half,
            writer_rx,
            Arc::clone(&self.listener),
        ));

        // Join announcement goes first; the channel preserves frame order.
        let _ = writer_tx
            .send(WriteCommand::Text(format!("{display_name} joined the chat.")))
            .await;

        let reader_task = tokio::spawn(reader_loop(
            read_half,
            stop_rx,
            Arc::clone(&self.listener),
            writer_tx.clone(),
            Arc::clone(&open),
            display_name.to_string(),
        ));

        self.session = Some(ChatSession {
            display_name: display_name.to_string(),
            writer_tx,
            stop_tx,
            reader_task,
            writer_task,
            open,
        });

        Ok(())
    }

    /// Close the active session, if any.
    ///
    /// Sends the leave announcement, shuts the socket down, and waits for
    /// both background tasks to exit. The reader emits its single
    /// "connection lost" system message on the way out. Idempotent: calling
    /// this with no active session is a no-op.
    pub async fn disconnect(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let ChatSession {
            display_name,
            writer_tx,
            stop_tx,
            reader_task,
            writer_task,
            open,
        } = session;

        if open.swap(false, Ordering::SeqCst) {
            let farewell = format!("{display_name} left the chat.");
            let _ = writer_tx
                .send(WriteCommand::Close {
                    farewell: Some(farewell),
                })
                .await;
        }
        let _ = stop_tx.send(());

        // The reader holds the other sender clone; once it exits and ours is
        // dropped, the writer's channel closes and it terminates even if the
        // farewell never made it into a full queue.
        let _ = reader_task.await;
        drop(writer_tx);
        let _ = writer_task.await;
        tracing::info!("session closed");
    }

    /// Enqueue one chat line for sending.
    ///
    /// Never blocks on the network; a write failure is reported through the
    /// listener as a system message, not returned here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the message contains a line
    /// terminator (which would desynchronize framing on the wire), or
    /// [`Error::NotConnected`] if no session is open.
    pub async fn send_text(&self, message: &str) -> Result<()> {
        if message.contains('\n') {
            return Err(Error::InvalidInput(
                "message must not contain a line terminator".to_string(),
            ));
        }
        let session = self.open_session()?;

        if session
            .writer_tx
            .send(WriteCommand::Text(message.to_string()))
            .await
            .is_err()
        {
            self.listener
                .on_message("[system] message send failed: session is closed");
        }
        Ok(())
    }

    /// Enqueue one outbound file transfer.
    ///
    /// The writer task runs the chunking algorithm; progress and the final
    /// outcome arrive through the listener's send events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the file name contains a line
    /// terminator, or [`Error::NotConnected`] if no session is open.
    pub async fn send_file(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        if name.contains('\n') {
            return Err(Error::InvalidInput(
                "file name must not contain a line terminator".to_string(),
            ));
        }
        let session = self.open_session()?;

        if session
            .writer_tx
            .send(WriteCommand::File {
                name: name.to_string(),
                bytes,
            })
            .await
            .is_err()
        {
            self.listener
                .on_send_failed("file send failed: session is closed");
        }
        Ok(())
    }

    fn open_session(&self) -> Result<&ChatSession> {
        self.session
            .as_ref()
            .filter(|s| s.open.load(Ordering::SeqCst))
            .ok_or(Error::NotConnected)
    }
}

/// The single writer task: drains the command channel, writing and flushing
/// one frame at a time. Exits when every sender is gone or a farewell was
/// written, then shuts the write half down.
async fn writer_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<WriteCommand>,
    listener: Arc<dyn ChatListener>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Text(message) => {
                let frame = protocol::encode_line(&message);
                if let Err(e) = protocol::write_frame(&mut writer, &frame).await {
                    tracing::warn!("text send failed: {e}");
                    listener.on_message(&format!("[system] message send failed: {e}"));
                }
            }
            WriteCommand::File { name, bytes } => {
                transfer::run_outbound(&mut writer, listener.as_ref(), &name, &bytes).await;
            }
            WriteCommand::Close { farewell } => {
                if let Some(message) = farewell {
                    let _ = protocol::write_frame(&mut writer, &protocol::encode_line(&message))
                        .await;
                }
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!("writer task exited");
}

/// The single receive loop: reads lines until end-of-stream, a read error,
/// or the local stop signal, then emits exactly one "connection lost"
/// system message.
async fn reader_loop(
    read_half: OwnedReadHalf,
    mut stop_rx: oneshot::Receiver<()>,
    listener: Arc<dyn ChatListener>,
    writer_tx: mpsc::Sender<WriteCommand>,
    open: Arc<AtomicBool>,
    display_name: String,
) {
    let mut reader = BufReader::new(read_half);
    let mut tracker = InboundTransfer::new();
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            result = reader.read_line(&mut line) => match result {
                Ok(0) => {
                    tracing::info!("peer closed the stream");
                    teardown(&writer_tx, &open, &display_name);
                    break;
                }
                Ok(_) => dispatch(&line, &mut tracker, listener.as_ref()),
                Err(e) => {
                    tracing::warn!("read failed: {e}");
                    teardown(&writer_tx, &open, &display_name);
                    break;
                }
            },
            _ = &mut stop_rx => break,
        }
    }

    // Any open inbound transfer is abandoned on teardown.
    tracker.reset();
    listener.on_message("[system] connection lost.");
    tracing::debug!("reader task exited");
}

/// Decode one received line and route it.
fn dispatch(line: &str, tracker: &mut InboundTransfer, listener: &dyn ChatListener) {
    match protocol::decode_line(line) {
        Ok(Frame::Plain(text)) => listener.on_message(&text),
        Ok(Frame::Control(control)) => tracker.handle(control, listener),
        Err(e) => {
            tracing::warn!("malformed control frame: {e}");
            listener.on_message(&format!("[system] malformed file chunk: {e}"));
        }
    }
}

/// Reader-side cleanup after an unexpected peer disconnect: best-effort
/// leave announcement, then close. Skipped if a local `disconnect` already
/// claimed the session.
fn teardown(writer_tx: &mpsc::Sender<WriteCommand>, open: &AtomicBool, display_name: &str) {
    if open.swap(false, Ordering::SeqCst) {
        let farewell = format!("{display_name} left the chat.");
        let _ = writer_tx.try_send(WriteCommand::Close {
            farewell: Some(farewell),
        });
    }
}

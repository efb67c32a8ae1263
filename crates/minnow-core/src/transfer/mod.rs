//! File transfer engine for Minnow.
//!
//! Two halves, both driven by the session:
//!
//! - [`InboundTransfer`] sequences FILE_START / FILE_DATA / FILE_END control
//!   frames from the receive loop into listener callbacks. It tracks only
//!   whether a transfer is open and what was announced; accumulating chunk
//!   bytes and checking them against the declared size is the listener's
//!   responsibility.
//! - [`run_outbound`] chunks an outbound byte buffer into fixed 1 KiB
//!   FILE_DATA frames between one FILE_START and one FILE_END, reporting
//!   progress after every chunk.

use tokio::io::AsyncWrite;

use crate::error::Result;
use crate::listener::ChatListener;
use crate::protocol::{self, ControlFrame};
use crate::CHUNK_SIZE;

/// Receive-side transfer state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReceiveState {
    /// No transfer in progress.
    #[default]
    Idle,
    /// A FILE_START has been seen and not yet closed by FILE_END.
    Receiving {
        /// Announced file name
        name: String,
        /// Announced size in bytes
        declared_size: u64,
    },
}

/// Sequences inbound control frames into listener events.
///
/// At most one transfer is open at a time. Out-of-order FILE_DATA or
/// FILE_END while idle is a silent no-op; a FILE_START while already
/// receiving aborts the previous transfer (with an explicit
/// [`ChatListener::on_file_aborted`]) and opens the new one.
#[derive(Debug, Default)]
pub struct InboundTransfer {
    state: ReceiveState,
}

impl InboundTransfer {
    /// Create a tracker in the idle state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current receive state.
    #[must_use]
    pub fn state(&self) -> &ReceiveState {
        &self.state
    }

    /// Whether a transfer is currently open.
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        matches!(self.state, ReceiveState::Receiving { .. })
    }

    /// Apply one inbound control frame, emitting the matching events.
    pub fn handle(&mut self, frame: ControlFrame, listener: &dyn ChatListener) {
        match frame {
            ControlFrame::FileStart { name, size } => {
                if let ReceiveState::Receiving { name: previous, .. } = &self.state {
                    tracing::warn!(
                        "new transfer '{name}' announced while '{previous}' still open, aborting"
                    );
                    listener.on_file_aborted(previous);
                }
                listener.on_file_announced(&name, size);
                self.state = ReceiveState::Receiving {
                    name,
                    declared_size: size,
                };
            }
            ControlFrame::FileData { data } => {
                if self.is_receiving() {
                    listener.on_file_chunk(&data);
                }
            }
            ControlFrame::FileEnd => {
                if self.is_receiving() {
                    self.state = ReceiveState::Idle;
                    listener.on_file_complete();
                }
            }
        }
    }

    /// Abandon any open transfer without an event (session teardown path).
    pub fn reset(&mut self) {
        self.state = ReceiveState::Idle;
    }
}

/// Progress of an outbound transfer as a percentage.
///
/// Monotone non-decreasing across a transfer and exactly `100.0` once
/// `sent == total`. An empty file is complete immediately.
#[must_use]
pub fn progress_percent(sent: usize, total: usize) -> f32 {
    if total == 0 {
        100.0
    } else {
        sent as f32 / total as f32 * 100.0
    }
}

/// Run one outbound file transfer against a writer.
///
/// Writes one FILE_START, the FILE_DATA chunks in order (each written and
/// flushed as one frame, with a progress event after each), then one
/// FILE_END. The outcome is reported only through the listener: a
/// send-complete event on success, or a send-failed event on the first I/O
/// failure, which aborts the remaining chunks. No cleanup frame is sent to
/// the peer on failure.
pub async fn run_outbound<W>(writer: &mut W, listener: &dyn ChatListener, name: &str, bytes: &[u8])
where
    W: AsyncWrite + Unpin,
{
    match write_transfer(writer, listener, name, bytes).await {
        Ok(()) => listener.on_send_complete(),
        Err(e) => {
            tracing::warn!("file transfer '{name}' aborted: {e}");
            listener.on_send_failed(&format!("file send failed: {e}"));
        }
    }
}

async fn write_transfer<W>(
    writer: &mut W,
    listener: &dyn ChatListener,
    name: &str,
    bytes: &[u8],
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let start = ControlFrame::FileStart {
        name: name.to_string(),
        size: bytes.len() as u64,
    };
    protocol::write_frame(writer, &protocol::encode_control(&start)?).await?;

    let total = bytes.len();
    let mut sent = 0usize;
    for chunk in bytes.chunks(CHUNK_SIZE) {
        let frame = protocol::encode_control(&ControlFrame::FileData {
            data: chunk.to_vec(),
        })?;
        protocol::write_frame(writer, &frame).await?;

        sent += chunk.len();
        listener.on_send_progress(progress_percent(sent, total));
    }
    if total == 0 {
        listener.on_send_progress(100.0);
    }

    protocol::write_frame(writer, &protocol::encode_control(&ControlFrame::FileEnd)?).await?;

    tracing::debug!("sent file '{name}' ({total} bytes)");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::protocol::{decode_line, Frame};

    #[derive(Debug, PartialEq)]
    enum Event {
        Announced(String, u64),
        Chunk(Vec<u8>),
        Complete,
        Aborted(String),
        Progress(f32),
        SendComplete,
        SendFailed(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<Event>>,
    }

    impl Recorder {
        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.events.lock().unwrap())
        }
    }

    impl ChatListener for Recorder {
        fn on_file_announced(&self, name: &str, size: u64) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Announced(name.to_string(), size));
        }
        fn on_file_chunk(&self, data: &[u8]) {
            self.events.lock().unwrap().push(Event::Chunk(data.to_vec()));
        }
        fn on_file_complete(&self) {
            self.events.lock().unwrap().push(Event::Complete);
        }
        fn on_file_aborted(&self, name: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Aborted(name.to_string()));
        }
        fn on_send_progress(&self, percent: f32) {
            self.events.lock().unwrap().push(Event::Progress(percent));
        }
        fn on_send_complete(&self) {
            self.events.lock().unwrap().push(Event::SendComplete);
        }
        fn on_send_failed(&self, error: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::SendFailed(error.to_string()));
        }
    }

    #[test]
    fn test_inbound_sequence() {
        let recorder = Recorder::default();
        let mut transfer = InboundTransfer::new();

        transfer.handle(
            ControlFrame::FileStart {
                name: "a.txt".to_string(),
                size: 10,
            },
            &recorder,
        );
        transfer.handle(
            ControlFrame::FileData {
                data: b"chunk1".to_vec(),
            },
            &recorder,
        );
        transfer.handle(
            ControlFrame::FileData {
                data: b"nk2!".to_vec(),
            },
            &recorder,
        );
        transfer.handle(ControlFrame::FileEnd, &recorder);

        assert_eq!(
            recorder.take(),
            vec![
                Event::Announced("a.txt".to_string(), 10),
                Event::Chunk(b"chunk1".to_vec()),
                Event::Chunk(b"nk2!".to_vec()),
                Event::Complete,
            ]
        );
        assert_eq!(*transfer.state(), ReceiveState::Idle);
    }

    #[test]
    fn test_data_and_end_while_idle_are_ignored() {
        let recorder = Recorder::default();
        let mut transfer = InboundTransfer::new();

        transfer.handle(
            ControlFrame::FileData {
                data: b"stray".to_vec(),
            },
            &recorder,
        );
        transfer.handle(ControlFrame::FileEnd, &recorder);

        assert!(recorder.take().is_empty());
        assert!(!transfer.is_receiving());
    }

    #[test]
    fn test_start_while_receiving_aborts_previous() {
        let recorder = Recorder::default();
        let mut transfer = InboundTransfer::new();

        transfer.handle(
            ControlFrame::FileStart {
                name: "old.bin".to_string(),
                size: 100,
            },
            &recorder,
        );
        transfer.handle(
            ControlFrame::FileStart {
                name: "new.bin".to_string(),
                size: 5,
            },
            &recorder,
        );

        assert_eq!(
            recorder.take(),
            vec![
                Event::Announced("old.bin".to_string(), 100),
                Event::Aborted("old.bin".to_string()),
                Event::Announced("new.bin".to_string(), 5),
            ]
        );
        assert_eq!(
            *transfer.state(),
            ReceiveState::Receiving {
                name: "new.bin".to_string(),
                declared_size: 5,
            }
        );
    }

    #[test]
    fn test_reset_abandons_transfer_silently() {
        let recorder = Recorder::default();
        let mut transfer = InboundTransfer::new();

        transfer.handle(
            ControlFrame::FileStart {
                name: "a.txt".to_string(),
                size: 1,
            },
            &recorder,
        );
        recorder.take();

        transfer.reset();
        assert!(recorder.take().is_empty());
        assert!(!transfer.is_receiving());
    }

    #[test]
    fn test_chunking_reassembles_exactly() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let reassembled: Vec<u8> = data
            .chunks(CHUNK_SIZE)
            .flat_map(<[u8]>::to_vec)
            .collect();
        assert_eq!(reassembled, data);
    }

    #[test]
    fn test_progress_percent() {
        assert!((progress_percent(0, 0) - 100.0).abs() < f32::EPSILON);
        assert!((progress_percent(1024, 2500) - 40.96).abs() < 0.01);
        assert!((progress_percent(2500, 2500) - 100.0).abs() < f32::EPSILON);
    }

    /// Decode the frames a transfer wrote to a buffer, in order.
    fn decode_frames(buffer: &[u8]) -> Vec<Frame> {
        String::from_utf8(buffer.to_vec())
            .expect("utf8")
            .lines()
            .map(|line| decode_line(line).expect("decode"))
            .collect()
    }

    #[tokio::test]
    async fn test_outbound_2500_bytes_produces_three_chunks() {
        let recorder = Recorder::default();
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 256) as u8).collect();
        let mut buffer = Vec::new();

        run_outbound(&mut buffer, &recorder, "b.bin", &data).await;

        let frames = decode_frames(&buffer);
        assert_eq!(frames.len(), 5);
        assert_eq!(
            frames[0],
            Frame::Control(ControlFrame::FileStart {
                name: "b.bin".to_string(),
                size: 2500,
            })
        );
        let chunk_sizes: Vec<usize> = frames[1..4]
            .iter()
            .map(|f| match f {
                Frame::Control(ControlFrame::FileData { data }) => data.len(),
                other => panic!("expected FILE_DATA, got {other:?}"),
            })
            .collect();
        assert_eq!(chunk_sizes, vec![1024, 1024, 452]);
        assert_eq!(frames[4], Frame::Control(ControlFrame::FileEnd));

        let events = recorder.take();
        let progress: Vec<f32> = events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(progress.len(), 3);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
        assert!((progress[2] - 100.0).abs() < f32::EPSILON);
        assert_eq!(*events.last().unwrap(), Event::SendComplete);
    }

    #[tokio::test]
    async fn test_outbound_empty_file() {
        let recorder = Recorder::default();
        let mut buffer = Vec::new();

        run_outbound(&mut buffer, &recorder, "empty", &[]).await;

        let frames = decode_frames(&buffer);
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[0],
            Frame::Control(ControlFrame::FileStart {
                name: "empty".to_string(),
                size: 0,
            })
        );
        assert_eq!(frames[1], Frame::Control(ControlFrame::FileEnd));

        assert_eq!(
            recorder.take(),
            vec![Event::Progress(100.0), Event::SendComplete]
        );
    }

    #[tokio::test]
    async fn test_outbound_write_failure_aborts() {
        /// Fails every write after the first `allowed` bytes.
        struct FailingWriter {
            written: usize,
            allowed: usize,
        }

        impl AsyncWrite for FailingWriter {
            fn poll_write(
                mut self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                buf: &[u8],
            ) -> std::task::Poll<std::io::Result<usize>> {
                if self.written >= self.allowed {
                    return std::task::Poll::Ready(Err(std::io::Error::other("broken pipe")));
                }
                self.written += buf.len();
                std::task::Poll::Ready(Ok(buf.len()))
            }
            fn poll_flush(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
            fn poll_shutdown(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        let recorder = Recorder::default();
        let data = vec![0u8; 4096];
        // Enough for FILE_START and one FILE_DATA frame only.
        let mut writer = FailingWriter {
            written: 0,
            allowed: 1500,
        };

        run_outbound(&mut writer, &recorder, "c.bin", &data).await;

        let events = recorder.take();
        let progress_count = events
            .iter()
            .filter(|e| matches!(e, Event::Progress(_)))
            .count();
        assert!(progress_count < 4, "transfer should abort early");
        assert!(matches!(events.last(), Some(Event::SendFailed(_))));
        assert!(!events.contains(&Event::SendComplete));
    }
}

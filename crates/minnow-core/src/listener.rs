//! The listener capability interface.
//!
//! The engine holds a [`ChatListener`] and calls into it with decoded
//! protocol events: chat messages, inbound file transfer progress, and the
//! outcome of asynchronous sends. The listener owns no engine state; it is
//! the surrounding application's job to accumulate inbound chunks and track
//! completion against the announced size.
//!
//! Inbound events are delivered strictly in stream order by the single
//! receive loop. Send-outcome events arrive in the order the serialized
//! writer executed the corresponding sends.

/// Receives decoded protocol events from a session.
///
/// All methods take `&self` and default to no-ops, so implementations only
/// override the events they observe and use interior mutability for any
/// accumulated state. Implementations must be cheap: callbacks run on the
/// session's reader and writer tasks.
pub trait ChatListener: Send + Sync {
    /// A plain chat line arrived, or the engine produced a system message
    /// (prefixed `"[system] "`).
    fn on_message(&self, _text: &str) {}

    /// A peer announced an incoming file with its declared byte size.
    fn on_file_announced(&self, _name: &str, _size: u64) {}

    /// One decoded chunk of the file currently being received.
    fn on_file_chunk(&self, _data: &[u8]) {}

    /// The file currently being received finished.
    fn on_file_complete(&self) {}

    /// An in-progress inbound transfer was discarded because the peer
    /// announced a new file before finishing the previous one.
    fn on_file_aborted(&self, _name: &str) {}

    /// Outbound transfer progress in percent (monotone, ends at `100.0`).
    fn on_send_progress(&self, _percent: f32) {}

    /// An outbound file transfer finished successfully.
    fn on_send_complete(&self) {}

    /// An outbound file transfer was aborted by an I/O failure.
    fn on_send_failed(&self, _error: &str) {}
}

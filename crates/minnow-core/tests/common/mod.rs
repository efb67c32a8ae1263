//! Shared test support: an event-recording listener.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use minnow_core::listener::ChatListener;

/// One observed listener callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message(String),
    FileAnnounced(String, u64),
    FileChunk(Vec<u8>),
    FileComplete,
    FileAborted(String),
    SendProgress(f32),
    SendComplete,
    SendFailed(String),
}

/// Records every listener callback in arrival order.
#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<Event>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    /// Poll until the recorded events satisfy `predicate`, or panic after
    /// five seconds.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Vec<Event>
    where
        F: FnMut(&[Event]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let snapshot = self.events();
            if predicate(&snapshot) {
                return snapshot;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for events, got: {snapshot:?}"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl ChatListener for Recorder {
    fn on_message(&self, text: &str) {
        self.push(Event::Message(text.to_string()));
    }
    fn on_file_announced(&self, name: &str, size: u64) {
        self.push(Event::FileAnnounced(name.to_string(), size));
    }
    fn on_file_chunk(&self, data: &[u8]) {
        self.push(Event::FileChunk(data.to_vec()));
    }
    fn on_file_complete(&self) {
        self.push(Event::FileComplete);
    }
    fn on_file_aborted(&self, name: &str) {
        self.push(Event::FileAborted(name.to_string()));
    }
    fn on_send_progress(&self, percent: f32) {
        self.push(Event::SendProgress(percent));
    }
    fn on_send_complete(&self) {
        self.push(Event::SendComplete);
    }
    fn on_send_failed(&self, error: &str) {
        self.push(Event::SendFailed(error.to_string()));
    }
}

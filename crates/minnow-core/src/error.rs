//! Error types for Minnow.
//!
//! This module provides a unified error type for all Minnow operations,
//! with specific error variants for different failure modes.
//!
//! Errors that occur inside a session's background tasks never cross back
//! to the caller of an asynchronous send; they are converted into listener
//! events at the boundary of the task that observed them.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Minnow operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for Minnow.
#[derive(Error, Debug)]
pub enum Error {
    /// No session is currently connected
    #[error("not connected to a peer")]
    NotConnected,

    /// Input rejected at the send boundary
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A FILE_DATA frame carried data that is not valid base64
    #[error("invalid file chunk data: {0}")]
    InvalidChunkData(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns whether this error is recoverable (can be retried).
    ///
    /// Connect and write failures are transient; a caller may retry with a
    /// fresh `connect` or a new send. Input validation failures require the
    /// caller to fix the input first.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::NotConnected)
    }
}

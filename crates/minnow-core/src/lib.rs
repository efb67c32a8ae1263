//! # Minnow Core Library
//!
//! `minnow-core` implements the protocol engine for Minnow, a line-oriented
//! TCP chat client that multiplexes plain chat text and chunked binary file
//! transfer over a single newline-delimited stream.
//!
//! ## Modules
//!
//! - [`listener`] - The event capability interface consumed by the engine
//! - [`protocol`] - Wire framing: plain lines and the JSON control envelope
//! - [`session`] - Connection lifecycle, receive loop, and serialized sends
//! - [`transfer`] - File transfer state tracking and outbound chunking
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use minnow_core::session::ChatClient;
//!
//! let mut client = ChatClient::new(Arc::new(MyListener));
//! client.connect("192.168.1.20", 9000, "alice").await?;
//! client.send_text("hello").await?;
//! client.send_file("notes.txt", std::fs::read("notes.txt")?).await?;
//! client.disconnect().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod error;
pub mod listener;
pub mod protocol;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fixed chunk size for outbound file transfers (1 KiB).
///
/// This is a wire protocol constant shared with the existing peer
/// implementations; there is no negotiation or adaptive sizing.
pub const CHUNK_SIZE: usize = 1024;

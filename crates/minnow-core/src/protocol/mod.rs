//! Minnow wire protocol implementation.
//!
//! The wire format is UTF-8 text, line-oriented, `\n`-terminated. Each line
//! is one frame:
//!
//! - *Plain frame*: any line that does not parse as the control envelope,
//!   interpreted as a chat message.
//! - *Control frame*: a JSON object with a required `"type"` discriminator,
//!   used for the in-band file transfer markers:
//!
//! ```text
//! {"type":"FILE_START","name":"notes.txt","size":2500}
//! {"type":"FILE_DATA","data":"<base64>"}
//! {"type":"FILE_END"}
//! ```
//!
//! A line is a control frame iff it parses as the envelope with a recognized
//! `type` and well-formed required fields; any parse or field failure demotes
//! it to a plain frame. The one exception is FILE_DATA whose `data` is not
//! valid base64: the envelope already committed to a known type, so that is
//! surfaced as a hard error instead of being silently demoted.
//!
//! There is no escaping scheme for literal `\n` inside chat text or file
//! names. The wire format assumes they are absent; the session layer rejects
//! such input at the send boundary.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One line of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// An arbitrary chat text line (trailing terminator and surrounding
    /// whitespace removed).
    Plain(String),
    /// A recognized file transfer control message.
    Control(ControlFrame),
}

/// A decoded control envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    /// Announces an incoming file and opens receive state.
    FileStart {
        /// Declared file name
        name: String,
        /// Declared size in bytes
        size: u64,
    },
    /// One chunk of file bytes, already base64-decoded.
    FileData {
        /// Decoded chunk bytes
        data: Vec<u8>,
    },
    /// Closes receive state.
    FileEnd,
}

/// Serde model of the on-wire control envelope.
///
/// `FILE_DATA` carries its chunk as a base64 string here; [`decode_line`]
/// and [`encode_control`] translate to and from raw bytes.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum Envelope {
    #[serde(rename = "FILE_START")]
    FileStart { name: String, size: u64 },
    #[serde(rename = "FILE_DATA")]
    FileData { data: String },
    #[serde(rename = "FILE_END")]
    FileEnd,
}

/// Encode a plain text line as one frame: the text plus a single `\n`.
///
/// The input must not itself contain a `\n`; the session layer validates
/// this before calling.
#[must_use]
pub fn encode_line(text: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.push(b'\n');
    buf
}

/// Encode a control frame as one `\n`-terminated JSON line.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_control(frame: &ControlFrame) -> Result<Vec<u8>> {
    let envelope = match frame {
        ControlFrame::FileStart { name, size } => Envelope::FileStart {
            name: name.clone(),
            size: *size,
        },
        ControlFrame::FileData { data } => Envelope::FileData {
            data: BASE64_STANDARD.encode(data),
        },
        ControlFrame::FileEnd => Envelope::FileEnd,
    };

    let json = serde_json::to_string(&envelope).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(encode_line(&json))
}

/// Decode one received line into a [`Frame`].
///
/// The trailing terminator and surrounding whitespace are trimmed first.
/// A line that fails to parse as the envelope, names an unrecognized type,
/// or is missing required fields is demoted to [`Frame::Plain`].
///
/// # Errors
///
/// Returns [`Error::InvalidChunkData`] if a recognized FILE_DATA frame
/// carries data that is not valid standard base64.
pub fn decode_line(raw: &str) -> Result<Frame> {
    let text = raw.trim();

    let Ok(envelope) = serde_json::from_str::<Envelope>(text) else {
        return Ok(Frame::Plain(text.to_string()));
    };

    let control = match envelope {
        Envelope::FileStart { name, size } => ControlFrame::FileStart { name, size },
        Envelope::FileData { data } => {
            let bytes = BASE64_STANDARD
                .decode(data.as_bytes())
                .map_err(|e| Error::InvalidChunkData(e.to_string()))?;
            ControlFrame::FileData { data: bytes }
        }
        Envelope::FileEnd => ControlFrame::FileEnd,
    };

    Ok(Frame::Control(control))
}

/// Write one encoded frame to a stream and flush it.
///
/// A `write + flush` of one frame is the atomic unit of the outbound path;
/// callers must not split a single frame's bytes across writers.
///
/// # Errors
///
/// Returns an error if writing or flushing fails.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<()>
where
    W: tokio::io::AsyncWriteExt + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

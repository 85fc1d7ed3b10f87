//! Records and their wire frames
//!
//! A record is one line read from the upstream device. Before it goes out it
//! is prefixed with a 14-digit local timestamp and a tab:
//!
//! ```text
//! 20240131235959\tP:1013.2 T1:21.4 Depth:0.00 Alt:12.1 T2:21.0
//! ```
//!
//! Stream subscribers get the line terminated by `\n`; message subscribers
//! get the same text without the terminator, one record per message.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::{DateTime, Local};

use crate::registry::TransportKind;

/// `YYYYMMDDhhmmss`, local clock, no timezone
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Number of characters in a formatted timestamp
pub const TIMESTAMP_LEN: usize = 14;

/// Line delimiter for upstream records and stream frames
pub const DELIMITER: u8 = b'\n';

/// One line read from the upstream device
///
/// Cheap to clone: the payload is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// When the line was read
    pub received_at: DateTime<Local>,
    /// Line contents, without the trailing `\n`
    pub payload: Bytes,
}

impl Record {
    /// Create a record stamped with the current local time
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self::with_time(Local::now(), payload)
    }

    /// Create a record with an explicit timestamp
    pub fn with_time(received_at: DateTime<Local>, payload: impl Into<Bytes>) -> Self {
        Self {
            received_at,
            payload: payload.into(),
        }
    }

    /// Build a record from a raw line, stripping one trailing delimiter
    pub fn from_line(mut line: Vec<u8>) -> Self {
        if line.last() == Some(&DELIMITER) {
            line.pop();
        }
        Self::new(line)
    }

    /// Formatted `YYYYMMDDhhmmss` timestamp
    pub fn timestamp(&self) -> String {
        self.received_at.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Frame for raw stream subscribers: `<ts>\t<payload>\n`
    pub fn stream_frame(&self) -> Bytes {
        self.frame(TransportKind::Stream, &self.timestamp())
    }

    /// Frame for message subscribers: `<ts>\t<payload>`
    pub fn message_frame(&self) -> Bytes {
        self.frame(TransportKind::Message, &self.timestamp())
    }

    /// Frame for `kind` using an already formatted timestamp
    pub fn frame(&self, kind: TransportKind, timestamp: &str) -> Bytes {
        encode(timestamp, &self.payload, kind == TransportKind::Stream)
    }

    /// Payload as text, for log lines
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

fn encode(timestamp: &str, payload: &[u8], terminate: bool) -> Bytes {
    let mut buf = BytesMut::with_capacity(timestamp.len() + 2 + payload.len());
    buf.put_slice(timestamp.as_bytes());
    buf.put_u8(b'\t');
    buf.put_slice(payload);
    if terminate {
        buf.put_u8(DELIMITER);
    }
    buf.freeze()
}

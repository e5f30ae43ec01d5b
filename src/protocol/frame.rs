//! Text-token frame protocol for single datagrams
//!
//! Frame format:
//! ```text
//! +-------------------------+------------------+
//! | command token           | payload          |
//! | "/name>" (ends with '>')| (rest of datagram)|
//! +-------------------------+------------------+
//! ```
//!
//! There is no length field: one frame is exactly one datagram.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;
use std::io;

/// Character that terminates every command token
pub const TOKEN_DELIMITER: u8 = b'>';

/// Largest payload a UDP datagram can carry over IPv4
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default upper bound for a single frame, well under typical path MTU limits
pub const DEFAULT_MAX_FRAME_SIZE: usize = 8 * 1024;

/// The closed set of commands understood by both ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// Client → server: join or resume (JSON `LoginInput`)
    Connect,
    /// Server → client: identity and replay length (JSON `InitialPayload`)
    InitialPayload,
    /// Client → server: leave (raw identity string)
    Disconnect,
    /// Client → server: JSON `Message`; server → client: raw message id
    DeleteMessage,
    /// Server → client: one replayed entry (JSON `HistoryEntry`)
    AddHistory,
    /// Both directions: JSON `Message`
    AddMessage,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::Connect,
        Command::InitialPayload,
        Command::Disconnect,
        Command::DeleteMessage,
        Command::AddHistory,
        Command::AddMessage,
    ];

    /// Exact wire token, delimiter included
    pub fn token(&self) -> &'static str {
        match self {
            Command::Connect => "/connect>",
            Command::InitialPayload => "/initial_payload>",
            Command::Disconnect => "/disconnect>",
            Command::DeleteMessage => "/delete_message>",
            Command::AddHistory => "/add_history>",
            Command::AddMessage => "/add_message>",
        }
    }

    /// Look up a command by its token, returns None for unknown tokens
    pub fn from_token(token: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|command| command.token().as_bytes() == token)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given command and payload
    pub fn new(command: Command, payload: impl Into<Bytes>) -> Self {
        Self {
            command,
            payload: payload.into(),
        }
    }

    /// Get the total encoded size of this frame
    pub fn encoded_size(&self) -> usize {
        self.command.token().len() + self.payload.len()
    }

    /// Encode this frame into a buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_size());
        buf.put_slice(self.command.token().as_bytes());
        buf.put_slice(&self.payload);
    }

    /// Encode this frame into a new Bytes
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Decode one complete datagram. The token ends at the first delimiter;
    /// everything after it is the payload.
    pub fn decode(data: &[u8]) -> io::Result<Frame> {
        let split = data
            .iter()
            .position(|byte| *byte == TOKEN_DELIMITER)
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "Missing command delimiter")
            })?;

        let (token, payload) = data.split_at(split + 1);
        let command = Command::from_token(token).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown command \"{}\"", String::from_utf8_lossy(token)),
            )
        })?;

        Ok(Frame {
            command,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

//! Codec for encoding/decoding protocol messages to/from frames
//!
//! This module provides the bridge between typed messages and datagram frames.
//! Most payloads are JSON; the disconnect request and the deletion notice carry
//! a raw identifier string.

use super::frame::{Command, Frame};
use super::messages::*;
use bytes::Bytes;
use std::io::{self, Error as IoError, ErrorKind};

/// Trait for messages that can be encoded to frames
pub trait Encodable {
    /// Get the command this message travels under
    fn command(&self) -> Command;

    /// Encode the message payload to bytes
    fn encode_payload(&self) -> io::Result<Bytes>;

    /// Encode the complete frame
    fn encode_frame(&self) -> io::Result<Frame> {
        Ok(Frame::new(self.command(), self.encode_payload()?))
    }
}

/// Trait for messages that can be decoded from frames
pub trait Decodable: Sized {
    /// Expected command for this message
    fn expected_command() -> Command;

    /// Decode the message from a payload
    fn decode_payload(payload: &[u8]) -> io::Result<Self>;

    /// Decode from a complete frame, validating the command
    fn decode_frame(frame: &Frame) -> io::Result<Self> {
        if frame.command != Self::expected_command() {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!(
                    "Expected command {}, got {}",
                    Self::expected_command(),
                    frame.command
                ),
            ));
        }
        Self::decode_payload(&frame.payload)
    }
}

/// Helper macro to implement Encodable and Decodable for a JSON payload type
macro_rules! impl_codec {
    ($type:ty, $command:expr) => {
        impl Encodable for $type {
            fn command(&self) -> Command {
                $command
            }

            fn encode_payload(&self) -> io::Result<Bytes> {
                serde_json::to_vec(self)
                    .map(Bytes::from)
                    .map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }

        impl Decodable for $type {
            fn expected_command() -> Command {
                $command
            }

            fn decode_payload(payload: &[u8]) -> io::Result<Self> {
                serde_json::from_slice(payload).map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }
    };
}

/// Request to leave, carrying the identity as a raw string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectRequest(pub ClientId);

/// Request to delete one of the sender's messages
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct DeleteRequest(pub Message);

/// Broadcast telling clients a message id is gone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteNotice(pub MessageId);

impl_codec!(LoginInput, Command::Connect);
impl_codec!(InitialPayload, Command::InitialPayload);
impl_codec!(HistoryEntry, Command::AddHistory);
impl_codec!(Message, Command::AddMessage);
impl_codec!(DeleteRequest, Command::DeleteMessage);

/// Decode a raw identifier payload. Clients that JSON-encode the string are
/// accepted too.
fn decode_raw_id(payload: &[u8]) -> io::Result<String> {
    let text = std::str::from_utf8(payload).map_err(|e| IoError::new(ErrorKind::InvalidData, e))?;
    let text = text.trim();
    let id = if text.starts_with('"') {
        serde_json::from_str::<String>(text).map_err(|e| IoError::new(ErrorKind::InvalidData, e))?
    } else {
        text.to_string()
    };

    if id.is_empty() {
        return Err(IoError::new(ErrorKind::InvalidData, "Empty identifier"));
    }
    Ok(id)
}

impl Encodable for DisconnectRequest {
    fn command(&self) -> Command {
        Command::Disconnect
    }

    fn encode_payload(&self) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.0.as_bytes()))
    }
}

impl Decodable for DisconnectRequest {
    fn expected_command() -> Command {
        Command::Disconnect
    }

    fn decode_payload(payload: &[u8]) -> io::Result<Self> {
        decode_raw_id(payload).map(Self)
    }
}

impl Encodable for DeleteNotice {
    fn command(&self) -> Command {
        Command::DeleteMessage
    }

    fn encode_payload(&self) -> io::Result<Bytes> {
        Ok(Bytes::copy_from_slice(self.0.as_bytes()))
    }
}

impl Decodable for DeleteNotice {
    fn expected_command() -> Command {
        Command::DeleteMessage
    }

    fn decode_payload(payload: &[u8]) -> io::Result<Self> {
        decode_raw_id(payload).map(Self)
    }
}

/// Frames a client may send to the hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Join(LoginInput),
    AddMessage(Message),
    DeleteMessage(Message),
    Disconnect(ClientId),
}

impl InboundFrame {
    /// Decode a frame received by the hub. Commands only the server emits are
    /// rejected.
    pub fn decode(frame: &Frame) -> io::Result<Self> {
        match frame.command {
            // An empty join payload is a plain guest join
            Command::Connect if frame.payload.is_empty() => Ok(Self::Join(LoginInput::default())),
            Command::Connect => Ok(Self::Join(LoginInput::decode_frame(frame)?)),
            Command::AddMessage => Ok(Self::AddMessage(Message::decode_frame(frame)?)),
            Command::DeleteMessage => Ok(Self::DeleteMessage(DeleteRequest::decode_frame(frame)?.0)),
            Command::Disconnect => Ok(Self::Disconnect(DisconnectRequest::decode_frame(frame)?.0)),
            Command::InitialPayload | Command::AddHistory => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("Command {} is not accepted by the hub", frame.command),
            )),
        }
    }

    /// Get the command of this frame
    pub fn command(&self) -> Command {
        match self {
            Self::Join(_) => Command::Connect,
            Self::AddMessage(_) => Command::AddMessage,
            Self::DeleteMessage(_) => Command::DeleteMessage,
            Self::Disconnect(_) => Command::Disconnect,
        }
    }
}

/// Frames the hub sends to clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    InitialPayload(InitialPayload),
    AddHistory(HistoryEntry),
    AddMessage(Message),
    MessageDeleted(MessageId),
}

impl OutboundFrame {
    /// Decode a frame received by a client
    pub fn decode(frame: &Frame) -> io::Result<Self> {
        match frame.command {
            Command::InitialPayload => Ok(Self::InitialPayload(InitialPayload::decode_frame(frame)?)),
            Command::AddHistory => Ok(Self::AddHistory(HistoryEntry::decode_frame(frame)?)),
            Command::AddMessage => Ok(Self::AddMessage(Message::decode_frame(frame)?)),
            Command::DeleteMessage => Ok(Self::MessageDeleted(DeleteNotice::decode_frame(frame)?.0)),
            Command::Connect | Command::Disconnect => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("Command {} is not sent by the hub", frame.command),
            )),
        }
    }
}

/// Encode a message directly to bytes (convenience function)
pub fn encode<T: Encodable>(msg: &T) -> io::Result<Bytes> {
    msg.encode_frame().map(|f| f.encode_to_bytes())
}

//! Protocol layer for the UDP chat hub
//!
//! This module provides:
//! - Command-token frame encoding/decoding
//! - Message type definitions
//! - Codec traits for serialization

pub mod codec;
pub mod frame;
pub mod messages;

// Re-export commonly used types
pub use codec::{
    DeleteNotice, DeleteRequest, DisconnectRequest, Decodable, Encodable, InboundFrame,
    OutboundFrame, encode,
};
pub use frame::{Command, DEFAULT_MAX_FRAME_SIZE, Frame, MAX_DATAGRAM_SIZE, TOKEN_DELIMITER};
pub use messages::*;

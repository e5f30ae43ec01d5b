//! Protocol message types for the chat system
//!
//! Every JSON payload that travels inside a frame. Field names are part of the
//! wire contract and must not change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable participant identity, reused across reconnects
pub type ClientId = String;
/// Hub-assigned message identifier
pub type MessageId = String;

/// Display name used when a participant has none or is unknown
pub const DEFAULT_USERNAME: &str = "guest";

/// Longest display name, measured as its JSON string (quotes included)
pub const MAX_DISPLAY_NAME_JSON_LEN: usize = 66;

/// Bytes `text` takes inside a JSON string, quotes excluded
fn json_escaped_len(text: &str) -> usize {
    serde_json::to_string(text)
        .map(|json| json.len() - 2)
        .unwrap_or(text.len() * 6)
}

/// Cut a display name so its JSON form fits [`MAX_DISPLAY_NAME_JSON_LEN`]
pub fn clamp_display_name(name: &str) -> String {
    let mut clamped = String::new();
    let mut encoded = 2;
    let mut buf = [0u8; 4];
    for ch in name.chars() {
        let width = json_escaped_len(ch.encode_utf8(&mut buf));
        if encoded + width > MAX_DISPLAY_NAME_JSON_LEN {
            break;
        }
        encoded += width;
        clamped.push(ch);
    }
    clamped
}

/// A chat message as stored in history and relayed to clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Assigned by the hub on acceptance
    pub id: MessageId,
    pub content: String,
    /// Display-only, resolved from the registry at send time
    pub author_name: String,
    /// Only populated on the author's own copy
    #[serde(skip_serializing_if = "String::is_empty")]
    pub author_id: ClientId,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
}

impl Message {
    /// Create an outgoing message as a client would send it
    pub fn outgoing(content: impl Into<String>, author_id: impl Into<ClientId>) -> Self {
        Self {
            content: content.into(),
            author_id: author_id.into(),
            ..Default::default()
        }
    }

    /// True when no author identity is attached
    pub fn is_anonymous(&self) -> bool {
        self.author_id.trim().is_empty()
    }

    /// Copy of this message as seen by `recipient`: the author identity is
    /// kept only when the recipient wrote it.
    pub fn for_recipient(&self, recipient: &str) -> Message {
        let mut copy = self.clone();
        if copy.author_id != recipient {
            copy.author_id.clear();
        }
        copy
    }

    /// Copy with the display-only fields removed, the form kept in storage
    pub fn stored_form(&self) -> Message {
        let mut copy = self.clone();
        copy.author_name.clear();
        copy
    }
}

/// Join request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginInput {
    pub username: String,
    /// Identity to resume; absent for a brand new participant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_id: Option<ClientId>,
}

impl LoginInput {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            assigned_id: None,
        }
    }

    pub fn resume(username: impl Into<String>, assigned_id: impl Into<ClientId>) -> Self {
        Self {
            username: username.into(),
            assigned_id: Some(assigned_id.into()),
        }
    }

    /// Identity to resume, treating a blank string as absent
    pub fn resume_id(&self) -> Option<&str> {
        self.assigned_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Requested display name, if a non-blank one was supplied, clamped to
    /// the display name limit
    pub fn requested_name(&self) -> Option<String> {
        let name = self.username.trim();
        (!name.is_empty()).then(|| clamp_display_name(name))
    }
}

/// First frame of every join: the identity to keep and how much history follows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialPayload {
    pub assigned_id: ClientId,
    pub history_length: usize,
}

/// One replayed history message tagged with its position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Zero-based position in the replay sequence
    pub order: usize,
    pub message: Message,
}

/// Persisted form of a session; the network address is never stored
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientRecord {
    pub name: String,
    pub online: bool,
    pub id: ClientId,
}

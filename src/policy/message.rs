// Relay message types — what comes in from the relay and what goes back.
//
// The relay hands us one InputMessage per line and expects exactly one
// OutputMessage per line in return. Field names follow the relay's JSON
// (camelCase on the envelope, snake_case on the event itself).

use serde::{Deserialize, Serialize};

/// A signed Nostr event. Policies treat it as read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u64,
    pub tags: Vec<Vec<String>>,
    pub content: String,
    pub sig: String,
}

impl Event {
    /// Iterate over the values of every tag with the given name
    /// (e.g. all pubkeys mentioned via `["p", <pubkey>]`).
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tags
            .iter()
            .filter(move |tag| tag.first().map(String::as_str) == Some(name))
            .filter_map(|tag| tag.get(1).map(String::as_str))
    }
}

/// Whether the event is arriving live or being replayed from history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    New,
    Lookback,
}

/// Where the event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    /// Direct client connection over IPv4; `source_info` is the address.
    #[serde(rename = "IP4")]
    Ip4,
    /// Direct client connection over IPv6; `source_info` is the address.
    #[serde(rename = "IP6")]
    Ip6,
    /// Bulk import from a file.
    Import,
    /// Streamed from another relay.
    Stream,
    /// Negentropy/peer sync.
    Sync,
}

impl SourceType {
    /// True when `source_info` identifies a network peer.
    pub fn is_ip(&self) -> bool {
        matches!(self, SourceType::Ip4 | SourceType::Ip6)
    }
}

/// One request from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub event: Event,
    pub received_at: u64,
    pub source_type: SourceType,
    pub source_info: String,
}

/// The verdict for a single event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Accept,
    Reject,
    /// Drop the event but tell the submitter it was accepted.
    ShadowReject,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Accept => "accept",
            Action::Reject => "reject",
            Action::ShadowReject => "shadowReject",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One response to the relay. `id` always echoes the input event's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputMessage {
    pub id: String,
    pub action: Action,
    pub msg: String,
}

impl OutputMessage {
    pub fn accept(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: Action::Accept,
            msg: String::new(),
        }
    }

    pub fn reject(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: Action::Reject,
            msg: msg.into(),
        }
    }

    /// Shadow rejections never explain themselves to the submitter.
    pub fn shadow_reject(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: Action::ShadowReject,
            msg: String::new(),
        }
    }

    pub fn is_accept(&self) -> bool {
        self.action == Action::Accept
    }
}

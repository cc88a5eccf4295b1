use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::types::{ClientId, IceServer};

/// Discriminator carried in the `type` field of every envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    /// Server greeting carrying the connection's own id
    Hello,
    /// ICE server list, sent right after hello
    IceServers,
    /// Session description offer; the only type the relay inspects
    Offer,
    /// Session description answer
    Answer,
    /// Trickled ICE candidate
    Candidate,
    /// Relay error reply (only when error replies are enabled)
    Error,
    /// Anything else peers agree on between themselves
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Hello => "hello",
            MessageType::IceServers => "iceServers",
            MessageType::Offer => "offer",
            MessageType::Answer => "answer",
            MessageType::Candidate => "candidate",
            MessageType::Error => "error",
            MessageType::Other(other) => other,
        }
    }
}

impl From<String> for MessageType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "hello" => MessageType::Hello,
            "iceServers" => MessageType::IceServers,
            "offer" => MessageType::Offer,
            "answer" => MessageType::Answer,
            "candidate" => MessageType::Candidate,
            "error" => MessageType::Error,
            _ => MessageType::Other(value),
        }
    }
}

impl From<MessageType> for String {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Other(other) => other,
            known => known.as_str().to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("envelope is not a JSON object")]
    NotAnObject,

    #[error("envelope has no destination id")]
    MissingDestination,

    #[error("offer has no sdp string")]
    MissingSdp,
}

/// A signaling message.
///
/// `type` and `id` are lifted into typed fields; everything else stays in
/// `fields` in the order the sender wrote it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<MessageType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ClientId>,

    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Envelope {
    pub fn new(kind: MessageType) -> Self {
        Self {
            kind: Some(kind),
            id: None,
            fields: Map::new(),
        }
    }

    /// Parse a text frame. Anything other than a JSON object is rejected.
    ///
    /// Deserialized straight from the text so numbers keep their literal
    /// form (`arbitrary_precision`); going through a `Value` first would
    /// collapse `-0` and `1.10`.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        if !text.trim_start().starts_with('{') {
            serde_json::from_str::<IgnoredAny>(text)?;
            return Err(EnvelopeError::NotAnObject);
        }
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn hello(id: ClientId) -> Self {
        Self::new(MessageType::Hello).with_id(id)
    }

    pub fn ice_servers(servers: &[IceServer]) -> Self {
        Self::new(MessageType::IceServers).with_field("iceServers", json!(servers))
    }

    pub fn error(reason: &str) -> Self {
        Self::new(MessageType::Error).with_field("reason", json!(reason))
    }

    pub fn with_id(mut self, id: ClientId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }

    pub fn is_offer(&self) -> bool {
        matches!(self.kind, Some(MessageType::Offer))
    }

    pub fn type_name(&self) -> &str {
        self.kind.as_ref().map(MessageType::as_str).unwrap_or("<untyped>")
    }

    /// Destination id of an inbound envelope
    pub fn destination(&self) -> Result<&ClientId, EnvelopeError> {
        self.id.as_ref().ok_or(EnvelopeError::MissingDestination)
    }

    pub fn sdp(&self) -> Result<&str, EnvelopeError> {
        self.fields
            .get("sdp")
            .and_then(Value::as_str)
            .ok_or(EnvelopeError::MissingSdp)
    }

    /// Replace the `sdp` field in place, keeping its position
    pub fn set_sdp(&mut self, sdp: String) {
        self.fields.insert("sdp".to_string(), Value::String(sdp));
    }
}

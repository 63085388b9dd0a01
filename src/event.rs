//! Typed events decoded from stream payloads.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Discriminator of incremental text fragments.
pub const TOKEN_KIND: &str = "token";

/// Discriminator of the final structured result.
pub const MESSAGE_KIND: &str = "message";

/// Reasons a payload could not become a [`StreamEvent`].
#[derive(Error, Debug)]
pub enum EventError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token value is not text: {0}")]
    TokenNotText(Value),

    #[error("message value has an unexpected shape: {0}")]
    Message(#[source] serde_json::Error),
}

/// One decoded event of the chat stream.
///
/// `M` is the shape of the final message value. It defaults to raw JSON so
/// the payload can be passed through verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<M = Value> {
    /// Text fragment to append to the in-progress response.
    Token(String),

    /// Fully-formed result for the current request.
    Message(M),

    /// An event kind this client does not know yet, forwarded unchanged.
    Other { kind: String, value: Value },
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    value: Value,
}

impl<M: DeserializeOwned> StreamEvent<M> {
    /// Decode a JSON payload taken from a `data:` line.
    ///
    /// # Example
    /// ```
    /// use chatstream::event::StreamEvent;
    ///
    /// let event: StreamEvent = StreamEvent::from_payload(r#"{"type":"token","value":"He"}"#).unwrap();
    /// assert_eq!(event, StreamEvent::Token("He".to_string()));
    /// ```
    pub fn from_payload(payload: &str) -> Result<Self, EventError> {
        let raw: RawEvent = serde_json::from_str(payload)?;

        match raw.kind.as_str() {
            TOKEN_KIND => match raw.value {
                Value::String(text) => Ok(StreamEvent::Token(text)),
                other => Err(EventError::TokenNotText(other)),
            },
            MESSAGE_KIND => serde_json::from_value(raw.value)
                .map(StreamEvent::Message)
                .map_err(EventError::Message),
            _ => Ok(StreamEvent::Other {
                kind: raw.kind,
                value: raw.value,
            }),
        }
    }
}

impl<M> StreamEvent<M> {
    /// The wire discriminator of this event.
    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::Token(_) => TOKEN_KIND,
            StreamEvent::Message(_) => MESSAGE_KIND,
            StreamEvent::Other { kind, .. } => kind.as_str(),
        }
    }

    pub fn as_token(&self) -> Option<&str> {
        match self {
            StreamEvent::Token(text) => Some(text),
            _ => None,
        }
    }

    pub fn into_message(self) -> Option<M> {
        match self {
            StreamEvent::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self, StreamEvent::Message(_))
    }
}

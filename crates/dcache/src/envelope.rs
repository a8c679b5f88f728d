use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Serialized envelopes longer than this are logged as oversized.
/// Channels are expected to be low-bandwidth.
pub const MAX_ENVELOPE_LEN: usize = 512;

/// Decoding an envelope line failed.
#[derive(Debug, thiserror::Error)]
#[error("not an envelope: {0}")]
pub struct EnvelopeError(#[from] serde_json::Error);

/// Transport framing around one encoded message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Sending node
    pub from: String,
    /// Destination channel
    pub to: String,
    /// The encoded inner message
    pub payload: String,
    /// Free text for humans reading the traffic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Envelope {
    /// Constructor
    pub fn new(from: impl Into<String>, to: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            payload: payload.into(),
            comment: None,
        }
    }

    /// Attach a comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// The JSON form, without any size check.
    pub fn to_json(&self) -> String {
        let mut v = json!({
            "from": self.from,
            "to": self.to,
            "payload": self.payload,
        });
        if let (Some(comment), Value::Object(map)) = (&self.comment, &mut v) {
            map.insert("comment".to_string(), Value::String(comment.clone()));
        }
        v.to_string()
    }

    /// The JSON form, warning if it exceeds [`MAX_ENVELOPE_LEN`].
    pub fn to_line(&self) -> String {
        let line = self.to_json();
        if line.len() > MAX_ENVELOPE_LEN {
            tracing::warn!(
                len = line.len(),
                max = MAX_ENVELOPE_LEN,
                to = %self.to,
                "oversized envelope"
            );
        }
        line
    }

    /// Parse one line.
    pub fn from_line(line: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(line)?)
    }
}

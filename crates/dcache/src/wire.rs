//! The wire codec: one JSON object per message, discriminated by `mtype`.
//!
//! Decoding is strict. Unknown `mtype`s, missing fields, extra fields and
//! wrongly typed fields are all refused with [`CouldNotInterpret`], so a
//! newer sender cannot have its messages half-understood by an older node.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::path::BucketPath;
use crate::proposal::Validity;

/// The discriminator key present on every message.
pub const MTYPE: &str = "mtype";

/// Which kind of message; the value of `mtype` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// `propose`
    Propose,
    /// `dismiss`
    Dismiss,
    /// `signature`
    Signature,
    /// `ping`
    Ping,
    /// `pong`
    Pong,
    /// `req`
    #[serde(rename = "req")]
    Request,
    /// `command`
    Command,
}

impl MessageKind {
    /// The `mtype` string
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Propose => "propose",
            MessageKind::Dismiss => "dismiss",
            MessageKind::Signature => "signature",
            MessageKind::Ping => "ping",
            MessageKind::Pong => "pong",
            MessageKind::Request => "req",
            MessageKind::Command => "command",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = CouldNotInterpret;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "propose" => MessageKind::Propose,
            "dismiss" => MessageKind::Dismiss,
            "signature" => MessageKind::Signature,
            "ping" => MessageKind::Ping,
            "pong" => MessageKind::Pong,
            "req" => MessageKind::Request,
            "command" => MessageKind::Command,
            other => return Err(CouldNotInterpret::UnknownType(other.to_string())),
        })
    }
}

/// Body of a propose or dismiss: `data` in `bucket` during `validity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Claim {
    /// Target bucket
    #[serde(rename = "bucket")]
    pub buckets: BucketPath,
    /// Fact name
    pub data: String,
    /// When the claim holds
    pub validity: Validity,
}

/// A signer vouching for the message whose content hash is `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Signature {
    /// Identity of the signer
    pub signer: String,
    /// Content hash of the signed message
    pub data: String,
    /// Opaque signature text
    pub signature: String,
}

/// Body of ping and pong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Keepalive {
    /// When the probe holds
    pub validity: Validity,
}

/// A peer asking to be told about the given buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    /// Bucket paths of interest
    pub patterns: Vec<String>,
    /// When the request holds
    pub validity: Validity,
}

/// A free-form instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Command {
    /// Command name
    pub command: String,
    /// Arbitrary parameters
    pub parameters: Value,
    /// When the command holds
    pub validity: Validity,
}

/// Every message shape the protocol knows.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Claim a fact is valid
    Propose(Claim),
    /// Revoke a fact
    Dismiss(Claim),
    /// Vouch for another message
    Signature(Signature),
    /// Keepalive probe
    Ping(Keepalive),
    /// Keepalive answer
    Pong(Keepalive),
    /// Ask for buckets
    Request(Request),
    /// Instruction
    Command(Command),
}

/// Decoding failed; the message should be logged and dropped.
#[derive(Debug, thiserror::Error)]
pub enum CouldNotInterpret {
    /// Not JSON at all
    #[error("not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON, but not an object
    #[error("message is not a json object")]
    NotAnObject,

    /// No `mtype` key, or it is not a string
    #[error("message has no string mtype")]
    MissingType,

    /// `mtype` names no known message
    #[error("unknown mtype {0:?}")]
    UnknownType(String),

    /// Missing, extra or wrongly typed fields
    #[error("bad fields for {kind}: {source}")]
    Fields {
        /// The message kind being decoded
        kind: MessageKind,
        /// What serde complained about
        source: serde_json::Error,
    },
}

impl Message {
    /// A propose message
    pub fn propose(buckets: impl Into<BucketPath>, data: impl Into<String>, validity: Validity) -> Self {
        Message::Propose(Claim {
            buckets: buckets.into(),
            data: data.into(),
            validity,
        })
    }

    /// A dismiss message
    pub fn dismiss(buckets: impl Into<BucketPath>, data: impl Into<String>, validity: Validity) -> Self {
        Message::Dismiss(Claim {
            buckets: buckets.into(),
            data: data.into(),
            validity,
        })
    }

    /// A signature message
    pub fn signature(
        signer: impl Into<String>,
        data: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        Message::Signature(Signature {
            signer: signer.into(),
            data: data.into(),
            signature: signature.into(),
        })
    }

    /// The `mtype` of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Propose(_) => MessageKind::Propose,
            Message::Dismiss(_) => MessageKind::Dismiss,
            Message::Signature(_) => MessageKind::Signature,
            Message::Ping(_) => MessageKind::Ping,
            Message::Pong(_) => MessageKind::Pong,
            Message::Request(_) => MessageKind::Request,
            Message::Command(_) => MessageKind::Command,
        }
    }

    /// Encode as a single JSON line.
    ///
    /// The output is deterministic, so re-encoding a decoded message
    /// reproduces the same content hash.
    pub fn encode(&self) -> String {
        let mtype = self.kind().as_str();
        let v = match self {
            Message::Propose(c) | Message::Dismiss(c) => json!({
                "mtype": mtype,
                "bucket": c.buckets,
                "data": c.data,
                "validity": c.validity,
            }),
            Message::Signature(s) => json!({
                "mtype": mtype,
                "signer": s.signer,
                "data": s.data,
                "signature": s.signature,
            }),
            Message::Ping(k) | Message::Pong(k) => json!({
                "mtype": mtype,
                "validity": k.validity,
            }),
            Message::Request(r) => json!({
                "mtype": mtype,
                "patterns": r.patterns,
                "validity": r.validity,
            }),
            Message::Command(c) => json!({
                "mtype": mtype,
                "command": c.command,
                "parameters": c.parameters,
                "validity": c.validity,
            }),
        };
        v.to_string()
    }
}

/// Decode one wire line.
pub fn interpret_message(s: &str) -> Result<Message, CouldNotInterpret> {
    let mut map = match serde_json::from_str::<Value>(s)? {
        Value::Object(map) => map,
        _ => return Err(CouldNotInterpret::NotAnObject),
    };
    let kind: MessageKind = match map.remove(MTYPE) {
        Some(Value::String(t)) => t.parse()?,
        _ => return Err(CouldNotInterpret::MissingType),
    };

    Ok(match kind {
        MessageKind::Propose => Message::Propose(fields(kind, map)?),
        MessageKind::Dismiss => Message::Dismiss(fields(kind, map)?),
        MessageKind::Signature => Message::Signature(fields(kind, map)?),
        MessageKind::Ping => Message::Ping(fields(kind, map)?),
        MessageKind::Pong => Message::Pong(fields(kind, map)?),
        MessageKind::Request => Message::Request(fields(kind, map)?),
        MessageKind::Command => Message::Command(fields(kind, map)?),
    })
}

fn fields<T: DeserializeOwned>(kind: MessageKind, map: Map<String, Value>) -> Result<T, CouldNotInterpret> {
    serde_json::from_value(Value::Object(map))
        .map_err(|source| CouldNotInterpret::Fields { kind, source })
}

//! Message model and JSON intake envelope.
//!
//! The envelope keeps `data` as `RawValue` so intake can validate headers
//! before paying for payload parsing.

use std::time::Instant;

use bytes::Bytes;
use serde::Deserialize;
use serde_json::value::RawValue;
use serde_json::{Number, Value};

use crate::error::{MyceliaError, Result};
use crate::path::normalize;

/// Kernel-assigned message identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MessageId(pub u64);

/// Message body variants.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Structured JSON.
    Json(Value),
    /// Opaque bytes (zero-copy clone).
    Bytes(Bytes),
    #[default]
    Empty,
}

impl Payload {
    /// Payload size in bytes (JSON is measured serialized).
    pub fn len(&self) -> usize {
        match self {
            Payload::Json(v) => serde_json::to_vec(v).map(|b| b.len()).unwrap_or(0),
            Payload::Bytes(b) => b.len(),
            Payload::Empty => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A routed message.
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MessageId,
    pub path: String,
    pub payload: Payload,
    /// Scopes granted to the sender.
    pub scopes: Vec<String>,
    pub created_at: Instant,
}

impl Message {
    pub fn new(path: &str, payload: Payload) -> Result<Self> {
        Ok(Self {
            id: MessageId::default(),
            path: normalize(path)?,
            payload,
            scopes: Vec::new(),
            created_at: Instant::now(),
        })
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = id;
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// JSON intake envelope.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    /// Protocol version. Any JSON number decodes; only `1` is accepted.
    pub v: Number,
    /// Destination path.
    pub path: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Optional payload, stored as raw JSON (lazy parsing).
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl Envelope {
    pub fn from_json(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map_err(|e| MyceliaError::BadRequest(format!("decode failed: {e}")))
    }

    pub fn into_message(self) -> Result<Message> {
        if self.v.as_u64() != Some(1) {
            return Err(MyceliaError::UnsupportedVersion);
        }
        let payload = match self.data {
            Some(raw) => Payload::Json(
                serde_json::from_str(raw.get())
                    .map_err(|e| MyceliaError::BadRequest(format!("invalid data: {e}")))?,
            ),
            None => Payload::Empty,
        };
        Ok(Message::new(&self.path, payload)?.with_scopes(self.scopes))
    }
}

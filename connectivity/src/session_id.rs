//! Session identifiers
//!
//! A [`SessionId`] is an opaque 128-bit value. Its text form is URL-safe
//! base64 without padding; its binary form is exactly 16 bytes. The all-zero
//! value is the [`SessionId::EMPTY`] sentinel.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Length of the binary form of a session id
pub const SESSION_ID_LEN: usize = 16;

/// Malformed session id input
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionIdError {
    #[error("Session ids must be 16 bytes long, got {0}")]
    InvalidLength(usize),

    #[error("Invalid session id text '{text}': {reason}")]
    InvalidText { text: String, reason: String },
}

/// Identifier of a client session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SessionId([u8; SESSION_ID_LEN]);

impl SessionId {
    /// The empty session id (all zero bits)
    pub const EMPTY: SessionId = SessionId([0; SESSION_ID_LEN]);

    /// Generate a new random session id
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().into_bytes())
    }

    /// Build a session id from its binary form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionIdError> {
        let raw: [u8; SESSION_ID_LEN] = bytes
            .try_into()
            .map_err(|_| SessionIdError::InvalidLength(bytes.len()))?;
        Ok(Self(raw))
    }

    /// Parse the text form. An empty string yields [`SessionId::EMPTY`].
    pub fn from_text(text: &str) -> Result<Self, SessionIdError> {
        if text.is_empty() {
            return Ok(Self::EMPTY);
        }

        let mut incoming = text.replace('_', "/").replace('-', "+");
        match text.len() % 4 {
            2 => incoming.push_str("=="),
            3 => incoming.push('='),
            _ => {}
        }

        let bytes = STANDARD
            .decode(incoming.as_bytes())
            .map_err(|e| SessionIdError::InvalidText {
                text: text.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_bytes(&bytes)
    }

    /// Text form: standard base64 with `+`/`/` swapped for `-`/`_`, padding stripped
    pub fn to_text(&self) -> String {
        STANDARD
            .encode(self.0)
            .trim_end_matches('=')
            .replace('+', "-")
            .replace('/', "_")
    }

    /// Whether this is the empty sentinel
    pub fn is_empty(&self) -> bool {
        self.0 == [0; SESSION_ID_LEN]
    }

    pub fn as_bytes(&self) -> &[u8; SESSION_ID_LEN] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; SESSION_ID_LEN] {
        self.0
    }

    /// Copy the binary form into `destination`.
    ///
    /// Returns false without writing if the destination is too short.
    pub fn write_to(&self, destination: &mut [u8]) -> bool {
        match destination.get_mut(..SESSION_ID_LEN) {
            Some(slot) => {
                slot.copy_from_slice(&self.0);
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for SessionId {
    type Err = SessionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}

impl TryFrom<&[u8]> for SessionId {
    type Error = SessionIdError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        Self::from_bytes(bytes)
    }
}

impl From<[u8; SESSION_ID_LEN]> for SessionId {
    fn from(raw: [u8; SESSION_ID_LEN]) -> Self {
        Self(raw)
    }
}

impl Serialize for SessionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

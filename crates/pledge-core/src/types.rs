//! Core value types shared by records, handles and the manager

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// Unique promise identifier.
///
/// All 128 bits come from the thread-local CSPRNG; the value is only laid out
/// like a UUID for display and storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromiseId(Uuid);

impl PromiseId {
    /// Draw a fresh identifier
    pub fn generate() -> Self {
        Self(Uuid::from_bytes(rand::random::<[u8; 16]>()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Storage key form
    pub fn key(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl std::fmt::Display for PromiseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for PromiseId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Value a promise is fulfilled with.
///
/// Tagged so a persisted payload is read back with the same shape it was written with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Unit,
    Bool(bool),
    Int(i64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Payload::Text(s.to_string())
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Payload::Text(s)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Int(n)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Payload::Json(value)
    }
}

impl std::fmt::Display for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Unit => write!(f, "()"),
            Payload::Bool(b) => write!(f, "{}", b),
            Payload::Int(n) => write!(f, "{}", n),
            Payload::Text(s) => write!(f, "{:?}", s),
            Payload::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Payload::Json(v) => write!(f, "{}", v),
        }
    }
}

/// Operation context tying a promise to the outbound request it represents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    /// Account the operation ran under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Network session the request went out on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,

    /// Outbound request identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Correlation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Why a promise was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The counterpart operation reported a failure
    Failed,
    /// Stale sweep gave up on an unresolved promise
    Timeout,
    /// The record disappeared while a handle was still waiting on it
    Abandoned,
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionKind::Failed => write!(f, "failed"),
            RejectionKind::Timeout => write!(f, "timeout"),
            RejectionKind::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// Structured rejection reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub message: String,
}

impl Rejection {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Failed,
            message: message.into(),
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Timeout,
            message: message.into(),
        }
    }

    pub fn abandoned(message: impl Into<String>) -> Self {
        Self {
            kind: RejectionKind::Abandoned,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promise_id_generation() {
        let a = PromiseId::generate();
        let b = PromiseId::generate();
        assert_ne!(a, b);

        let parsed: PromiseId = a.to_string().parse().unwrap();
        assert_eq!(parsed, a);
        assert_eq!(a.key(), a.to_string());
    }

    #[test]
    fn test_payload_is_tagged() {
        let json = serde_json::to_value(Payload::from("pong")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "text", "value": "pong"}));

        let unit = serde_json::to_value(Payload::Unit).unwrap();
        assert_eq!(unit, serde_json::json!({"type": "unit"}));
    }

    #[test]
    fn test_correlation_skips_empty_fields() {
        let correlation = Correlation::new().with_account("alice@example.org");
        let json = serde_json::to_value(&correlation).unwrap();
        assert_eq!(json, serde_json::json!({"account": "alice@example.org"}));
    }

    #[test]
    fn test_rejection_display() {
        let rejection = Rejection::timeout("no answer after 3600s");
        assert_eq!(rejection.to_string(), "timeout: no answer after 3600s");
    }
}

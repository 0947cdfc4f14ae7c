//! Durable promise record and its state machine
//!
//! A record moves `Unresolved → Fulfilled` or `Unresolved → Rejected` exactly once.
//! Terminal states are final; [`PromiseRecord::settle`] refuses a second transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PledgeError, Result};
use crate::types::{Correlation, Payload, PromiseId, Rejection};

/// Version of the on-disk record encoding
pub const RECORD_SCHEMA: u32 = 1;

/// Lifecycle state of a promise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PromiseState {
    Unresolved,
    Fulfilled {
        payload: Payload,
    },
    Rejected {
        error: Rejection,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        correlation: Option<Correlation>,
    },
}

impl PromiseState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PromiseState::Unresolved)
    }

    pub fn label(&self) -> &'static str {
        match self {
            PromiseState::Unresolved => "unresolved",
            PromiseState::Fulfilled { .. } => "fulfilled",
            PromiseState::Rejected { .. } => "rejected",
        }
    }
}

impl std::fmt::Display for PromiseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Terminal value delivered to continuation observers
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fulfilled(Payload),
    Rejected {
        error: Rejection,
        correlation: Option<Correlation>,
    },
}

impl Outcome {
    pub fn rejected(error: Rejection) -> Self {
        Outcome::Rejected {
            error,
            correlation: None,
        }
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Outcome::Fulfilled(payload) => Some(payload),
            Outcome::Rejected { .. } => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Outcome::Fulfilled(_) => None,
            Outcome::Rejected { error, .. } => Some(error),
        }
    }
}

impl From<Outcome> for PromiseState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Fulfilled(payload) => PromiseState::Fulfilled { payload },
            Outcome::Rejected { error, correlation } => PromiseState::Rejected { error, correlation },
        }
    }
}

/// Serializable state of one promise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub id: PromiseId,
    pub state: PromiseState,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<Correlation>,
}

impl PromiseRecord {
    /// Fresh unresolved record with a newly drawn identifier
    pub fn new(correlation: Option<Correlation>) -> Self {
        Self {
            id: PromiseId::generate(),
            state: PromiseState::Unresolved,
            created_at: Utc::now(),
            correlation,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Terminal outcome, if any
    pub fn outcome(&self) -> Option<Outcome> {
        match &self.state {
            PromiseState::Unresolved => None,
            PromiseState::Fulfilled { payload } => Some(Outcome::Fulfilled(payload.clone())),
            PromiseState::Rejected { error, correlation } => Some(Outcome::Rejected {
                error: error.clone(),
                correlation: correlation.clone(),
            }),
        }
    }

    /// Apply the single allowed transition out of `Unresolved`.
    pub fn settle(&mut self, outcome: Outcome) -> Result<()> {
        if self.state.is_terminal() {
            return Err(PledgeError::AlreadyResolved {
                id: self.id,
                state: self.state.label().to_string(),
            });
        }
        self.state = outcome.into();
        Ok(())
    }

    /// Time elapsed since creation; zero if the clock went backwards
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.age(now) >= threshold
    }

    /// Encode for the record store
    pub fn encode(&self) -> Result<Vec<u8>> {
        let envelope = EnvelopeRef {
            schema: RECORD_SCHEMA,
            record: self,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    /// Decode bytes stored under `id`
    pub fn decode(id: PromiseId, bytes: &[u8]) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_slice(bytes).map_err(|e| PledgeError::CorruptRecord {
                id,
                reason: e.to_string(),
            })?;

        if envelope.schema != RECORD_SCHEMA {
            return Err(PledgeError::CorruptRecord {
                id,
                reason: format!("unsupported schema version {}", envelope.schema),
            });
        }
        if envelope.record.id != id {
            return Err(PledgeError::CorruptRecord {
                id,
                reason: format!("stored under foreign id {}", envelope.record.id),
            });
        }

        Ok(envelope.record)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    schema: u32,
    record: &'a PromiseRecord,
}

#[derive(Deserialize)]
struct Envelope {
    schema: u32,
    record: PromiseRecord,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RejectionKind;

    #[test]
    fn test_new_record_is_unresolved() {
        let record = PromiseRecord::new(None);
        assert_eq!(record.state, PromiseState::Unresolved);
        assert!(!record.is_terminal());
        assert!(record.outcome().is_none());
    }

    #[test]
    fn test_settle_once() {
        let mut record = PromiseRecord::new(None);
        record.settle(Outcome::Fulfilled("pong".into())).unwrap();
        assert!(record.is_terminal());

        let err = record
            .settle(Outcome::rejected(Rejection::failed("late error")))
            .unwrap_err();
        assert!(matches!(err, PledgeError::AlreadyResolved { .. }));
        assert_eq!(record.outcome(), Some(Outcome::Fulfilled("pong".into())));
    }

    #[test]
    fn test_encode_decode_preserves_rejection_context() {
        let correlation = Correlation::new()
            .with_account("alice@example.org")
            .with_request("iq-42");
        let mut record = PromiseRecord::new(Some(correlation.clone()));
        record
            .settle(Outcome::Rejected {
                error: Rejection::failed("service-unavailable"),
                correlation: Some(correlation),
            })
            .unwrap();

        let bytes = record.encode().unwrap();
        let decoded = PromiseRecord::decode(record.id, &bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(
            decoded.outcome().unwrap().rejection().unwrap().kind,
            RejectionKind::Failed
        );
    }

    #[test]
    fn test_decode_rejects_foreign_id() {
        let record = PromiseRecord::new(None);
        let bytes = record.encode().unwrap();
        let err = PromiseRecord::decode(PromiseId::generate(), &bytes).unwrap_err();
        assert!(matches!(err, PledgeError::CorruptRecord { .. }));
    }

    #[test]
    fn test_decode_rejects_unknown_schema() {
        let record = PromiseRecord::new(None);
        let mut value: serde_json::Value = serde_json::from_slice(&record.encode().unwrap()).unwrap();
        value["schema"] = serde_json::json!(99);
        let bytes = serde_json::to_vec(&value).unwrap();

        let err = PromiseRecord::decode(record.id, &bytes).unwrap_err();
        assert!(err.to_string().contains("schema"));
    }

    #[test]
    fn test_staleness() {
        let mut record = PromiseRecord::new(None);
        record.created_at = Utc::now() - chrono::Duration::seconds(120);

        let now = Utc::now();
        assert!(record.is_stale(now, Duration::from_secs(60)));
        assert!(!record.is_stale(now, Duration::from_secs(3600)));
        assert!(record.is_stale(now, Duration::ZERO));
    }
}

//! Request ledger records.
//!
//! A ledger row stands in for a cross-process mutex: at most one non-terminal
//! row may exist per `(fingerprint, kind)`.
//!
//! # State Transition Diagram
//!
//! ```text
//! (none) ── try_acquire ──→ Pending ── mark_processing ──→ Processing
//!                              │                               │
//!                              └────────── complete ───────────┴──→ Completed | Failed
//!                                                                        ↑
//!                                              reclaim_stale ────────────┘ (Failed)
//! ```

use crate::artifact::{ArtifactKind, ParseEnumError};
use crate::fingerprint::Fingerprint;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle state of a generation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    /// Statuses that still hold the coalescing slot.
    pub const IN_FLIGHT: [RequestStatus; 2] = [RequestStatus::Pending, RequestStatus::Processing];

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    pub fn as_db_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ParseEnumError> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            _ => Err(ParseEnumError::new("request status", s)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for RequestStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Terminal status an owner may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Completed,
    Failed,
}

impl From<CompletionStatus> for RequestStatus {
    fn from(status: CompletionStatus) -> Self {
        match status {
            CompletionStatus::Completed => RequestStatus::Completed,
            CompletionStatus::Failed => RequestStatus::Failed,
        }
    }
}

/// One generation attempt tracked in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub kind: ArtifactKind,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub updated_at: Timestamp,
}

impl RequestRecord {
    /// A fresh pending record owned by the caller that inserts it.
    pub fn pending(fingerprint: Fingerprint, kind: ArtifactKind, now: Timestamp) -> Self {
        Self {
            id: Uuid::now_v7(),
            fingerprint,
            kind,
            status: RequestStatus::Pending,
            created_at: now,
            started_at: None,
            updated_at: now,
        }
    }

    /// When the attempt began; pending rows fall back to their creation time.
    pub fn started_or_created(&self) -> Timestamp {
        self.started_at.unwrap_or(self.created_at)
    }

    /// A non-terminal record that began more than `max_age` before `now`.
    pub fn is_stale(&self, now: Timestamp, max_age: Duration) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match chrono::Duration::from_std(max_age) {
            Ok(max_age) => self.started_or_created() + max_age < now,
            Err(_) => false,
        }
    }
}

/// Result of an atomic acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The caller inserted the record and owns the generation.
    Acquired(RequestRecord),
    /// Another attempt holds the slot; the caller should wait on this record.
    AlreadyInFlight(RequestRecord),
}

impl AcquireOutcome {
    pub fn record(&self) -> &RequestRecord {
        match self {
            AcquireOutcome::Acquired(record) | AcquireOutcome::AlreadyInFlight(record) => record,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record() -> RequestRecord {
        RequestRecord::pending(
            Fingerprint::from_stored("ab".repeat(32)),
            ArtifactKind::Image,
            Utc::now(),
        )
    }

    #[test]
    fn test_status_terminality() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::Processing.is_terminal());
        assert!(RequestStatus::Completed.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("PROCESSING".parse::<RequestStatus>(), Ok(RequestStatus::Processing));
        assert!("done".parse::<RequestStatus>().is_err());
    }

    #[test]
    fn test_staleness_uses_started_at() {
        let mut r = record();
        let now = r.created_at + chrono::Duration::minutes(90);
        assert!(r.is_stale(now, Duration::from_secs(3600)));

        r.started_at = Some(r.created_at + chrono::Duration::minutes(60));
        assert!(!r.is_stale(now, Duration::from_secs(3600)));
    }

    #[test]
    fn test_terminal_records_are_never_stale() {
        let mut r = record();
        r.status = RequestStatus::Failed;
        let now = r.created_at + chrono::Duration::days(2);
        assert!(!r.is_stale(now, Duration::from_secs(60)));
    }
}

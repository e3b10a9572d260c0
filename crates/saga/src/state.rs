//! Saga status state machine.

use serde::{Deserialize, Serialize};

/// The lifecycle status of a saga log entry.
///
/// Transitions:
/// ```text
/// STARTED ──► IN_PROGRESS ──┬──► COMPLETED
///    │                      │
///    └──────────────────────┴──► COMPENSATING ──┬──► COMPENSATED
///                                               └──► FAILED
/// ```
///
/// COMPLETED, COMPENSATED and FAILED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SagaStatus {
    /// Saga created; only the initiation step has run.
    #[default]
    Started,

    /// A step beyond initiation is executing or has executed.
    InProgress,

    /// Every step completed (terminal).
    Completed,

    /// A compensation step failed; the saga needs operator attention
    /// (terminal).
    Failed,

    /// A step failed and the backward chain is running.
    Compensating,

    /// Every previously-completed step has been compensated (terminal).
    Compensated,
}

impl SagaStatus {
    /// Returns true if `next` is a legal transition from this status.
    pub fn can_transition_to(self, next: SagaStatus) -> bool {
        use SagaStatus::*;
        matches!(
            (self, next),
            (Started, InProgress)
                | (Started, Compensating)
                | (InProgress, Completed)
                | (InProgress, Compensating)
                | (Compensating, Compensated)
                | (Compensating, Failed)
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaStatus::Completed | SagaStatus::Compensated | SagaStatus::Failed
        )
    }

    /// Returns true while forward steps may still run.
    pub fn is_forward(&self) -> bool {
        matches!(self, SagaStatus::Started | SagaStatus::InProgress)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Started => "STARTED",
            SagaStatus::InProgress => "IN_PROGRESS",
            SagaStatus::Completed => "COMPLETED",
            SagaStatus::Failed => "FAILED",
            SagaStatus::Compensating => "COMPENSATING",
            SagaStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SagaStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(SagaStatus::Started),
            "IN_PROGRESS" => Ok(SagaStatus::InProgress),
            "COMPLETED" => Ok(SagaStatus::Completed),
            "FAILED" => Ok(SagaStatus::Failed),
            "COMPENSATING" => Ok(SagaStatus::Compensating),
            "COMPENSATED" => Ok(SagaStatus::Compensated),
            other => Err(format!("unknown saga status: {other}")),
        }
    }
}

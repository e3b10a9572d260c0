//! Saga protocol errors.

use thiserror::Error;

use crate::event::EventType;
use crate::state::SagaStatus;
use crate::step::StepName;

/// Violations of the saga protocol.
///
/// These indicate a bug or corrupted state rather than an expected
/// business outcome; request handlers surface them as internal errors.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step was asked to complete before a preceding step had completed.
    #[error("step {step} cannot complete before {missing} has completed")]
    StepOrder { step: StepName, missing: StepName },

    /// A status transition outside the state machine was attempted.
    #[error("invalid saga status transition {from} -> {to}")]
    InvalidTransition { from: SagaStatus, to: SagaStatus },

    /// An outbox event was built for a type with no dispatch target.
    #[error("event type {0} has no dispatch target")]
    Unroutable(EventType),
}

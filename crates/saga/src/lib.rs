//! Saga protocol for the order-fulfillment workflow.
//!
//! Defines the fixed four-step chain
//! CREATE_ORDER → PROCESS_PAYMENT → UPDATE_INVENTORY → DELIVER_ORDER,
//! the persistent saga log that records per-step progress, the saga status
//! state machine, and the outbox event alphabet with its compile-time
//! routing. On failure at any step the failing service emits a backward
//! event and the chain compensates toward the Order service.

pub mod error;
pub mod event;
pub mod log;
pub mod state;
pub mod step;

pub use error::SagaError;
pub use event::{EventType, OutboxEvent, TargetService};
pub use log::{SagaLog, SagaStep};
pub use state::SagaStatus;
pub use step::{CompensationStatus, StepName, StepStatus};

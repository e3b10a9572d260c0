//! Shared identifier types and the wire envelope used by every service.

pub mod envelope;
pub mod types;

pub use envelope::ApiResponse;
pub use types::{
    CustomerId, EventId, IdempotencyKey, OrderId, PaymentId, ReservationId, SagaId, ShipmentId,
};

/// Request header carrying the deduplication key on every forward and
/// compensation call.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

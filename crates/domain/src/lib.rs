//! Participant domain records for the order-fulfillment saga.
//!
//! Each service owns one record type keyed by its primary id and carrying
//! the idempotency anchor for the forward request plus an optional
//! compensation key. Rows are created on the first successful forward call
//! and updated in place on compensation, never deleted.

pub mod inventory;
pub mod order;
pub mod payment;
pub mod shipment;

use thiserror::Error;

pub use inventory::{
    DEFAULT_INITIAL_STOCK, InsufficientStock, InventoryItem, InventoryReservation,
    ReservationStatus,
};
pub use order::{Order, OrderStatus};
pub use payment::{
    FixedOutcomeAuthorizer, Payment, PaymentAuthorizer, PaymentDeclined, PaymentStatus,
    SimulatedAuthorizer,
};
pub use shipment::{Shipment, ShipmentStatus};

/// A stored status string that no current enum variant matches.
#[derive(Debug, Clone, Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownStatus {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

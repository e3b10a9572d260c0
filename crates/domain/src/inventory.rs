//! Inventory stock and reservation records.

use chrono::{DateTime, Utc};
use common::{IdempotencyKey, OrderId, ReservationId, SagaId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::UnknownStatus;

/// Stock auto-created for a product the first time it is reserved.
pub const DEFAULT_INITIAL_STOCK: i32 = 100;

/// Per-product stock row. `0 <= reserved_quantity <= quantity` holds at all
/// times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub product_id: String,
    pub quantity: i32,
    pub reserved_quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl InventoryItem {
    pub fn new(product_id: impl Into<String>, quantity: i32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            reserved_quantity: 0,
            created_at: Utc::now(),
        }
    }

    /// Units that can still be reserved.
    pub fn available(&self) -> i32 {
        self.quantity - self.reserved_quantity
    }

    /// Reserves `quantity` units: decrements stock and increments the
    /// reserved count, or fails without touching the row.
    pub fn reserve(&mut self, quantity: i32) -> Result<(), InsufficientStock> {
        if self.available() < quantity {
            return Err(InsufficientStock {
                product_id: self.product_id.clone(),
                requested: quantity,
                available: self.available(),
            });
        }
        self.quantity -= quantity;
        self.reserved_quantity += quantity;
        Ok(())
    }

    /// Restores `quantity` units released by a compensation.
    pub fn restore(&mut self, quantity: i32) {
        self.quantity += quantity;
        self.reserved_quantity = (self.reserved_quantity - quantity).max(0);
    }
}

/// Reservation rejected for lack of stock.
#[derive(Debug, Clone, Error)]
#[error("Insufficient inventory for {product_id}: requested {requested}, available {available}")]
pub struct InsufficientStock {
    pub product_id: String,
    pub requested: i32,
    pub available: i32,
}

/// Lifecycle of a reservation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Reserved,
    Compensated,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Reserved => "RESERVED",
            ReservationStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReservationStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RESERVED" => Ok(ReservationStatus::Reserved),
            "COMPENSATED" => Ok(ReservationStatus::Compensated),
            other => Err(UnknownStatus::new("reservation", other)),
        }
    }
}

/// The inventory participant record: one row per forward call, carrying the
/// idempotency anchor (the stock row is shared across sagas and cannot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReservation {
    pub id: ReservationId,
    pub order_id: OrderId,
    pub saga_id: SagaId,
    pub product_id: String,
    pub quantity: i32,
    pub status: ReservationStatus,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}

impl InventoryReservation {
    /// Creates a reserved row for a successful stock update.
    pub fn reserved(
        order_id: OrderId,
        saga_id: SagaId,
        product_id: impl Into<String>,
        quantity: i32,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            id: ReservationId::new(),
            order_id,
            saga_id,
            product_id: product_id.into(),
            quantity,
            status: ReservationStatus::Reserved,
            idempotency_key,
            compensation_key: None,
            created_at: Utc::now(),
        }
    }

    /// Applies the compensating change in place.
    pub fn compensate(&mut self, compensation_key: IdempotencyKey) {
        self.status = ReservationStatus::Compensated;
        self.compensation_key = Some(compensation_key);
    }

    pub fn is_compensated(&self) -> bool {
        self.status == ReservationStatus::Compensated
    }
}

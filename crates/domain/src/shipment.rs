//! The Shipping participant record.

use chrono::{DateTime, Utc};
use common::{CustomerId, IdempotencyKey, OrderId, SagaId, ShipmentId};
use serde::{Deserialize, Serialize};

use crate::UnknownStatus;

/// Lifecycle of a shipment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShipmentStatus {
    Shipped,
    Cancelled,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Shipped => "SHIPPED",
            ShipmentStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ShipmentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SHIPPED" => Ok(ShipmentStatus::Shipped),
            "CANCELLED" => Ok(ShipmentStatus::Cancelled),
            other => Err(UnknownStatus::new("shipment", other)),
        }
    }
}

/// A shipment row, created by the final saga step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shipment {
    pub id: ShipmentId,
    pub order_id: OrderId,
    pub saga_id: SagaId,
    pub customer_id: CustomerId,
    pub status: ShipmentStatus,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}

impl Shipment {
    /// Creates a shipped row for a delivered order.
    pub fn shipped(
        order_id: OrderId,
        saga_id: SagaId,
        customer_id: CustomerId,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            id: ShipmentId::new(),
            order_id,
            saga_id,
            customer_id,
            status: ShipmentStatus::Shipped,
            idempotency_key,
            compensation_key: None,
            created_at: Utc::now(),
        }
    }

    /// Applies the cancellation in place.
    pub fn cancel(&mut self, compensation_key: IdempotencyKey) {
        self.status = ShipmentStatus::Cancelled;
        self.compensation_key = Some(compensation_key);
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == ShipmentStatus::Cancelled
    }
}

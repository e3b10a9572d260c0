//! The Order participant record.

use chrono::{DateTime, Utc};
use common::{CustomerId, IdempotencyKey, OrderId, SagaId};
use serde::{Deserialize, Serialize};

use crate::UnknownStatus;

/// Lifecycle of an order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Created by saga initiation.
    Confirmed,
    /// Backward chain reached the order.
    Compensated,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONFIRMED" => Ok(OrderStatus::Confirmed),
            "COMPENSATED" => Ok(OrderStatus::Compensated),
            other => Err(UnknownStatus::new("order", other)),
        }
    }
}

/// An order row, created by the first saga step and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub saga_id: SagaId,
    pub customer_id: CustomerId,
    pub product_id: String,
    pub quantity: i32,
    pub total_price: f64,
    pub status: OrderStatus,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates a confirmed order row for a new saga.
    #[allow(clippy::too_many_arguments)]
    pub fn confirmed(
        id: OrderId,
        saga_id: SagaId,
        customer_id: CustomerId,
        product_id: impl Into<String>,
        quantity: i32,
        total_price: f64,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            id,
            saga_id,
            customer_id,
            product_id: product_id.into(),
            quantity,
            total_price,
            status: OrderStatus::Confirmed,
            idempotency_key,
            compensation_key: None,
            created_at: Utc::now(),
        }
    }

    /// Applies the compensating change in place.
    pub fn compensate(&mut self, compensation_key: IdempotencyKey) {
        self.status = OrderStatus::Compensated;
        self.compensation_key = Some(compensation_key);
    }

    pub fn is_compensated(&self) -> bool {
        self.status == OrderStatus::Compensated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmed_order_defaults() {
        let order = Order::confirmed(
            OrderId::new(),
            SagaId::new(),
            CustomerId::new(),
            "SKU-001",
            2,
            40.0,
            IdempotencyKey::new("key-1"),
        );
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert!(order.compensation_key.is_none());
        assert!(!order.is_compensated());
    }

    #[test]
    fn compensate_sets_status_and_key() {
        let mut order = Order::confirmed(
            OrderId::new(),
            SagaId::new(),
            CustomerId::new(),
            "SKU-001",
            1,
            20.0,
            IdempotencyKey::new("key-1"),
        );
        order.compensate(IdempotencyKey::new("comp-1"));
        assert_eq!(order.status, OrderStatus::Compensated);
        assert_eq!(
            order.compensation_key,
            Some(IdempotencyKey::new("comp-1"))
        );
    }

    #[test]
    fn status_parse_roundtrip() {
        assert_eq!("CONFIRMED".parse::<OrderStatus>().unwrap(), OrderStatus::Confirmed);
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }
}

//! Outbox events and their compile-time routing.

use chrono::{DateTime, Utc};
use common::{EventId, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// The closed wire alphabet of inter-service events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    OrderCreated,
    PaymentProcessed,
    PaymentFailed,
    InventoryUpdated,
    InventoryFailed,
    OrderShipped,
    OrderDelivered,
    OrderCompensated,
}

impl EventType {
    /// Returns the event type name as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "OrderCreated",
            EventType::PaymentProcessed => "PaymentProcessed",
            EventType::PaymentFailed => "PaymentFailed",
            EventType::InventoryUpdated => "InventoryUpdated",
            EventType::InventoryFailed => "InventoryFailed",
            EventType::OrderShipped => "OrderShipped",
            EventType::OrderDelivered => "OrderDelivered",
            EventType::OrderCompensated => "OrderCompensated",
        }
    }

    /// Resolves the dispatch target for this event type.
    ///
    /// Forward events target the next saga step; failure and compensation
    /// events target the previous step's compensating endpoint.
    /// `OrderShipped` and `OrderDelivered` complete the alphabet but have no
    /// target in this deployment, so they cannot be enqueued.
    pub fn route(&self) -> Option<(TargetService, &'static str)> {
        match self {
            EventType::OrderCreated => Some((TargetService::Payment, "/payment/process")),
            EventType::PaymentProcessed => Some((TargetService::Inventory, "/inventory/update")),
            EventType::PaymentFailed => Some((TargetService::Order, "/order/compensate")),
            EventType::InventoryUpdated => Some((TargetService::Shipping, "/shipping/deliver")),
            EventType::InventoryFailed => Some((TargetService::Payment, "/payment/refund")),
            EventType::OrderCompensated => Some((TargetService::Order, "/order/compensate")),
            EventType::OrderShipped | EventType::OrderDelivered => None,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OrderCreated" => Ok(EventType::OrderCreated),
            "PaymentProcessed" => Ok(EventType::PaymentProcessed),
            "PaymentFailed" => Ok(EventType::PaymentFailed),
            "InventoryUpdated" => Ok(EventType::InventoryUpdated),
            "InventoryFailed" => Ok(EventType::InventoryFailed),
            "OrderShipped" => Ok(EventType::OrderShipped),
            "OrderDelivered" => Ok(EventType::OrderDelivered),
            "OrderCompensated" => Ok(EventType::OrderCompensated),
            other => Err(format!("unknown event type: {other}")),
        }
    }
}

/// The four participant services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetService {
    Order,
    Payment,
    Inventory,
    Shipping,
}

impl TargetService {
    /// All services, in forward-chain order.
    pub const ALL: [TargetService; 4] = [
        TargetService::Order,
        TargetService::Payment,
        TargetService::Inventory,
        TargetService::Shipping,
    ];

    /// Returns the service name as serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetService::Order => "order",
            TargetService::Payment => "payment",
            TargetService::Inventory => "inventory",
            TargetService::Shipping => "shipping",
        }
    }
}

impl std::fmt::Display for TargetService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TargetService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(TargetService::Order),
            "payment" => Ok(TargetService::Payment),
            "inventory" => Ok(TargetService::Inventory),
            "shipping" => Ok(TargetService::Shipping),
            other => Err(format!("unknown service: {other}")),
        }
    }
}

/// One pending (or published) outbound event.
///
/// Rows are append-only; the publisher mutates only the publish metadata
/// (`is_published`, `publish_attempts`, `last_error`, `published_at`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEvent {
    pub id: EventId,
    /// The order this event concerns.
    pub aggregate_id: OrderId,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    pub target_service: TargetService,
    /// Relative path under the target's `/api/v1` prefix.
    pub target_endpoint: String,
    pub is_published: bool,
    pub publish_attempts: i32,
    pub max_retries: i32,
    pub last_error: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl OutboxEvent {
    /// Default publish attempts before an event is terminally failed.
    pub const DEFAULT_MAX_RETRIES: i32 = 3;

    /// Builds a pending event for a routed event type.
    pub fn new(
        event_type: EventType,
        aggregate_id: OrderId,
        payload: serde_json::Value,
    ) -> Result<Self, SagaError> {
        let (target_service, target_endpoint) =
            event_type.route().ok_or(SagaError::Unroutable(event_type))?;
        Ok(Self {
            id: EventId::new(),
            aggregate_id,
            event_type,
            payload,
            target_service,
            target_endpoint: target_endpoint.to_string(),
            is_published: false,
            publish_attempts: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            last_error: None,
            published_at: None,
            created_at: Utc::now(),
        })
    }

    /// Overrides the retry budget (from publisher configuration).
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// The deterministic outbound idempotency key: `{aggregateId}-{eventType}`.
    ///
    /// Each `(aggregate, type)` pair occurs at most once per saga, so the
    /// key is stable across publisher retries and restarts.
    pub fn dispatch_key(&self) -> String {
        format!("{}-{}", self.aggregate_id, self.event_type)
    }

    /// Records a successful publish.
    pub fn mark_published(&mut self) {
        self.is_published = true;
        self.published_at = Some(Utc::now());
    }

    /// Records a failed publish attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.publish_attempts += 1;
        self.last_error = Some(error.into());
    }

    /// True once the retry budget is spent without a successful publish.
    pub fn is_exhausted(&self) -> bool {
        !self.is_published && self.publish_attempts >= self.max_retries
    }
}

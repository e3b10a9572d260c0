//! Storage seams for the saga log, outbox, and participant tables.
//!
//! Each `commit_*` method persists everything a saga step writes in a
//! single local transaction: the participant row change, the saga log
//! upsert, and the next outbox event. If any write fails the whole commit
//! fails; the publisher can never observe an event whose originating state
//! change did not commit.

use async_trait::async_trait;
use common::{IdempotencyKey, OrderId, PaymentId, SagaId, ShipmentId};
use domain::{InventoryItem, InventoryReservation, Order, Payment, Shipment};
use saga::{OutboxEvent, SagaLog};
use uuid::Uuid;

use crate::error::Result;

/// Persistent record of saga state and step progress.
#[async_trait]
pub trait SagaLogStore: Send + Sync {
    /// Looks up a saga by its initiation idempotency key.
    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<SagaLog>>;

    /// Looks up a saga by id.
    async fn find_by_id(&self, saga_id: SagaId) -> Result<Option<SagaLog>>;

    /// Upserts the saga keyed by id.
    ///
    /// Inserting a second saga with an existing idempotency key yields
    /// [`StoreError::DuplicateIdempotencyKey`](crate::StoreError).
    async fn save(&self, saga: &SagaLog) -> Result<()>;
}

/// Append-only table of pending outbound events.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends a pending event outside any step commit (tooling and tests;
    /// step commits append through their participant store).
    async fn append(&self, event: &OutboxEvent) -> Result<()>;

    /// Unpublished events with retry budget left, oldest first.
    async fn find_unpublished(&self, batch_size: usize) -> Result<Vec<OutboxEvent>>;

    /// Persists publish metadata (`is_published`, `publish_attempts`,
    /// `last_error`, `published_at`) for an existing event.
    async fn save(&self, event: &OutboxEvent) -> Result<()>;
}

/// Order rows plus the saga-initiation commit.
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>>;

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>>;

    /// Saga log insert + order insert + outbox append, one transaction.
    async fn commit_start(
        &self,
        order: &Order,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()>;

    /// Order update + saga log update, one transaction.
    async fn commit_compensation(&self, order: &Order, saga: &SagaLog) -> Result<()>;
}

/// Payment rows plus the payment-step commits.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>>;

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>>;

    async fn find_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<Payment>>;

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Payment>>;

    /// Payment insert + saga log update + outbox append, one transaction.
    async fn commit_processed(
        &self,
        payment: &Payment,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()>;

    /// Saga log update + outbox append for a declined charge (no payment
    /// row is created), one transaction.
    async fn commit_declined(&self, saga: &SagaLog, event: &OutboxEvent) -> Result<()>;

    /// Payment update + saga log update + outbox append, one transaction.
    async fn commit_refund(
        &self,
        payment: &Payment,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()>;
}

/// Inventory stock and reservation rows plus the inventory-step commits.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn find_item(&self, product_id: &str) -> Result<Option<InventoryItem>>;

    /// Creates or replaces a stock row (`/inventory/initialize`).
    async fn upsert_item(&self, item: &InventoryItem) -> Result<()>;

    async fn find_reservation_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<InventoryReservation>>;

    async fn find_reservation_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>>;

    async fn find_reservation_by_saga(
        &self,
        saga_id: SagaId,
    ) -> Result<Option<InventoryReservation>>;

    /// Stock upsert + reservation insert + saga log update + outbox
    /// append, one transaction.
    async fn commit_reserved(
        &self,
        item: &InventoryItem,
        reservation: &InventoryReservation,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()>;

    /// Saga log update + outbox append for an insufficient-stock rejection
    /// (stock and reservations untouched), one transaction.
    async fn commit_rejected(&self, saga: &SagaLog, event: &OutboxEvent) -> Result<()>;

    /// Stock update + reservation update + saga log update + outbox
    /// append, one transaction.
    async fn commit_compensation(
        &self,
        item: &InventoryItem,
        reservation: &InventoryReservation,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()>;
}

/// Shipment rows plus the delivery-step commits.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    async fn find_by_id(&self, id: ShipmentId) -> Result<Option<Shipment>>;

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Shipment>>;

    async fn find_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<Shipment>>;

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Shipment>>;

    /// Shipment insert + saga log update, one transaction. Delivery is the
    /// final step, so no event is appended.
    async fn commit_delivered(&self, shipment: &Shipment, saga: &SagaLog) -> Result<()>;

    /// Shipment update + saga log update, one transaction.
    async fn commit_cancellation(&self, shipment: &Shipment, saga: &SagaLog) -> Result<()>;
}

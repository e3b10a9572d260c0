//! In-memory implementation of every store.
//!
//! A single lock guards all tables, so each `commit_*` is atomic exactly
//! like its PostgreSQL counterpart: validation happens before the first
//! mutation, and a failed commit leaves nothing behind. Used by unit and
//! end-to-end tests, and by services started without a `DATABASE_URL`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{IdempotencyKey, OrderId, PaymentId, ReservationId, SagaId, ShipmentId};
use domain::{InventoryItem, InventoryReservation, Order, Payment, Shipment};
use saga::{EventType, OutboxEvent, SagaLog};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::{
    InventoryStore, OrderStore, OutboxStore, PaymentStore, SagaLogStore, ShipmentStore,
};

#[derive(Default)]
struct Inner {
    saga_logs: HashMap<SagaId, SagaLog>,
    outbox: Vec<OutboxEvent>,
    orders: HashMap<OrderId, Order>,
    payments: HashMap<PaymentId, Payment>,
    items: HashMap<String, InventoryItem>,
    reservations: HashMap<ReservationId, InventoryReservation>,
    shipments: HashMap<ShipmentId, Shipment>,
}

impl Inner {
    fn check_saga_key_unique(&self, saga: &SagaLog) -> Result<()> {
        let taken = self
            .saga_logs
            .values()
            .any(|s| s.idempotency_key == saga.idempotency_key && s.saga_id != saga.saga_id);
        if taken {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        Ok(())
    }

    fn check_order_key_unique(&self, order: &Order) -> Result<()> {
        let taken = self
            .orders
            .values()
            .any(|o| o.idempotency_key == order.idempotency_key && o.id != order.id);
        if taken {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        Ok(())
    }

    fn check_payment_key_unique(&self, payment: &Payment) -> Result<()> {
        let taken = self
            .payments
            .values()
            .any(|p| p.idempotency_key == payment.idempotency_key && p.id != payment.id);
        if taken {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        Ok(())
    }

    fn check_reservation_key_unique(&self, reservation: &InventoryReservation) -> Result<()> {
        let taken = self.reservations.values().any(|r| {
            r.idempotency_key == reservation.idempotency_key && r.id != reservation.id
        });
        if taken {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        Ok(())
    }

    fn check_shipment_key_unique(&self, shipment: &Shipment) -> Result<()> {
        let taken = self
            .shipments
            .values()
            .any(|s| s.idempotency_key == shipment.idempotency_key && s.id != shipment.id);
        if taken {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        Ok(())
    }
}

/// Shared in-memory backend; clones see the same data.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All outbox rows, in append order.
    pub async fn outbox_events(&self) -> Vec<OutboxEvent> {
        self.inner.read().await.outbox.clone()
    }

    /// Outbox rows still awaiting publication, including terminally failed
    /// ones.
    pub async fn unpublished_count(&self) -> usize {
        self.inner
            .read()
            .await
            .outbox
            .iter()
            .filter(|e| !e.is_published)
            .count()
    }

    /// True if an event for the aggregate and type was ever appended.
    pub async fn has_event(&self, aggregate_id: OrderId, event_type: EventType) -> bool {
        self.inner
            .read()
            .await
            .outbox
            .iter()
            .any(|e| e.aggregate_id == aggregate_id && e.event_type == event_type)
    }

    pub async fn saga_count(&self) -> usize {
        self.inner.read().await.saga_logs.len()
    }

    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }

    pub async fn payment_count(&self) -> usize {
        self.inner.read().await.payments.len()
    }

    pub async fn reservation_count(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    pub async fn shipment_count(&self) -> usize {
        self.inner.read().await.shipments.len()
    }
}

#[async_trait]
impl SagaLogStore for InMemoryBackend {
    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<SagaLog>> {
        let inner = self.inner.read().await;
        Ok(inner
            .saga_logs
            .values()
            .find(|s| s.idempotency_key == key)
            .cloned())
    }

    async fn find_by_id(&self, saga_id: SagaId) -> Result<Option<SagaLog>> {
        Ok(self.inner.read().await.saga_logs.get(&saga_id).cloned())
    }

    async fn save(&self, saga: &SagaLog) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.check_saga_key_unique(saga)?;
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryBackend {
    async fn append(&self, event: &OutboxEvent) -> Result<()> {
        self.inner.write().await.outbox.push(event.clone());
        Ok(())
    }

    async fn find_unpublished(&self, batch_size: usize) -> Result<Vec<OutboxEvent>> {
        let inner = self.inner.read().await;
        let mut pending: Vec<OutboxEvent> = inner
            .outbox
            .iter()
            .filter(|e| !e.is_published && e.publish_attempts < e.max_retries)
            .cloned()
            .collect();
        pending.sort_by_key(|e| (e.created_at, e.id.as_uuid()));
        pending.truncate(batch_size);
        Ok(pending)
    }

    async fn save(&self, event: &OutboxEvent) -> Result<()> {
        let mut inner = self.inner.write().await;
        let Some(stored) = inner.outbox.iter_mut().find(|e| e.id == event.id) else {
            return Err(StoreError::Decode(format!(
                "outbox event {} does not exist",
                event.id
            )));
        };
        // Publish metadata only; the event body is append-only.
        stored.is_published = event.is_published;
        stored.publish_attempts = event.publish_attempts;
        stored.last_error = event.last_error.clone();
        stored.published_at = event.published_at;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryBackend {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&id).cloned())
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.values().find(|o| o.saga_id == saga_id).cloned())
    }

    async fn commit_start(
        &self,
        order: &Order,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.check_saga_key_unique(saga)?;
        inner.check_order_key_unique(order)?;
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.orders.insert(order.id, order.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }

    async fn commit_compensation(&self, order: &Order, saga: &SagaLog) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.orders.insert(order.id, order.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryBackend {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.inner.read().await.payments.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.idempotency_key == *key)
            .cloned())
    }

    async fn find_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.compensation_key.as_ref() == Some(key) && p.order_id == order_id)
            .cloned())
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .find(|p| p.saga_id == saga_id)
            .cloned())
    }

    async fn commit_processed(
        &self,
        payment: &Payment,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.check_payment_key_unique(payment)?;
        inner.payments.insert(payment.id, payment.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }

    async fn commit_declined(&self, saga: &SagaLog, event: &OutboxEvent) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }

    async fn commit_refund(
        &self,
        payment: &Payment,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.payments.insert(payment.id, payment.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for InMemoryBackend {
    async fn find_item(&self, product_id: &str) -> Result<Option<InventoryItem>> {
        Ok(self.inner.read().await.items.get(product_id).cloned())
    }

    async fn upsert_item(&self, item: &InventoryItem) -> Result<()> {
        self.inner
            .write()
            .await
            .items
            .insert(item.product_id.clone(), item.clone());
        Ok(())
    }

    async fn find_reservation_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<InventoryReservation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reservations
            .values()
            .find(|r| r.idempotency_key == *key)
            .cloned())
    }

    async fn find_reservation_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reservations
            .values()
            .find(|r| r.compensation_key.as_ref() == Some(key) && r.order_id == order_id)
            .cloned())
    }

    async fn find_reservation_by_saga(
        &self,
        saga_id: SagaId,
    ) -> Result<Option<InventoryReservation>> {
        let inner = self.inner.read().await;
        Ok(inner
            .reservations
            .values()
            .find(|r| r.saga_id == saga_id)
            .cloned())
    }

    async fn commit_reserved(
        &self,
        item: &InventoryItem,
        reservation: &InventoryReservation,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.check_reservation_key_unique(reservation)?;
        inner.items.insert(item.product_id.clone(), item.clone());
        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }

    async fn commit_rejected(&self, saga: &SagaLog, event: &OutboxEvent) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }

    async fn commit_compensation(
        &self,
        item: &InventoryItem,
        reservation: &InventoryReservation,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.items.insert(item.product_id.clone(), item.clone());
        inner
            .reservations
            .insert(reservation.id, reservation.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        inner.outbox.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl ShipmentStore for InMemoryBackend {
    async fn find_by_id(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        Ok(self.inner.read().await.shipments.get(&id).cloned())
    }

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Shipment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .shipments
            .values()
            .find(|s| s.idempotency_key == *key)
            .cloned())
    }

    async fn find_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<Shipment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .shipments
            .values()
            .find(|s| s.compensation_key.as_ref() == Some(key) && s.order_id == order_id)
            .cloned())
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Shipment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .shipments
            .values()
            .find(|s| s.saga_id == saga_id)
            .cloned())
    }

    async fn commit_delivered(&self, shipment: &Shipment, saga: &SagaLog) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.check_shipment_key_unique(shipment)?;
        inner.shipments.insert(shipment.id, shipment.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        Ok(())
    }

    async fn commit_cancellation(&self, shipment: &Shipment, saga: &SagaLog) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.shipments.insert(shipment.id, shipment.clone());
        inner.saga_logs.insert(saga.saga_id, saga.clone());
        Ok(())
    }
}

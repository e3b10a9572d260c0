//! Shared application state.

use std::sync::Arc;

use domain::PaymentAuthorizer;
use sqlx::PgPool;
use store::{
    InMemoryBackend, InventoryStore, OrderStore, OutboxStore, PaymentStore,
    PostgresInventoryStore, PostgresOrderStore, PostgresOutboxStore, PostgresPaymentStore,
    PostgresSagaLogStore, PostgresShipmentStore, SagaLogStore, ShipmentStore,
};

/// Store handles and collaborators shared by every handler.
///
/// One process serves a single participant role, but the state carries all
/// store handles: the saga log is shared, and tests mount several roles
/// over one backend.
#[derive(Clone)]
pub struct AppState {
    pub saga_logs: Arc<dyn SagaLogStore>,
    pub outbox: Arc<dyn OutboxStore>,
    pub orders: Arc<dyn OrderStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub shipments: Arc<dyn ShipmentStore>,
    pub authorizer: Arc<dyn PaymentAuthorizer>,
    /// Retry budget stamped on every appended outbox event
    /// (`MAX_RETRIES`).
    pub outbox_max_retries: i32,
}

impl AppState {
    /// Builds state over a shared in-memory backend.
    pub fn with_memory_backend(
        backend: InMemoryBackend,
        authorizer: Arc<dyn PaymentAuthorizer>,
        outbox_max_retries: i32,
    ) -> Self {
        Self {
            saga_logs: Arc::new(backend.clone()),
            outbox: Arc::new(backend.clone()),
            orders: Arc::new(backend.clone()),
            payments: Arc::new(backend.clone()),
            inventory: Arc::new(backend.clone()),
            shipments: Arc::new(backend),
            authorizer,
            outbox_max_retries,
        }
    }

    /// Builds state over a PostgreSQL pool shared by handlers and the
    /// publisher.
    pub fn with_postgres(
        pool: PgPool,
        authorizer: Arc<dyn PaymentAuthorizer>,
        outbox_max_retries: i32,
    ) -> Self {
        Self {
            saga_logs: Arc::new(PostgresSagaLogStore::new(pool.clone())),
            outbox: Arc::new(PostgresOutboxStore::new(pool.clone())),
            orders: Arc::new(PostgresOrderStore::new(pool.clone())),
            payments: Arc::new(PostgresPaymentStore::new(pool.clone())),
            inventory: Arc::new(PostgresInventoryStore::new(pool.clone())),
            shipments: Arc::new(PostgresShipmentStore::new(pool)),
            authorizer,
            outbox_max_retries,
        }
    }
}

//! Persistence layer for the saga log, outbox, and participant tables.
//!
//! Storage seams are async traits with two implementations: PostgreSQL
//! (deployments) and a lock-guarded in-memory backend (tests and local
//! runs). Step commits are transactional across the participant row, the
//! saga log, and the outbox append.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryBackend;
pub use postgres::{
    PostgresInventoryStore, PostgresOrderStore, PostgresOutboxStore, PostgresPaymentStore,
    PostgresSagaLogStore, PostgresShipmentStore, run_migrations,
};
pub use store::{
    InventoryStore, OrderStore, OutboxStore, PaymentStore, SagaLogStore, ShipmentStore,
};

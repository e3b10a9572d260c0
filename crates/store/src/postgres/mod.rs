//! PostgreSQL-backed store implementations.
//!
//! Every participant store shares the same pool; `commit_*` methods open
//! one transaction for the participant row write, the saga log upsert, and
//! the outbox append. The helpers here run inside a caller-supplied
//! connection so they compose into those transactions.

mod inventory;
mod order;
mod outbox;
mod payment;
mod saga_log;
mod shipment;

pub use inventory::PostgresInventoryStore;
pub use order::PostgresOrderStore;
pub use outbox::PostgresOutboxStore;
pub use payment::PostgresPaymentStore;
pub use saga_log::PostgresSagaLogStore;
pub use shipment::PostgresShipmentStore;

use common::{CustomerId, OrderId, SagaId};
use saga::{OutboxEvent, SagaLog};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Runs the database migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations").run(pool).await?;
    Ok(())
}

/// Maps a unique violation on an idempotency-key index to the
/// distinguished retry signal; everything else stays a database error.
pub(crate) fn map_unique_violation(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && db_err.constraint().is_some_and(|c| c.contains("idempotency_key"))
    {
        return StoreError::DuplicateIdempotencyKey;
    }
    StoreError::Database(e)
}

pub(crate) async fn upsert_saga_log(conn: &mut PgConnection, saga: &SagaLog) -> Result<()> {
    let steps = serde_json::to_value(&saga.steps)?;
    sqlx::query(
        r#"
        INSERT INTO saga_log
            (id, idempotency_key, customer_id, product_id, quantity, total_price,
             order_id, status, steps, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            order_id = EXCLUDED.order_id,
            status = EXCLUDED.status,
            steps = EXCLUDED.steps
        "#,
    )
    .bind(saga.saga_id.as_uuid())
    .bind(saga.idempotency_key)
    .bind(saga.customer_id.as_uuid())
    .bind(&saga.product_id)
    .bind(saga.quantity)
    .bind(saga.total_price)
    .bind(saga.order_id.map(|id| id.as_uuid()))
    .bind(saga.status.as_str())
    .bind(steps)
    .bind(saga.created_at)
    .execute(conn)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

pub(crate) fn saga_log_from_row(row: PgRow) -> Result<SagaLog> {
    let status: String = row.try_get("status")?;
    let steps: serde_json::Value = row.try_get("steps")?;
    Ok(SagaLog {
        saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("id")?),
        idempotency_key: row.try_get("idempotency_key")?,
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        total_price: row.try_get("total_price")?,
        order_id: row
            .try_get::<Option<Uuid>, _>("order_id")?
            .map(OrderId::from_uuid),
        status: status.parse().map_err(StoreError::Decode)?,
        steps: serde_json::from_value(steps)?,
        created_at: row.try_get("created_at")?,
    })
}

pub(crate) async fn append_outbox_event(
    conn: &mut PgConnection,
    event: &OutboxEvent,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO outbox_events
            (id, aggregate_id, event_type, payload, target_service, target_endpoint,
             is_published, publish_attempts, max_retries, last_error, published_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(event.id.as_uuid())
    .bind(event.aggregate_id.as_uuid())
    .bind(event.event_type.as_str())
    .bind(&event.payload)
    .bind(event.target_service.as_str())
    .bind(&event.target_endpoint)
    .bind(event.is_published)
    .bind(event.publish_attempts)
    .bind(event.max_retries)
    .bind(event.last_error.as_deref())
    .bind(event.published_at)
    .bind(event.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

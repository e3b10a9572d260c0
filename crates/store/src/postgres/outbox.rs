use async_trait::async_trait;
use common::{EventId, OrderId};
use saga::OutboxEvent;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::append_outbox_event;
use crate::error::{Result, StoreError};
use crate::store::OutboxStore;

const SELECT_COLUMNS: &str = "id, aggregate_id, event_type, payload, target_service, \
                              target_endpoint, is_published, publish_attempts, max_retries, \
                              last_error, published_at, created_at";

/// PostgreSQL-backed outbox store.
#[derive(Clone)]
pub struct PostgresOutboxStore {
    pool: PgPool,
}

impl PostgresOutboxStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn outbox_event_from_row(row: PgRow) -> Result<OutboxEvent> {
    let event_type: String = row.try_get("event_type")?;
    let target_service: String = row.try_get("target_service")?;
    Ok(OutboxEvent {
        id: EventId::from_uuid(row.try_get::<Uuid, _>("id")?),
        aggregate_id: OrderId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
        event_type: event_type.parse().map_err(StoreError::Decode)?,
        payload: row.try_get("payload")?,
        target_service: target_service.parse().map_err(StoreError::Decode)?,
        target_endpoint: row.try_get("target_endpoint")?,
        is_published: row.try_get("is_published")?,
        publish_attempts: row.try_get("publish_attempts")?,
        max_retries: row.try_get("max_retries")?,
        last_error: row.try_get("last_error")?,
        published_at: row.try_get("published_at")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn append(&self, event: &OutboxEvent) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        append_outbox_event(&mut conn, event).await
    }

    async fn find_unpublished(&self, batch_size: usize) -> Result<Vec<OutboxEvent>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM outbox_events
            WHERE is_published = FALSE AND publish_attempts < max_retries
            ORDER BY created_at ASC, id ASC
            LIMIT $1
            "#
        ))
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(outbox_event_from_row).collect()
    }

    async fn save(&self, event: &OutboxEvent) -> Result<()> {
        // Publish metadata only; the event body is append-only.
        let result = sqlx::query(
            r#"
            UPDATE outbox_events
            SET is_published = $2, publish_attempts = $3, last_error = $4, published_at = $5
            WHERE id = $1
            "#,
        )
        .bind(event.id.as_uuid())
        .bind(event.is_published)
        .bind(event.publish_attempts)
        .bind(event.last_error.as_deref())
        .bind(event.published_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Decode(format!(
                "outbox event {} does not exist",
                event.id
            )));
        }
        Ok(())
    }
}

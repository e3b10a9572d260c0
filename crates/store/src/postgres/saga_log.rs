use async_trait::async_trait;
use common::SagaId;
use saga::SagaLog;
use sqlx::PgPool;
use uuid::Uuid;

use super::{saga_log_from_row, upsert_saga_log};
use crate::error::Result;
use crate::store::SagaLogStore;

const SELECT_COLUMNS: &str = "id, idempotency_key, customer_id, product_id, quantity, \
                              total_price, order_id, status, steps, created_at";

/// PostgreSQL-backed saga log store.
#[derive(Clone)]
pub struct PostgresSagaLogStore {
    pool: PgPool,
}

impl PostgresSagaLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SagaLogStore for PostgresSagaLogStore {
    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<SagaLog>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_log WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(saga_log_from_row).transpose()
    }

    async fn find_by_id(&self, saga_id: SagaId) -> Result<Option<SagaLog>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_log WHERE id = $1"
        ))
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(saga_log_from_row).transpose()
    }

    async fn save(&self, saga: &SagaLog) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_saga_log(&mut conn, saga).await
    }
}

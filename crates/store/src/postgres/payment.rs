use async_trait::async_trait;
use common::{CustomerId, IdempotencyKey, OrderId, PaymentId, SagaId};
use domain::Payment;
use saga::{OutboxEvent, SagaLog};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::{append_outbox_event, map_unique_violation, upsert_saga_log};
use crate::error::Result;
use crate::store::PaymentStore;

const SELECT_COLUMNS: &str = "id, order_id, saga_id, customer_id, amount, auth_code, \
                              status, idempotency_key, compensation_key, created_at";

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn payment_from_row(row: PgRow) -> Result<Payment> {
    let status: String = row.try_get("status")?;
    Ok(Payment {
        id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        amount: row.try_get("amount")?,
        authorization: row.try_get("auth_code")?,
        status: status.parse()?,
        idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
        compensation_key: row
            .try_get::<Option<String>, _>("compensation_key")?
            .map(IdempotencyKey::new),
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_payment(conn: &mut PgConnection, payment: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO payments
            (id, order_id, saga_id, customer_id, amount, auth_code,
             status, idempotency_key, compensation_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(payment.id.as_uuid())
    .bind(payment.order_id.as_uuid())
    .bind(payment.saga_id.as_uuid())
    .bind(payment.customer_id.as_uuid())
    .bind(payment.amount)
    .bind(&payment.authorization)
    .bind(payment.status.as_str())
    .bind(payment.idempotency_key.as_str())
    .bind(payment.compensation_key.as_ref().map(|k| k.as_str()))
    .bind(payment.created_at)
    .execute(conn)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

async fn update_payment(conn: &mut PgConnection, payment: &Payment) -> Result<()> {
    sqlx::query(
        "UPDATE payments SET status = $2, compensation_key = $3 WHERE id = $1",
    )
    .bind(payment.id.as_uuid())
    .bind(payment.status.as_str())
    .bind(payment.compensation_key.as_ref().map(|k| k.as_str()))
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(payment_from_row).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE idempotency_key = $1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(payment_from_row).transpose()
    }

    async fn find_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE compensation_key = $1 AND order_id = $2"
        ))
        .bind(key.as_str())
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(payment_from_row).transpose()
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Payment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM payments WHERE saga_id = $1"
        ))
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(payment_from_row).transpose()
    }

    async fn commit_processed(
        &self,
        payment: &Payment,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_payment(&mut tx, payment).await?;
        upsert_saga_log(&mut tx, saga).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_declined(&self, saga: &SagaLog, event: &OutboxEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_saga_log(&mut tx, saga).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_refund(
        &self,
        payment: &Payment,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_payment(&mut tx, payment).await?;
        upsert_saga_log(&mut tx, saga).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }
}

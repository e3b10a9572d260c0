use async_trait::async_trait;
use common::{CustomerId, IdempotencyKey, OrderId, SagaId};
use domain::Order;
use saga::{OutboxEvent, SagaLog};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::{append_outbox_event, map_unique_violation, upsert_saga_log};
use crate::error::Result;
use crate::store::OrderStore;

const SELECT_COLUMNS: &str = "id, saga_id, customer_id, product_id, quantity, total_price, \
                              status, idempotency_key, compensation_key, created_at";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn order_from_row(row: PgRow) -> Result<Order> {
    let status: String = row.try_get("status")?;
    Ok(Order {
        id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
        saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        total_price: row.try_get("total_price")?,
        status: status.parse()?,
        idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
        compensation_key: row
            .try_get::<Option<String>, _>("compensation_key")?
            .map(IdempotencyKey::new),
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO orders
            (id, saga_id, customer_id, product_id, quantity, total_price,
             status, idempotency_key, compensation_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(order.id.as_uuid())
    .bind(order.saga_id.as_uuid())
    .bind(order.customer_id.as_uuid())
    .bind(&order.product_id)
    .bind(order.quantity)
    .bind(order.total_price)
    .bind(order.status.as_str())
    .bind(order.idempotency_key.as_str())
    .bind(order.compensation_key.as_ref().map(|k| k.as_str()))
    .bind(order.created_at)
    .execute(conn)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

async fn update_order(conn: &mut PgConnection, order: &Order) -> Result<()> {
    sqlx::query(
        "UPDATE orders SET status = $2, compensation_key = $3 WHERE id = $1",
    )
    .bind(order.id.as_uuid())
    .bind(order.status.as_str())
    .bind(order.compensation_key.as_ref().map(|k| k.as_str()))
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(order_from_row).transpose()
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM orders WHERE saga_id = $1"
        ))
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(order_from_row).transpose()
    }

    async fn commit_start(
        &self,
        order: &Order,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_saga_log(&mut tx, saga).await?;
        insert_order(&mut tx, order).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_compensation(&self, order: &Order, saga: &SagaLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_order(&mut tx, order).await?;
        upsert_saga_log(&mut tx, saga).await?;
        tx.commit().await?;
        Ok(())
    }
}

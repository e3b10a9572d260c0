use async_trait::async_trait;
use common::{CustomerId, IdempotencyKey, OrderId, SagaId, ShipmentId};
use domain::Shipment;
use saga::SagaLog;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::{map_unique_violation, upsert_saga_log};
use crate::error::Result;
use crate::store::ShipmentStore;

const SELECT_COLUMNS: &str = "id, order_id, saga_id, customer_id, status, idempotency_key, \
                              compensation_key, created_at";

/// PostgreSQL-backed shipment store.
#[derive(Clone)]
pub struct PostgresShipmentStore {
    pool: PgPool,
}

impl PostgresShipmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn shipment_from_row(row: PgRow) -> Result<Shipment> {
    let status: String = row.try_get("status")?;
    Ok(Shipment {
        id: ShipmentId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
        customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        status: status.parse()?,
        idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
        compensation_key: row
            .try_get::<Option<String>, _>("compensation_key")?
            .map(IdempotencyKey::new),
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_shipment(conn: &mut PgConnection, shipment: &Shipment) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO shipments
            (id, order_id, saga_id, customer_id, status,
             idempotency_key, compensation_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(shipment.id.as_uuid())
    .bind(shipment.order_id.as_uuid())
    .bind(shipment.saga_id.as_uuid())
    .bind(shipment.customer_id.as_uuid())
    .bind(shipment.status.as_str())
    .bind(shipment.idempotency_key.as_str())
    .bind(shipment.compensation_key.as_ref().map(|k| k.as_str()))
    .bind(shipment.created_at)
    .execute(conn)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

async fn update_shipment(conn: &mut PgConnection, shipment: &Shipment) -> Result<()> {
    sqlx::query(
        "UPDATE shipments SET status = $2, compensation_key = $3 WHERE id = $1",
    )
    .bind(shipment.id.as_uuid())
    .bind(shipment.status.as_str())
    .bind(shipment.compensation_key.as_ref().map(|k| k.as_str()))
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl ShipmentStore for PostgresShipmentStore {
    async fn find_by_id(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM shipments WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(shipment_from_row).transpose()
    }

    async fn find_by_idempotency_key(&self, key: &IdempotencyKey) -> Result<Option<Shipment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM shipments WHERE idempotency_key = $1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(shipment_from_row).transpose()
    }

    async fn find_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<Shipment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM shipments WHERE compensation_key = $1 AND order_id = $2"
        ))
        .bind(key.as_str())
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(shipment_from_row).transpose()
    }

    async fn find_by_saga(&self, saga_id: SagaId) -> Result<Option<Shipment>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM shipments WHERE saga_id = $1"
        ))
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(shipment_from_row).transpose()
    }

    async fn commit_delivered(&self, shipment: &Shipment, saga: &SagaLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_shipment(&mut tx, shipment).await?;
        upsert_saga_log(&mut tx, saga).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_cancellation(&self, shipment: &Shipment, saga: &SagaLog) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        update_shipment(&mut tx, shipment).await?;
        upsert_saga_log(&mut tx, saga).await?;
        tx.commit().await?;
        Ok(())
    }
}

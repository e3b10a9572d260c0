use async_trait::async_trait;
use common::{IdempotencyKey, OrderId, ReservationId, SagaId};
use domain::{InventoryItem, InventoryReservation};
use saga::{OutboxEvent, SagaLog};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::{append_outbox_event, map_unique_violation, upsert_saga_log};
use crate::error::Result;
use crate::store::InventoryStore;

const ITEM_COLUMNS: &str = "product_id, quantity, reserved_quantity, created_at";
const RESERVATION_COLUMNS: &str = "id, order_id, saga_id, product_id, quantity, status, \
                                   idempotency_key, compensation_key, created_at";

/// PostgreSQL-backed inventory store.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn item_from_row(row: PgRow) -> Result<InventoryItem> {
    Ok(InventoryItem {
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        reserved_quantity: row.try_get("reserved_quantity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn reservation_from_row(row: PgRow) -> Result<InventoryReservation> {
    let status: String = row.try_get("status")?;
    Ok(InventoryReservation {
        id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
        order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
        saga_id: SagaId::from_uuid(row.try_get::<Uuid, _>("saga_id")?),
        product_id: row.try_get("product_id")?,
        quantity: row.try_get("quantity")?,
        status: status.parse()?,
        idempotency_key: IdempotencyKey::new(row.try_get::<String, _>("idempotency_key")?),
        compensation_key: row
            .try_get::<Option<String>, _>("compensation_key")?
            .map(IdempotencyKey::new),
        created_at: row.try_get("created_at")?,
    })
}

async fn upsert_item_in(conn: &mut PgConnection, item: &InventoryItem) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory (product_id, quantity, reserved_quantity, created_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (product_id) DO UPDATE SET
            quantity = EXCLUDED.quantity,
            reserved_quantity = EXCLUDED.reserved_quantity
        "#,
    )
    .bind(&item.product_id)
    .bind(item.quantity)
    .bind(item.reserved_quantity)
    .bind(item.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_reservation(
    conn: &mut PgConnection,
    reservation: &InventoryReservation,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO inventory_reservations
            (id, order_id, saga_id, product_id, quantity, status,
             idempotency_key, compensation_key, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(reservation.id.as_uuid())
    .bind(reservation.order_id.as_uuid())
    .bind(reservation.saga_id.as_uuid())
    .bind(&reservation.product_id)
    .bind(reservation.quantity)
    .bind(reservation.status.as_str())
    .bind(reservation.idempotency_key.as_str())
    .bind(reservation.compensation_key.as_ref().map(|k| k.as_str()))
    .bind(reservation.created_at)
    .execute(conn)
    .await
    .map_err(map_unique_violation)?;
    Ok(())
}

async fn update_reservation(
    conn: &mut PgConnection,
    reservation: &InventoryReservation,
) -> Result<()> {
    sqlx::query(
        "UPDATE inventory_reservations SET status = $2, compensation_key = $3 WHERE id = $1",
    )
    .bind(reservation.id.as_uuid())
    .bind(reservation.status.as_str())
    .bind(reservation.compensation_key.as_ref().map(|k| k.as_str()))
    .execute(conn)
    .await?;
    Ok(())
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn find_item(&self, product_id: &str) -> Result<Option<InventoryItem>> {
        let row = sqlx::query(&format!(
            "SELECT {ITEM_COLUMNS} FROM inventory WHERE product_id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(item_from_row).transpose()
    }

    async fn upsert_item(&self, item: &InventoryItem) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_item_in(&mut conn, item).await
    }

    async fn find_reservation_by_idempotency_key(
        &self,
        key: &IdempotencyKey,
    ) -> Result<Option<InventoryReservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE idempotency_key = $1"
        ))
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(reservation_from_row).transpose()
    }

    async fn find_reservation_by_compensation_key(
        &self,
        key: &IdempotencyKey,
        order_id: OrderId,
    ) -> Result<Option<InventoryReservation>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {RESERVATION_COLUMNS} FROM inventory_reservations
            WHERE compensation_key = $1 AND order_id = $2
            "#
        ))
        .bind(key.as_str())
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(reservation_from_row).transpose()
    }

    async fn find_reservation_by_saga(
        &self,
        saga_id: SagaId,
    ) -> Result<Option<InventoryReservation>> {
        let row = sqlx::query(&format!(
            "SELECT {RESERVATION_COLUMNS} FROM inventory_reservations WHERE saga_id = $1"
        ))
        .bind(saga_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(reservation_from_row).transpose()
    }

    async fn commit_reserved(
        &self,
        item: &InventoryItem,
        reservation: &InventoryReservation,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_item_in(&mut tx, item).await?;
        insert_reservation(&mut tx, reservation).await?;
        upsert_saga_log(&mut tx, saga).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_rejected(&self, saga: &SagaLog, event: &OutboxEvent) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_saga_log(&mut tx, saga).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn commit_compensation(
        &self,
        item: &InventoryItem,
        reservation: &InventoryReservation,
        saga: &SagaLog,
        event: &OutboxEvent,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_item_in(&mut tx, item).await?;
        update_reservation(&mut tx, reservation).await?;
        upsert_saga_log(&mut tx, saga).await?;
        append_outbox_event(&mut tx, event).await?;
        tx.commit().await?;
        Ok(())
    }
}

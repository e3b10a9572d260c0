//! Inventory service: stock updates, compensation, initialization, lookup.

use axum::Json;
use axum::extract::{Path, State};
use common::{ApiResponse, OrderId, SagaId};
use domain::{DEFAULT_INITIAL_STOCK, InventoryItem, InventoryReservation};
use saga::{EventType, OutboxEvent, StepName, StepStatus};
use serde::Deserialize;
use store::StoreError;

use crate::error::ApiError;
use crate::extract::RequireIdempotencyKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInventoryRequest {
    pub order_id: OrderId,
    pub product_id: String,
    pub quantity: i32,
    pub saga_log_id: SagaId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateInventoryRequest {
    pub order_id: OrderId,
    pub product_id: String,
    pub quantity: i32,
    pub saga_log_id: SagaId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeInventoryRequest {
    pub product_id: String,
    pub quantity: i32,
}

/// POST /api/v1/inventory/update — reserve stock for an order.
///
/// Auto-creates unknown products at the default stock level. On sufficient
/// stock, moves units into the reserved count and emits
/// `InventoryUpdated` toward shipping; otherwise marks UPDATE_INVENTORY
/// failed and emits `InventoryFailed` toward the payment refund.
#[tracing::instrument(skip(state, req), fields(saga_id = %req.saga_log_id))]
pub async fn update(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<UpdateInventoryRequest>,
) -> Result<Json<ApiResponse<InventoryReservation>>, ApiError> {
    if let Some(existing) = state
        .inventory
        .find_reservation_by_idempotency_key(&key)
        .await?
    {
        return Ok(Json(ApiResponse::ok(existing)));
    }
    if req.quantity <= 0 {
        return Err(ApiError::BadRequest("quantity must be positive".to_string()));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };
    let step = saga.step(StepName::UpdateInventory);
    if step.status == StepStatus::Failed {
        let error = step
            .error
            .clone()
            .unwrap_or_else(|| "Insufficient inventory".to_string());
        return Ok(Json(ApiResponse::failed(error)));
    }
    if !saga.status.is_forward() {
        return Ok(Json(ApiResponse::failed(format!(
            "saga is {}",
            saga.status
        ))));
    }

    saga.begin_step(StepName::UpdateInventory)?;

    let mut item = state
        .inventory
        .find_item(&req.product_id)
        .await?
        .unwrap_or_else(|| InventoryItem::new(&req.product_id, DEFAULT_INITIAL_STOCK));

    match item.reserve(req.quantity) {
        Ok(()) => {
            let reservation = InventoryReservation::reserved(
                req.order_id,
                req.saga_log_id,
                &req.product_id,
                req.quantity,
                key.clone(),
            );
            saga.complete_step(StepName::UpdateInventory)?;

            let payload = serde_json::json!({
                "customerId": saga.customer_id,
                "orderId": req.order_id,
                "sagaLogId": saga.saga_id,
            });
            let event = OutboxEvent::new(EventType::InventoryUpdated, req.order_id, payload)?
                .with_max_retries(state.outbox_max_retries);

            match state
                .inventory
                .commit_reserved(&item, &reservation, &saga, &event)
                .await
            {
                Ok(()) => {}
                Err(StoreError::DuplicateIdempotencyKey) => {
                    let Some(existing) = state
                        .inventory
                        .find_reservation_by_idempotency_key(&key)
                        .await?
                    else {
                        return Err(ApiError::Internal(
                            "reservation missing after duplicate-key conflict".to_string(),
                        ));
                    };
                    return Ok(Json(ApiResponse::ok(existing)));
                }
                Err(e) => return Err(e.into()),
            }

            tracing::info!(
                product_id = %req.product_id,
                reserved = req.quantity,
                "inventory reserved"
            );
            Ok(Json(ApiResponse::ok(reservation)))
        }
        Err(insufficient) => {
            let reason = insufficient.to_string();
            saga.fail_step(StepName::UpdateInventory, reason.clone())?;

            let payload = serde_json::json!({
                "orderId": req.order_id,
                "sagaLogId": saga.saga_id,
            });
            let event = OutboxEvent::new(EventType::InventoryFailed, req.order_id, payload)?
                .with_max_retries(state.outbox_max_retries);
            state.inventory.commit_rejected(&saga, &event).await?;

            metrics::counter!("inventory_rejections_total").increment(1);
            tracing::warn!(product_id = %req.product_id, reason = %reason, "inventory rejected");
            Ok(Json(ApiResponse::failed(reason)))
        }
    }
}

/// POST /api/v1/inventory/compensate — release a reservation.
///
/// Restores the stock counters, marks UPDATE_INVENTORY compensated, and
/// emits `InventoryFailed` to continue the backward chain toward the
/// payment refund.
#[tracing::instrument(skip(state, req), fields(saga_id = %req.saga_log_id))]
pub async fn compensate(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<CompensateInventoryRequest>,
) -> Result<Json<ApiResponse<InventoryReservation>>, ApiError> {
    if let Some(existing) = state
        .inventory
        .find_reservation_by_compensation_key(&key, req.order_id)
        .await?
    {
        return Ok(Json(ApiResponse::ok(existing)));
    }

    let Some(mut reservation) = state
        .inventory
        .find_reservation_by_saga(req.saga_log_id)
        .await?
    else {
        return Ok(Json(ApiResponse::rejected("Reservation not found")));
    };
    if reservation.is_compensated() {
        return Ok(Json(ApiResponse::ok(reservation)));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };

    let Some(mut item) = state.inventory.find_item(&req.product_id).await? else {
        // The stock row is gone; the chain cannot proceed.
        saga.fail_compensation(StepName::UpdateInventory, "inventory row missing")?;
        state.saga_logs.save(&saga).await?;
        return Ok(Json(ApiResponse::rejected("Inventory not found")));
    };

    item.restore(req.quantity);
    reservation.compensate(key);
    saga.compensate_step(StepName::UpdateInventory)?;

    let payload = serde_json::json!({
        "orderId": req.order_id,
        "sagaLogId": saga.saga_id,
    });
    let event = OutboxEvent::new(EventType::InventoryFailed, req.order_id, payload)?
        .with_max_retries(state.outbox_max_retries);
    state
        .inventory
        .commit_compensation(&item, &reservation, &saga, &event)
        .await?;

    tracing::info!(product_id = %reservation.product_id, "inventory compensated");
    Ok(Json(ApiResponse::ok(reservation)))
}

/// POST /api/v1/inventory/initialize — create or reset stock for a
/// product. The only endpoint outside the saga protocol.
#[tracing::instrument(skip(state, req))]
pub async fn initialize(
    State(state): State<AppState>,
    Json(req): Json<InitializeInventoryRequest>,
) -> Result<Json<ApiResponse<InventoryItem>>, ApiError> {
    if req.quantity < 0 {
        return Err(ApiError::BadRequest(
            "quantity must not be negative".to_string(),
        ));
    }

    let item = match state.inventory.find_item(&req.product_id).await? {
        Some(mut existing) => {
            existing.quantity = req.quantity;
            existing
        }
        None => InventoryItem::new(&req.product_id, req.quantity),
    };
    state.inventory.upsert_item(&item).await?;

    tracing::info!(product_id = %item.product_id, quantity = item.quantity, "inventory initialized");
    Ok(Json(ApiResponse::ok(item)))
}

/// GET /api/v1/inventory/{productId} — load stock by product.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
) -> Result<Json<ApiResponse<InventoryItem>>, ApiError> {
    match state.inventory.find_item(&product_id).await? {
        Some(item) => Ok(Json(ApiResponse::ok(item))),
        None => Ok(Json(ApiResponse::rejected("Inventory not found"))),
    }
}

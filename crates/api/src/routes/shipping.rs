//! Shipping service: delivery, cancellation, shipment lookup.

use axum::Json;
use axum::extract::{Path, State};
use common::{ApiResponse, CustomerId, OrderId, SagaId, ShipmentId};
use domain::Shipment;
use saga::StepName;
use serde::Deserialize;
use store::StoreError;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::RequireIdempotencyKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliverOrderRequest {
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub saga_log_id: SagaId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelShipmentRequest {
    pub order_id: OrderId,
    pub saga_log_id: SagaId,
}

/// POST /api/v1/shipping/deliver — the final saga step.
///
/// Creates the SHIPPED row, marks DELIVER_ORDER completed, and promotes
/// the saga to COMPLETED. No further event is emitted.
#[tracing::instrument(skip(state, req), fields(saga_id = %req.saga_log_id))]
pub async fn deliver(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<DeliverOrderRequest>,
) -> Result<Json<ApiResponse<Shipment>>, ApiError> {
    if let Some(existing) = state.shipments.find_by_idempotency_key(&key).await? {
        return Ok(Json(ApiResponse::ok(existing)));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };
    if !saga.status.is_forward() {
        return Ok(Json(ApiResponse::failed(format!(
            "saga is {}",
            saga.status
        ))));
    }

    saga.begin_step(StepName::DeliverOrder)?;
    saga.complete_step(StepName::DeliverOrder)?;

    let shipment = Shipment::shipped(req.order_id, req.saga_log_id, req.customer_id, key.clone());

    match state.shipments.commit_delivered(&shipment, &saga).await {
        Ok(()) => {}
        Err(StoreError::DuplicateIdempotencyKey) => {
            let Some(existing) = state.shipments.find_by_idempotency_key(&key).await? else {
                return Err(ApiError::Internal(
                    "shipment missing after duplicate-key conflict".to_string(),
                ));
            };
            return Ok(Json(ApiResponse::ok(existing)));
        }
        Err(e) => return Err(e.into()),
    }

    metrics::counter!("saga_completed_total").increment(1);
    tracing::info!(shipment_id = %shipment.id, "order delivered, saga completed");
    Ok(Json(ApiResponse::ok(shipment)))
}

/// POST /api/v1/shipping/cancel — compensate a shipment.
///
/// Marks the shipment CANCELLED and records DELIVER_ORDER compensation.
/// The chain terminates here; upstream compensation is driven separately.
#[tracing::instrument(skip(state, req), fields(saga_id = %req.saga_log_id))]
pub async fn cancel(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<CancelShipmentRequest>,
) -> Result<Json<ApiResponse<Shipment>>, ApiError> {
    if let Some(existing) = state
        .shipments
        .find_by_compensation_key(&key, req.order_id)
        .await?
    {
        return Ok(Json(ApiResponse::ok(existing)));
    }

    let Some(mut shipment) = state.shipments.find_by_saga(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("Shipping not found")));
    };
    if shipment.is_cancelled() {
        return Ok(Json(ApiResponse::ok(shipment)));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };

    shipment.cancel(key);
    saga.compensate_step(StepName::DeliverOrder)?;
    state.shipments.commit_cancellation(&shipment, &saga).await?;

    tracing::info!(shipment_id = %shipment.id, "shipment cancelled");
    Ok(Json(ApiResponse::ok(shipment)))
}

/// GET /api/v1/shipping/{shippingId} — load a shipment by id.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(shipment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Shipment>>, ApiError> {
    match state
        .shipments
        .find_by_id(ShipmentId::from_uuid(shipment_id))
        .await?
    {
        Some(shipment) => Ok(Json(ApiResponse::ok(shipment))),
        None => Ok(Json(ApiResponse::rejected("Shipping not found"))),
    }
}

//! Order service: saga initiation, order compensation, order lookup.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use common::{ApiResponse, CustomerId, IDEMPOTENCY_KEY_HEADER, IdempotencyKey, OrderId, SagaId};
use domain::Order;
use saga::{EventType, OutboxEvent, SagaLog, SagaStatus, StepName};
use serde::{Deserialize, Serialize};
use store::StoreError;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::RequireIdempotencyKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOrderRequest {
    pub customer_id: CustomerId,
    pub product_id: String,
    pub quantity: i32,
    pub total_price: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartOrderResponse {
    pub order_id: OrderId,
    pub saga_log_id: SagaId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompensateOrderRequest {
    pub order_id: OrderId,
}

fn start_response(saga: &SagaLog) -> Result<ApiResponse<StartOrderResponse>, ApiError> {
    let order_id = saga
        .order_id
        .ok_or_else(|| ApiError::Internal("saga log carries no order id".to_string()))?;
    Ok(ApiResponse::ok(StartOrderResponse {
        order_id,
        saga_log_id: saga.saga_id,
    }))
}

/// POST /api/v1/order/start — initiate a saga.
///
/// Creates the saga log (all four steps pending), the CONFIRMED order row,
/// and the `OrderCreated` event toward the payment service, all in one
/// transaction. The initiation idempotency key is the saga log's unique
/// key: a duplicate start, sequential or racing, returns the original
/// `orderId`/`sagaLogId`.
#[tracing::instrument(skip(state, req))]
pub async fn start(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<StartOrderRequest>,
) -> Result<Json<ApiResponse<StartOrderResponse>>, ApiError> {
    let Some(key_uuid) = key.as_uuid() else {
        return Err(ApiError::BadRequest(format!(
            "{IDEMPOTENCY_KEY_HEADER} must be a UUID for saga initiation"
        )));
    };
    if req.quantity <= 0 {
        return Err(ApiError::BadRequest("quantity must be positive".to_string()));
    }
    if req.total_price < 0.0 {
        return Err(ApiError::BadRequest(
            "totalPrice must not be negative".to_string(),
        ));
    }

    if let Some(existing) = state.saga_logs.find_by_idempotency_key(key_uuid).await? {
        return Ok(Json(start_response(&existing)?));
    }

    let order_id = OrderId::new();
    let mut saga = SagaLog::new(
        key_uuid,
        req.customer_id,
        req.product_id.clone(),
        req.quantity,
        req.total_price,
    );
    saga.order_id = Some(order_id);
    saga.begin_step(StepName::CreateOrder)?;
    saga.complete_step(StepName::CreateOrder)?;

    let order = Order::confirmed(
        order_id,
        saga.saga_id,
        req.customer_id,
        req.product_id.clone(),
        req.quantity,
        req.total_price,
        key,
    );

    let payload = serde_json::json!({
        "amount": req.total_price,
        "customerId": req.customer_id,
        "orderId": order_id,
        "sagaLogId": saga.saga_id,
    });
    let event = OutboxEvent::new(EventType::OrderCreated, order_id, payload)?
        .with_max_retries(state.outbox_max_retries);

    match state.orders.commit_start(&order, &saga, &event).await {
        Ok(()) => {}
        Err(StoreError::DuplicateIdempotencyKey) => {
            // Lost the race to a concurrent duplicate start; hand back the
            // winner's ids.
            let Some(existing) = state.saga_logs.find_by_idempotency_key(key_uuid).await? else {
                return Err(ApiError::Internal(
                    "saga missing after duplicate-key conflict".to_string(),
                ));
            };
            return Ok(Json(start_response(&existing)?));
        }
        Err(e) => return Err(e.into()),
    }

    metrics::counter!("saga_started_total").increment(1);
    tracing::info!(saga_id = %saga.saga_id, order_id = %order_id, "saga started");
    Ok(Json(start_response(&saga)?))
}

/// POST /api/v1/order/compensate — terminate the backward chain.
///
/// Marks the order COMPENSATED and the saga COMPENSATED. The compensation
/// key comes from the `idempotency-key` header when present (publisher
/// deliveries) and is derived from the order id otherwise (operator
/// calls).
#[tracing::instrument(skip(state, headers, req))]
pub async fn compensate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CompensateOrderRequest>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let Some(mut order) = state.orders.find_by_id(req.order_id).await? else {
        return Ok(Json(ApiResponse::rejected("Order not found")));
    };
    if order.is_compensated() {
        return Ok(Json(ApiResponse::ok(order)));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(order.saga_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };
    if saga.status == SagaStatus::Completed {
        return Ok(Json(ApiResponse::failed("saga already completed")));
    }

    let compensation_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(IdempotencyKey::new)
        .unwrap_or_else(|| IdempotencyKey::new(format!("{}-OrderCompensated", order.id)));

    order.compensate(compensation_key);
    saga.compensate_step(StepName::CreateOrder)?;
    state.orders.commit_compensation(&order, &saga).await?;

    metrics::counter!("saga_compensated_total").increment(1);
    tracing::info!(saga_id = %saga.saga_id, order_id = %order.id, "saga compensated");
    Ok(Json(ApiResponse::ok(order)))
}

/// GET /api/v1/order/{orderId} — load an order by id.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    match state.orders.find_by_id(OrderId::from_uuid(order_id)).await? {
        Some(order) => Ok(Json(ApiResponse::ok(order))),
        None => Ok(Json(ApiResponse::rejected("Order not found"))),
    }
}

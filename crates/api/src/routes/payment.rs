//! Payment service: charge processing, refunds, payment lookup.

use axum::Json;
use axum::extract::{Path, State};
use common::{ApiResponse, CustomerId, OrderId, PaymentId, SagaId};
use domain::Payment;
use saga::{EventType, OutboxEvent, StepName, StepStatus};
use serde::Deserialize;
use store::StoreError;
use uuid::Uuid;

use crate::error::ApiError;
use crate::extract::RequireIdempotencyKey;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    pub amount: f64,
    pub customer_id: CustomerId,
    pub order_id: OrderId,
    pub saga_log_id: SagaId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundPaymentRequest {
    pub order_id: OrderId,
    pub saga_log_id: SagaId,
}

/// POST /api/v1/payment/process — charge for an order.
///
/// On approval, persists the payment row, marks PROCESS_PAYMENT completed,
/// and emits `PaymentProcessed` toward inventory. On decline, marks the
/// step failed and emits `PaymentFailed` toward order compensation; the
/// decline still replies HTTP 200.
#[tracing::instrument(skip(state, req), fields(saga_id = %req.saga_log_id))]
pub async fn process(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<ProcessPaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    if let Some(existing) = state.payments.find_by_idempotency_key(&key).await? {
        return Ok(Json(ApiResponse::ok(existing)));
    }
    if req.amount < 0.0 {
        return Err(ApiError::BadRequest("amount must not be negative".to_string()));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };
    let step = saga.step(StepName::ProcessPayment);
    if step.status == StepStatus::Failed {
        // Replay of a declined charge: repeat the recorded outcome.
        let error = step
            .error
            .clone()
            .unwrap_or_else(|| "Payment declined".to_string());
        return Ok(Json(ApiResponse::failed(error)));
    }
    if !saga.status.is_forward() {
        return Ok(Json(ApiResponse::failed(format!(
            "saga is {}",
            saga.status
        ))));
    }

    saga.begin_step(StepName::ProcessPayment)?;

    match state
        .authorizer
        .authorize(req.order_id, req.customer_id, req.amount)
        .await
    {
        Ok(auth_code) => {
            let payment = Payment::processed(
                req.order_id,
                req.saga_log_id,
                req.customer_id,
                req.amount,
                auth_code,
                key.clone(),
            );
            saga.complete_step(StepName::ProcessPayment)?;

            let payload = serde_json::json!({
                "orderId": req.order_id,
                "productId": saga.product_id,
                "quantity": saga.quantity,
                "sagaLogId": saga.saga_id,
            });
            let event = OutboxEvent::new(EventType::PaymentProcessed, req.order_id, payload)?
                .with_max_retries(state.outbox_max_retries);

            match state.payments.commit_processed(&payment, &saga, &event).await {
                Ok(()) => {}
                Err(StoreError::DuplicateIdempotencyKey) => {
                    // A racing duplicate delivery won; return its row.
                    let Some(existing) = state.payments.find_by_idempotency_key(&key).await?
                    else {
                        return Err(ApiError::Internal(
                            "payment missing after duplicate-key conflict".to_string(),
                        ));
                    };
                    return Ok(Json(ApiResponse::ok(existing)));
                }
                Err(e) => return Err(e.into()),
            }

            tracing::info!(payment_id = %payment.id, "payment processed");
            Ok(Json(ApiResponse::ok(payment)))
        }
        Err(declined) => {
            saga.fail_step(StepName::ProcessPayment, declined.reason.clone())?;

            let payload = serde_json::json!({ "orderId": req.order_id });
            let event = OutboxEvent::new(EventType::PaymentFailed, req.order_id, payload)?
                .with_max_retries(state.outbox_max_retries);
            state.payments.commit_declined(&saga, &event).await?;

            metrics::counter!("payment_declined_total").increment(1);
            tracing::warn!(reason = %declined.reason, "payment declined");
            Ok(Json(ApiResponse::failed(declined.reason)))
        }
    }
}

/// POST /api/v1/payment/refund — compensate a processed payment.
///
/// Marks the payment REFUNDED, records PROCESS_PAYMENT compensation, and
/// emits `OrderCompensated` to continue the backward chain toward the
/// order service.
#[tracing::instrument(skip(state, req), fields(saga_id = %req.saga_log_id))]
pub async fn refund(
    State(state): State<AppState>,
    RequireIdempotencyKey(key): RequireIdempotencyKey,
    Json(req): Json<RefundPaymentRequest>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    if let Some(existing) = state
        .payments
        .find_by_compensation_key(&key, req.order_id)
        .await?
    {
        return Ok(Json(ApiResponse::ok(existing)));
    }

    let Some(mut payment) = state.payments.find_by_saga(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("Payment not found")));
    };
    if payment.is_refunded() {
        return Ok(Json(ApiResponse::ok(payment)));
    }

    let Some(mut saga) = state.saga_logs.find_by_id(req.saga_log_id).await? else {
        return Ok(Json(ApiResponse::rejected("SagaLog not found")));
    };

    payment.refund(key);
    saga.compensate_step(StepName::ProcessPayment)?;

    let payload = serde_json::json!({ "orderId": req.order_id });
    let event = OutboxEvent::new(EventType::OrderCompensated, req.order_id, payload)?
        .with_max_retries(state.outbox_max_retries);
    state.payments.commit_refund(&payment, &saga, &event).await?;

    metrics::counter!("payment_refunded_total").increment(1);
    tracing::info!(payment_id = %payment.id, "payment refunded");
    Ok(Json(ApiResponse::ok(payment)))
}

/// GET /api/v1/payment/{paymentId} — load a payment by id.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    match state
        .payments
        .find_by_id(PaymentId::from_uuid(payment_id))
        .await?
    {
        Some(payment) => Ok(Json(ApiResponse::ok(payment))),
        None => Ok(Json(ApiResponse::rejected("Payment not found"))),
    }
}

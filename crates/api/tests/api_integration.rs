//! Router integration tests for the four participant services, driven
//! through `tower::ServiceExt::oneshot` over a shared in-memory backend.

use std::sync::{Arc, OnceLock};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{CustomerId, IDEMPOTENCY_KEY_HEADER, OrderId, SagaId};
use domain::FixedOutcomeAuthorizer;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    CompensationStatus, EventType, SagaLog, SagaStatus, StepName, StepStatus, TargetService,
};
use store::{InMemoryBackend, SagaLogStore};
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            metrics_exporter_prometheus::PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestStack {
    backend: InMemoryBackend,
    authorizer: FixedOutcomeAuthorizer,
    order: Router,
    payment: Router,
    inventory: Router,
    shipping: Router,
}

fn setup() -> TestStack {
    let backend = InMemoryBackend::new();
    let authorizer = FixedOutcomeAuthorizer::approving();
    let state = api::AppState::with_memory_backend(
        backend.clone(),
        Arc::new(authorizer.clone()),
        3,
    );

    TestStack {
        backend,
        authorizer,
        order: api::create_router(TargetService::Order, state.clone(), metrics_handle()),
        payment: api::create_router(TargetService::Payment, state.clone(), metrics_handle()),
        inventory: api::create_router(TargetService::Inventory, state.clone(), metrics_handle()),
        shipping: api::create_router(TargetService::Shipping, state, metrics_handle()),
    }
}

async fn post_json(
    app: &Router,
    path: &str,
    key: Option<&str>,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header(IDEMPOTENCY_KEY_HEADER, key);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn start_body() -> serde_json::Value {
    serde_json::json!({
        "customerId": Uuid::now_v7(),
        "productId": "SKU-001",
        "quantity": 2,
        "totalPrice": 40.0,
    })
}

/// Starts a saga and returns `(order_id, saga_log_id)`.
async fn start_saga(stack: &TestStack, key: &str) -> (OrderId, SagaId) {
    let (status, body) = post_json(&stack.order, "/api/v1/order/start", Some(key), start_body())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let order_id = body["data"]["orderId"].as_str().unwrap().parse().unwrap();
    let saga_id = body["data"]["sagaLogId"].as_str().unwrap().parse().unwrap();
    (
        OrderId::from_uuid(order_id),
        SagaId::from_uuid(saga_id),
    )
}

async fn load_saga(backend: &InMemoryBackend, saga_id: SagaId) -> SagaLog {
    backend.find_by_id(saga_id).await.unwrap().unwrap()
}

/// Runs the payment step for a started saga; returns the process reply.
async fn process_payment(
    stack: &TestStack,
    order_id: OrderId,
    saga_id: SagaId,
    key: &str,
) -> serde_json::Value {
    let (status, body) = post_json(
        &stack.payment,
        "/api/v1/payment/process",
        Some(key),
        serde_json::json!({
            "amount": 40.0,
            "customerId": Uuid::now_v7(),
            "orderId": order_id,
            "sagaLogId": saga_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[tokio::test]
async fn health_check() {
    let stack = setup();
    let (status, body) = get_json(&stack.order, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn metrics_endpoint_renders() {
    let stack = setup();
    let response = stack
        .order
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn start_order_creates_saga_order_and_event() {
    let stack = setup();
    let key = Uuid::now_v7().to_string();
    let (order_id, saga_id) = start_saga(&stack, &key).await;

    let saga = load_saga(&stack.backend, saga_id).await;
    assert_eq!(saga.status, SagaStatus::Started);
    assert_eq!(saga.order_id, Some(order_id));
    assert_eq!(saga.step(StepName::CreateOrder).status, StepStatus::Completed);
    assert_eq!(
        saga.step(StepName::ProcessPayment).status,
        StepStatus::Pending
    );

    assert!(stack.backend.has_event(order_id, EventType::OrderCreated).await);

    let (status, body) = get_json(&stack.order, &format!("/api/v1/order/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CONFIRMED");
}

#[tokio::test]
async fn start_order_requires_idempotency_key() {
    let stack = setup();
    let (status, body) = post_json(&stack.order, "/api/v1/order/start", None, start_body()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn start_order_rejects_non_uuid_key() {
    let stack = setup();
    let (status, _) =
        post_json(&stack.order, "/api/v1/order/start", Some("not-a-uuid"), start_body()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn start_order_rejects_nonpositive_quantity() {
    let stack = setup();
    let key = Uuid::now_v7().to_string();
    let mut body = start_body();
    body["quantity"] = serde_json::json!(0);
    let (status, _) = post_json(&stack.order, "/api/v1/order/start", Some(&key), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_start_replays_original_result() {
    let stack = setup();
    let key = Uuid::now_v7().to_string();
    let (order_id, saga_id) = start_saga(&stack, &key).await;
    let (order_id2, saga_id2) = start_saga(&stack, &key).await;

    assert_eq!(order_id, order_id2);
    assert_eq!(saga_id, saga_id2);
    assert_eq!(stack.backend.saga_count().await, 1);
    assert_eq!(stack.backend.order_count().await, 1);
    assert_eq!(stack.backend.outbox_events().await.len(), 1);
}

#[tokio::test]
async fn parallel_starts_with_same_key_create_one_saga() {
    let stack = setup();
    let key = Uuid::now_v7().to_string();
    let body = start_body();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let app = stack.order.clone();
        let key = key.clone();
        let body = body.clone();
        handles.push(tokio::spawn(async move {
            post_json(&app, "/api/v1/order/start", Some(&key), body).await
        }));
    }

    let mut seen_ids = std::collections::HashSet::new();
    for handle in handles {
        let (status, body) = handle.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        seen_ids.insert((
            body["data"]["orderId"].as_str().unwrap().to_string(),
            body["data"]["sagaLogId"].as_str().unwrap().to_string(),
        ));
    }

    assert_eq!(seen_ids.len(), 1, "all responses refer to one saga");
    assert_eq!(stack.backend.saga_count().await, 1);
    assert_eq!(stack.backend.order_count().await, 1);
}

#[tokio::test]
async fn payment_process_and_replay() {
    let stack = setup();
    let start_key = Uuid::now_v7().to_string();
    let (order_id, saga_id) = start_saga(&stack, &start_key).await;

    let pay_key = format!("{order_id}-OrderCreated");
    let first = process_payment(&stack, order_id, saga_id, &pay_key).await;
    assert_eq!(first["success"], true);
    assert_eq!(first["data"]["status"], "PROCESSED");

    let saga = load_saga(&stack.backend, saga_id).await;
    assert_eq!(
        saga.step(StepName::ProcessPayment).status,
        StepStatus::Completed
    );
    assert_eq!(saga.status, SagaStatus::InProgress);
    assert!(
        stack
            .backend
            .has_event(order_id, EventType::PaymentProcessed)
            .await
    );

    // Publisher retry: byte-identical data, no second payment row.
    let replay = process_payment(&stack, order_id, saga_id, &pay_key).await;
    assert_eq!(replay["data"]["id"], first["data"]["id"]);
    assert_eq!(replay["data"]["authorization"], first["data"]["authorization"]);
    assert_eq!(stack.backend.payment_count().await, 1);
}

#[tokio::test]
async fn payment_decline_opens_backward_chain() {
    let stack = setup();
    stack.authorizer.set_decline(true);
    let start_key = Uuid::now_v7().to_string();
    let (order_id, saga_id) = start_saga(&stack, &start_key).await;

    let pay_key = format!("{order_id}-OrderCreated");
    let reply = process_payment(&stack, order_id, saga_id, &pay_key).await;
    assert_eq!(reply["success"], false);
    assert!(reply["error"].as_str().unwrap().contains("declined"));

    let saga = load_saga(&stack.backend, saga_id).await;
    assert_eq!(saga.status, SagaStatus::Compensating);
    assert_eq!(saga.step(StepName::ProcessPayment).status, StepStatus::Failed);
    assert!(
        stack
            .backend
            .has_event(order_id, EventType::PaymentFailed)
            .await
    );
    assert_eq!(stack.backend.payment_count().await, 0);

    // Replay repeats the recorded outcome without a second event.
    let replay = process_payment(&stack, order_id, saga_id, &pay_key).await;
    assert_eq!(replay, reply);
    let failed_events = stack
        .backend
        .outbox_events()
        .await
        .into_iter()
        .filter(|e| e.event_type == EventType::PaymentFailed)
        .count();
    assert_eq!(failed_events, 1);
}

#[tokio::test]
async fn payment_process_unknown_saga_is_moot() {
    let stack = setup();
    let (status, body) = post_json(
        &stack.payment,
        "/api/v1/payment/process",
        Some("some-key"),
        serde_json::json!({
            "amount": 40.0,
            "customerId": Uuid::now_v7(),
            "orderId": OrderId::new(),
            "sagaLogId": SagaId::new(),
        }),
    )
    .await;

    // Moot requests reply 200 so the publisher stops retrying.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "SagaLog not found");
}

/// Saves a saga that has progressed through the payment step.
async fn saga_ready_for_inventory(backend: &InMemoryBackend) -> (OrderId, SagaLog) {
    let order_id = OrderId::new();
    let mut saga = SagaLog::new(Uuid::now_v7(), CustomerId::new(), "SKU-001", 2, 40.0);
    saga.order_id = Some(order_id);
    saga.complete_step(StepName::CreateOrder).unwrap();
    saga.begin_step(StepName::ProcessPayment).unwrap();
    saga.complete_step(StepName::ProcessPayment).unwrap();
    backend.save(&saga).await.unwrap();
    (order_id, saga)
}

#[tokio::test]
async fn inventory_update_auto_creates_stock() {
    let stack = setup();
    let (order_id, saga) = saga_ready_for_inventory(&stack.backend).await;

    let key = format!("{order_id}-PaymentProcessed");
    let (status, body) = post_json(
        &stack.inventory,
        "/api/v1/inventory/update",
        Some(&key),
        serde_json::json!({
            "orderId": order_id,
            "productId": "SKU-001",
            "quantity": 2,
            "sagaLogId": saga.saga_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "RESERVED");

    let (_, stock) = get_json(&stack.inventory, "/api/v1/inventory/SKU-001").await;
    assert_eq!(stock["data"]["quantity"], 98);
    assert_eq!(stock["data"]["reservedQuantity"], 2);

    assert!(
        stack
            .backend
            .has_event(order_id, EventType::InventoryUpdated)
            .await
    );
    let saga = load_saga(&stack.backend, saga.saga_id).await;
    assert_eq!(
        saga.step(StepName::UpdateInventory).status,
        StepStatus::Completed
    );
}

#[tokio::test]
async fn inventory_update_insufficient_stock_fails_step() {
    let stack = setup();
    let (order_id, saga) = saga_ready_for_inventory(&stack.backend).await;

    post_json(
        &stack.inventory,
        "/api/v1/inventory/initialize",
        None,
        serde_json::json!({"productId": "SKU-SCARCE", "quantity": 100}),
    )
    .await;

    let key = format!("{order_id}-PaymentProcessed");
    let (status, body) = post_json(
        &stack.inventory,
        "/api/v1/inventory/update",
        Some(&key),
        serde_json::json!({
            "orderId": order_id,
            "productId": "SKU-SCARCE",
            "quantity": 200,
            "sagaLogId": saga.saga_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("Insufficient"));

    // Stock untouched, failure recorded, refund event enqueued.
    let (_, stock) = get_json(&stack.inventory, "/api/v1/inventory/SKU-SCARCE").await;
    assert_eq!(stock["data"]["quantity"], 100);
    assert_eq!(stock["data"]["reservedQuantity"], 0);

    let saga = load_saga(&stack.backend, saga.saga_id).await;
    assert_eq!(saga.step(StepName::UpdateInventory).status, StepStatus::Failed);
    assert_eq!(saga.status, SagaStatus::Compensating);
    assert!(
        stack
            .backend
            .has_event(order_id, EventType::InventoryFailed)
            .await
    );
    assert_eq!(stack.backend.reservation_count().await, 0);
}

#[tokio::test]
async fn inventory_compensate_restores_stock() {
    let stack = setup();
    let (order_id, saga) = saga_ready_for_inventory(&stack.backend).await;

    let update_key = format!("{order_id}-PaymentProcessed");
    post_json(
        &stack.inventory,
        "/api/v1/inventory/update",
        Some(&update_key),
        serde_json::json!({
            "orderId": order_id,
            "productId": "SKU-001",
            "quantity": 2,
            "sagaLogId": saga.saga_id,
        }),
    )
    .await;

    let comp_key = format!("{order_id}-Compensation");
    let (status, body) = post_json(
        &stack.inventory,
        "/api/v1/inventory/compensate",
        Some(&comp_key),
        serde_json::json!({
            "orderId": order_id,
            "productId": "SKU-001",
            "quantity": 2,
            "sagaLogId": saga.saga_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "COMPENSATED");

    let (_, stock) = get_json(&stack.inventory, "/api/v1/inventory/SKU-001").await;
    assert_eq!(stock["data"]["quantity"], 100);
    assert_eq!(stock["data"]["reservedQuantity"], 0);

    let saga = load_saga(&stack.backend, saga.saga_id).await;
    assert_eq!(
        saga.step(StepName::UpdateInventory).compensation_status,
        CompensationStatus::Completed
    );

    // Replay with the same compensation key changes nothing further.
    let (_, replay) = post_json(
        &stack.inventory,
        "/api/v1/inventory/compensate",
        Some(&comp_key),
        serde_json::json!({
            "orderId": order_id,
            "productId": "SKU-001",
            "quantity": 2,
            "sagaLogId": saga.saga_id,
        }),
    )
    .await;
    assert_eq!(replay["success"], true);
    let (_, stock) = get_json(&stack.inventory, "/api/v1/inventory/SKU-001").await;
    assert_eq!(stock["data"]["quantity"], 100);
}

/// Saves a saga that has progressed through the inventory step.
async fn saga_ready_for_shipping(backend: &InMemoryBackend) -> (OrderId, SagaLog) {
    let (order_id, mut saga) = saga_ready_for_inventory(backend).await;
    saga.begin_step(StepName::UpdateInventory).unwrap();
    saga.complete_step(StepName::UpdateInventory).unwrap();
    backend.save(&saga).await.unwrap();
    (order_id, saga)
}

#[tokio::test]
async fn shipping_deliver_completes_saga() {
    let stack = setup();
    let (order_id, saga) = saga_ready_for_shipping(&stack.backend).await;

    let key = format!("{order_id}-InventoryUpdated");
    let deliver = serde_json::json!({
        "customerId": Uuid::now_v7(),
        "orderId": order_id,
        "sagaLogId": saga.saga_id,
    });
    let (status, body) = post_json(
        &stack.shipping,
        "/api/v1/shipping/deliver",
        Some(&key),
        deliver.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "SHIPPED");

    let saga_after = load_saga(&stack.backend, saga.saga_id).await;
    assert_eq!(saga_after.status, SagaStatus::Completed);
    assert!(saga_after.is_completed());

    // Replay returns the same shipment, no duplicate row.
    let (_, replay) = post_json(&stack.shipping, "/api/v1/shipping/deliver", Some(&key), deliver)
        .await;
    assert_eq!(replay["data"]["id"], body["data"]["id"]);
    assert_eq!(stack.backend.shipment_count().await, 1);
}

#[tokio::test]
async fn shipping_cancel_marks_compensation() {
    let stack = setup();
    let (order_id, saga) = saga_ready_for_shipping(&stack.backend).await;

    let deliver_key = format!("{order_id}-InventoryUpdated");
    post_json(
        &stack.shipping,
        "/api/v1/shipping/deliver",
        Some(&deliver_key),
        serde_json::json!({
            "customerId": Uuid::now_v7(),
            "orderId": order_id,
            "sagaLogId": saga.saga_id,
        }),
    )
    .await;

    let cancel_key = format!("{order_id}-Cancel");
    let (status, body) = post_json(
        &stack.shipping,
        "/api/v1/shipping/cancel",
        Some(&cancel_key),
        serde_json::json!({"orderId": order_id, "sagaLogId": saga.saga_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "CANCELLED");

    let saga_after = load_saga(&stack.backend, saga.saga_id).await;
    assert_eq!(
        saga_after.step(StepName::DeliverOrder).compensation_status,
        CompensationStatus::Completed
    );
    // Completion is terminal; cancellation never rewinds it.
    assert_eq!(saga_after.status, SagaStatus::Completed);
}

#[tokio::test]
async fn order_compensate_terminates_backward_chain() {
    let stack = setup();
    stack.authorizer.set_decline(true);
    let start_key = Uuid::now_v7().to_string();
    let (order_id, saga_id) = start_saga(&stack, &start_key).await;
    process_payment(&stack, order_id, saga_id, &format!("{order_id}-OrderCreated")).await;

    let (status, body) = post_json(
        &stack.order,
        "/api/v1/order/compensate",
        Some(&format!("{order_id}-PaymentFailed")),
        serde_json::json!({"orderId": order_id}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPENSATED");

    let saga = load_saga(&stack.backend, saga_id).await;
    assert_eq!(saga.status, SagaStatus::Compensated);
    assert_eq!(
        saga.step(StepName::CreateOrder).compensation_status,
        CompensationStatus::Completed
    );

    // Replay short-circuits on the already-compensated order.
    let (_, replay) = post_json(
        &stack.order,
        "/api/v1/order/compensate",
        Some(&format!("{order_id}-PaymentFailed")),
        serde_json::json!({"orderId": order_id}),
    )
    .await;
    assert_eq!(replay["data"]["status"], "COMPENSATED");
    assert_eq!(stack.backend.saga_count().await, 1);
}

#[tokio::test]
async fn payment_refund_continues_backward_chain() {
    let stack = setup();
    let start_key = Uuid::now_v7().to_string();
    let (order_id, saga_id) = start_saga(&stack, &start_key).await;
    process_payment(&stack, order_id, saga_id, &format!("{order_id}-OrderCreated")).await;

    // Inventory failed downstream; its event targets the refund endpoint.
    let refund_key = format!("{order_id}-InventoryFailed");
    let refund = serde_json::json!({"orderId": order_id, "sagaLogId": saga_id});
    let (status, body) = post_json(
        &stack.payment,
        "/api/v1/payment/refund",
        Some(&refund_key),
        refund.clone(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "REFUNDED");

    let saga = load_saga(&stack.backend, saga_id).await;
    assert_eq!(
        saga.step(StepName::ProcessPayment).compensation_status,
        CompensationStatus::Completed
    );
    assert!(
        stack
            .backend
            .has_event(order_id, EventType::OrderCompensated)
            .await
    );

    // Replay by compensation key returns the same refunded payment.
    let (_, replay) =
        post_json(&stack.payment, "/api/v1/payment/refund", Some(&refund_key), refund).await;
    assert_eq!(replay["data"]["id"], body["data"]["id"]);
    assert_eq!(stack.backend.payment_count().await, 1);
}

#[tokio::test]
async fn get_endpoints_report_missing_rows_in_envelope() {
    let stack = setup();

    let (status, body) =
        get_json(&stack.order, &format!("/api/v1/order/{}", Uuid::now_v7())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);

    let (_, body) = get_json(&stack.payment, &format!("/api/v1/payment/{}", Uuid::now_v7())).await;
    assert_eq!(body["success"], false);

    let (_, body) = get_json(&stack.inventory, "/api/v1/inventory/SKU-MISSING").await;
    assert_eq!(body["success"], false);

    let (_, body) =
        get_json(&stack.shipping, &format!("/api/v1/shipping/{}", Uuid::now_v7())).await;
    assert_eq!(body["success"], false);
}

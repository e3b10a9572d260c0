//! The outbox publisher: polls unpublished events and relays them over
//! HTTP.

use std::sync::Arc;

use common::IDEMPOTENCY_KEY_HEADER;
use futures_util::StreamExt;
use saga::OutboxEvent;
use store::{OutboxStore, StoreError};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::PublisherConfig;

/// Upper bound on concurrent dispatches within one poll cycle.
pub const DISPATCH_CONCURRENCY: usize = 5;

/// A failed delivery attempt. All variants are retried up to the event's
/// retry budget.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport-level failure (connect error, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The target replied outside 2xx.
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    /// The target replied 2xx but the body was not JSON.
    #[error("response body is not JSON: {0}")]
    Body(#[source] reqwest::Error),
}

/// Background relay for one service's outbox.
///
/// A single publisher runs per service process. The loop is stateless:
/// after a crash the next start rescans the outbox and re-delivers
/// unpublished rows, and target participants absorb the duplicates through
/// their idempotency keys. Events within a saga need no FIFO here because a
/// successor event is only appended after its predecessor was delivered and
/// applied.
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    client: reqwest::Client,
    config: PublisherConfig,
}

impl OutboxPublisher {
    /// Creates a publisher over the given outbox.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        config: PublisherConfig,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            store,
            client,
            config,
        })
    }

    /// Runs the poll loop until `shutdown` fires.
    ///
    /// A cycle in flight always runs to completion; shutdown interrupts
    /// only the sleep, so in-flight dispatches finish (or hit their
    /// request timeout) before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            batch_size = self.config.batch_size,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "outbox publisher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            if let Err(e) = self.run_cycle().await {
                tracing::warn!(error = %e, "outbox poll cycle failed");
            }
            if *shutdown.borrow() {
                break;
            }
        }

        tracing::info!("outbox publisher stopped");
    }

    /// One poll cycle: fetch a batch and dispatch it with bounded fan-out.
    /// Returns the number of events dispatched.
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<usize, StoreError> {
        let events = self.store.find_unpublished(self.config.batch_size).await?;
        if events.is_empty() {
            return Ok(0);
        }

        let count = events.len();
        futures_util::stream::iter(events)
            .for_each_concurrent(DISPATCH_CONCURRENCY, |event| self.dispatch(event))
            .await;
        Ok(count)
    }

    #[tracing::instrument(
        skip(self, event),
        fields(
            event_id = %event.id,
            event_type = %event.event_type,
            target = %event.target_service,
        )
    )]
    async fn dispatch(&self, mut event: OutboxEvent) {
        let started = std::time::Instant::now();
        match self.deliver(&event).await {
            Ok(()) => {
                event.mark_published();
                metrics::counter!("outbox_events_published_total").increment(1);
                metrics::histogram!("outbox_dispatch_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                if let Err(e) = self.store.save(&event).await {
                    // The event stays unpublished and will be re-delivered;
                    // the target short-circuits on the idempotency key.
                    tracing::error!(error = %e, "failed to persist publish success");
                }
            }
            Err(e) => {
                metrics::counter!("outbox_publish_failures_total").increment(1);
                event.record_failure(e.to_string());
                if event.is_exhausted() {
                    metrics::counter!("outbox_events_terminally_failed_total").increment(1);
                    tracing::warn!(
                        error = %e,
                        attempts = event.publish_attempts,
                        "event exhausted its retry budget"
                    );
                } else {
                    tracing::debug!(
                        error = %e,
                        attempts = event.publish_attempts,
                        "publish attempt failed"
                    );
                }
                if let Err(save_err) = self.store.save(&event).await {
                    tracing::error!(error = %save_err, "failed to persist publish failure");
                }
            }
        }
    }

    /// Delivers one event: JSON POST to
    /// `base(target) + "/api/v1" + endpoint` with the deterministic
    /// idempotency header. Success requires 2xx and a JSON body; a
    /// `{success:false}` envelope still counts as delivered (the event is
    /// moot and must not be retried).
    async fn deliver(&self, event: &OutboxEvent) -> Result<(), PublishError> {
        let url = format!(
            "{}/api/v1{}",
            self.config.urls.base(event.target_service),
            event.target_endpoint
        );

        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, event.dispatch_key())
            .json(&event.payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(PublishError::Status(status));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(PublishError::Body)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceUrls;
    use axum::Router;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use common::OrderId;
    use saga::EventType;
    use std::sync::Mutex;
    use std::time::Duration;
    use store::InMemoryBackend;

    type SeenRequests = Arc<Mutex<Vec<(String, Option<String>)>>>;

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn publisher_for(backend: &InMemoryBackend, base: &str) -> OutboxPublisher {
        let config = PublisherConfig {
            request_timeout: Duration::from_millis(500),
            urls: ServiceUrls::uniform(base),
            ..PublisherConfig::default()
        };
        OutboxPublisher::new(Arc::new(backend.clone()), config).unwrap()
    }

    fn pending_event() -> OutboxEvent {
        OutboxEvent::new(
            EventType::OrderCreated,
            OrderId::new(),
            serde_json::json!({"orderId": "o-1"}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn delivers_with_deterministic_idempotency_header() {
        let seen: SeenRequests = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .route(
                "/api/v1/payment/process",
                post(
                    |State(seen): State<SeenRequests>, headers: HeaderMap| async move {
                        let key = headers
                            .get(IDEMPOTENCY_KEY_HEADER)
                            .and_then(|v| v.to_str().ok())
                            .map(String::from);
                        seen.lock()
                            .unwrap()
                            .push(("/api/v1/payment/process".to_string(), key));
                        axum::Json(serde_json::json!({"success": true}))
                    },
                ),
            )
            .with_state(seen.clone());
        let base = spawn_server(router).await;

        let backend = InMemoryBackend::new();
        let event = pending_event();
        let expected_key = event.dispatch_key();
        backend.append(&event).await.unwrap();

        let publisher = publisher_for(&backend, &base);
        assert_eq!(publisher.run_cycle().await.unwrap(), 1);

        let requests = seen.lock().unwrap().clone();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1.as_deref(), Some(expected_key.as_str()));

        let events = backend.outbox_events().await;
        assert!(events[0].is_published);
        assert!(events[0].published_at.is_some());
        assert_eq!(events[0].publish_attempts, 0);
    }

    #[tokio::test]
    async fn rejected_envelope_still_counts_as_delivered() {
        let router = Router::new().route(
            "/api/v1/payment/process",
            post(|| async {
                axum::Json(serde_json::json!({"success": false, "message": "SagaLog not found"}))
            }),
        );
        let base = spawn_server(router).await;

        let backend = InMemoryBackend::new();
        backend.append(&pending_event()).await.unwrap();

        let publisher = publisher_for(&backend, &base);
        publisher.run_cycle().await.unwrap();

        assert!(backend.outbox_events().await[0].is_published);
    }

    #[tokio::test]
    async fn server_error_increments_attempts_until_terminal() {
        let router = Router::new().route(
            "/api/v1/payment/process",
            post(|| async { axum::http::StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn_server(router).await;

        let backend = InMemoryBackend::new();
        backend.append(&pending_event()).await.unwrap();

        let publisher = publisher_for(&backend, &base);
        for attempt in 1..=3 {
            assert_eq!(publisher.run_cycle().await.unwrap(), 1);
            let event = backend.outbox_events().await.remove(0);
            assert_eq!(event.publish_attempts, attempt);
            assert!(!event.is_published);
        }

        // Terminally failed: no longer polled.
        assert_eq!(publisher.run_cycle().await.unwrap(), 0);
        let event = backend.outbox_events().await.remove(0);
        assert!(event.is_exhausted());
        assert!(event.last_error.unwrap().contains("500"));
    }

    #[tokio::test]
    async fn non_json_body_is_a_failed_attempt() {
        let router = Router::new().route("/api/v1/payment/process", post(|| async { "ok" }));
        let base = spawn_server(router).await;

        let backend = InMemoryBackend::new();
        backend.append(&pending_event()).await.unwrap();

        let publisher = publisher_for(&backend, &base);
        publisher.run_cycle().await.unwrap();

        let event = backend.outbox_events().await.remove(0);
        assert!(!event.is_published);
        assert_eq!(event.publish_attempts, 1);
    }

    #[tokio::test]
    async fn unreachable_target_is_a_failed_attempt() {
        let backend = InMemoryBackend::new();
        backend.append(&pending_event()).await.unwrap();

        // Nothing listens on port 9; every dispatch fails at transport level.
        let publisher = publisher_for(&backend, "http://127.0.0.1:9");
        publisher.run_cycle().await.unwrap();

        let event = backend.outbox_events().await.remove(0);
        assert!(!event.is_published);
        assert_eq!(event.publish_attempts, 1);
        assert!(event.last_error.is_some());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let backend = InMemoryBackend::new();
        let config = PublisherConfig {
            poll_interval: Duration::from_millis(10),
            urls: ServiceUrls::uniform("http://127.0.0.1:9"),
            ..PublisherConfig::default()
        };
        let publisher = OutboxPublisher::new(Arc::new(backend), config).unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { publisher.run(rx).await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("publisher did not stop after shutdown")
            .unwrap();
    }
}

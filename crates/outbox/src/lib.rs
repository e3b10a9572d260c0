//! Outbox publisher for at-least-once inter-service event delivery.
//!
//! Each service process runs one publisher over its own outbox table. The
//! publisher polls unpublished events, POSTs them to the target service
//! with a deterministic idempotency header, and retries failures up to a
//! bounded attempt budget. Delivery is at-least-once; receivers
//! deduplicate.

pub mod config;
pub mod publisher;

pub use config::{PublisherConfig, ServiceUrls};
pub use publisher::{DISPATCH_CONCURRENCY, OutboxPublisher, PublishError};

//! The Payment participant record and the authorization seam.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, IdempotencyKey, OrderId, PaymentId, SagaId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::UnknownStatus;

/// Lifecycle of a payment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Processed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Processed => "PROCESSED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSED" => Ok(PaymentStatus::Processed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(UnknownStatus::new("payment", other)),
        }
    }
}

/// A payment row, created only on a successful charge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub order_id: OrderId,
    pub saga_id: SagaId,
    pub customer_id: CustomerId,
    pub amount: f64,
    /// Processor reference returned by the authorizer.
    pub authorization: String,
    pub status: PaymentStatus,
    pub idempotency_key: IdempotencyKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compensation_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Creates a processed payment row.
    pub fn processed(
        order_id: OrderId,
        saga_id: SagaId,
        customer_id: CustomerId,
        amount: f64,
        authorization: impl Into<String>,
        idempotency_key: IdempotencyKey,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            saga_id,
            customer_id,
            amount,
            authorization: authorization.into(),
            status: PaymentStatus::Processed,
            idempotency_key,
            compensation_key: None,
            created_at: Utc::now(),
        }
    }

    /// Applies the refund in place.
    pub fn refund(&mut self, compensation_key: IdempotencyKey) {
        self.status = PaymentStatus::Refunded;
        self.compensation_key = Some(compensation_key);
    }

    pub fn is_refunded(&self) -> bool {
        self.status == PaymentStatus::Refunded
    }
}

/// A declined charge. This is a business outcome, not a transport error;
/// the saga reacts by compensating, and the caller replies HTTP 200.
#[derive(Debug, Clone, Error)]
#[error("{reason}")]
pub struct PaymentDeclined {
    pub reason: String,
}

impl PaymentDeclined {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Charge authorization seam for the payment service.
#[async_trait]
pub trait PaymentAuthorizer: Send + Sync {
    /// Returns the processor reference on approval, or the decline reason.
    async fn authorize(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        amount: f64,
    ) -> Result<String, PaymentDeclined>;
}

/// Simulated processor that declines a configurable fraction of charges.
///
/// The rate comes from configuration (`PAYMENT_FAILURE_RATE`), never a
/// hard-coded constant.
#[derive(Debug, Clone)]
pub struct SimulatedAuthorizer {
    failure_rate: f64,
}

impl SimulatedAuthorizer {
    pub fn new(failure_rate: f64) -> Self {
        Self {
            failure_rate: failure_rate.clamp(0.0, 1.0),
        }
    }
}

#[async_trait]
impl PaymentAuthorizer for SimulatedAuthorizer {
    async fn authorize(
        &self,
        _order_id: OrderId,
        _customer_id: CustomerId,
        _amount: f64,
    ) -> Result<String, PaymentDeclined> {
        if rand::thread_rng().gen_bool(self.failure_rate) {
            return Err(PaymentDeclined::new("Payment declined: insufficient funds"));
        }
        Ok(format!("AUTH-{}", Uuid::now_v7().simple()))
    }
}

/// Deterministic authorizer for tests: approves or declines on demand.
#[derive(Debug, Clone, Default)]
pub struct FixedOutcomeAuthorizer {
    decline: Arc<AtomicBool>,
}

impl FixedOutcomeAuthorizer {
    pub fn approving() -> Self {
        Self::default()
    }

    pub fn declining() -> Self {
        let authorizer = Self::default();
        authorizer.set_decline(true);
        authorizer
    }

    pub fn set_decline(&self, decline: bool) {
        self.decline.store(decline, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentAuthorizer for FixedOutcomeAuthorizer {
    async fn authorize(
        &self,
        _order_id: OrderId,
        _customer_id: CustomerId,
        _amount: f64,
    ) -> Result<String, PaymentDeclined> {
        if self.decline.load(Ordering::SeqCst) {
            return Err(PaymentDeclined::new("Payment declined: insufficient funds"));
        }
        Ok(format!("AUTH-{}", Uuid::now_v7().simple()))
    }
}

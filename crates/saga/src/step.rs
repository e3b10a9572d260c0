//! The fixed step alphabet of the order-fulfillment saga.

use serde::{Deserialize, Serialize};

/// The four saga steps, in declared forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepName {
    CreateOrder,
    ProcessPayment,
    UpdateInventory,
    DeliverOrder,
}

impl StepName {
    /// All steps in forward execution order.
    pub const ALL: [StepName; 4] = [
        StepName::CreateOrder,
        StepName::ProcessPayment,
        StepName::UpdateInventory,
        StepName::DeliverOrder,
    ];

    /// Returns the step name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepName::CreateOrder => "CREATE_ORDER",
            StepName::ProcessPayment => "PROCESS_PAYMENT",
            StepName::UpdateInventory => "UPDATE_INVENTORY",
            StepName::DeliverOrder => "DELIVER_ORDER",
        }
    }

    /// Zero-based position of the step in the forward order.
    pub fn position(&self) -> usize {
        Self::ALL
            .iter()
            .position(|s| s == self)
            .expect("step is in the alphabet")
    }
}

impl std::fmt::Display for StepName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Forward progress of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Compensated,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "PENDING",
            StepStatus::InProgress => "IN_PROGRESS",
            StepStatus::Completed => "COMPLETED",
            StepStatus::Failed => "FAILED",
            StepStatus::Compensated => "COMPENSATED",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backward (compensation) progress of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompensationStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl CompensationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationStatus::Pending => "PENDING",
            CompensationStatus::InProgress => "IN_PROGRESS",
            CompensationStatus::Completed => "COMPLETED",
            CompensationStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for CompensationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

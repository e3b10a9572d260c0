//! The persistent saga log.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, SagaId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SagaError;
use crate::state::SagaStatus;
use crate::step::{CompensationStatus, StepName, StepStatus};

/// Forward and backward progress of one named step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaStep {
    pub name: StepName,
    pub status: StepStatus,
    pub compensation_status: CompensationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl SagaStep {
    fn pending(name: StepName) -> Self {
        Self {
            name,
            status: StepStatus::Pending,
            compensation_status: CompensationStatus::Pending,
            error: None,
            timestamp: None,
        }
    }
}

/// Durable record of one saga: the business payload frozen at initiation,
/// the overall status, and one step record per step name in declared order.
///
/// The log is mutated in place (load, update the current step, save); the
/// store serializes `steps` as a JSON array so the declared order survives
/// storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SagaLog {
    pub saga_id: SagaId,
    /// Unique across all sagas; the dedupe anchor for initiation.
    pub idempotency_key: Uuid,
    pub customer_id: CustomerId,
    pub product_id: String,
    pub quantity: i32,
    pub total_price: f64,
    pub order_id: Option<OrderId>,
    pub status: SagaStatus,
    pub steps: Vec<SagaStep>,
    pub created_at: DateTime<Utc>,
}

impl SagaLog {
    /// Creates a new saga log with all four steps pending.
    pub fn new(
        idempotency_key: Uuid,
        customer_id: CustomerId,
        product_id: impl Into<String>,
        quantity: i32,
        total_price: f64,
    ) -> Self {
        Self {
            saga_id: SagaId::new(),
            idempotency_key,
            customer_id,
            product_id: product_id.into(),
            quantity,
            total_price,
            order_id: None,
            status: SagaStatus::Started,
            steps: StepName::ALL.iter().copied().map(SagaStep::pending).collect(),
            created_at: Utc::now(),
        }
    }

    /// Returns the record for the named step.
    pub fn step(&self, name: StepName) -> &SagaStep {
        self.steps
            .iter()
            .find(|s| s.name == name)
            .expect("saga log carries every step of the alphabet")
    }

    fn step_mut(&mut self, name: StepName) -> &mut SagaStep {
        self.steps
            .iter_mut()
            .find(|s| s.name == name)
            .expect("saga log carries every step of the alphabet")
    }

    /// Names of all steps that have completed, in declared order.
    pub fn completed_steps(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .map(|s| s.name)
            .collect()
    }

    fn transition(&mut self, next: SagaStatus) -> Result<(), SagaError> {
        if !self.status.can_transition_to(next) {
            return Err(SagaError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn ensure_compensating(&mut self) -> Result<(), SagaError> {
        if self.status == SagaStatus::Compensating {
            return Ok(());
        }
        self.transition(SagaStatus::Compensating)
    }

    /// Marks the named step in progress.
    ///
    /// The first step beyond initiation moves the saga from STARTED to
    /// IN_PROGRESS.
    pub fn begin_step(&mut self, name: StepName) -> Result<(), SagaError> {
        if name != StepName::CreateOrder && self.status == SagaStatus::Started {
            self.transition(SagaStatus::InProgress)?;
        }
        let step = self.step_mut(name);
        step.status = StepStatus::InProgress;
        step.timestamp = Some(Utc::now());
        Ok(())
    }

    /// Marks the named step completed.
    ///
    /// A step may only complete once every preceding step has completed;
    /// completing DELIVER_ORDER completes the saga.
    pub fn complete_step(&mut self, name: StepName) -> Result<(), SagaError> {
        if let Some(missing) = StepName::ALL[..name.position()]
            .iter()
            .find(|s| self.step(**s).status != StepStatus::Completed)
        {
            return Err(SagaError::StepOrder {
                step: name,
                missing: *missing,
            });
        }
        let step = self.step_mut(name);
        step.status = StepStatus::Completed;
        step.error = None;
        step.timestamp = Some(Utc::now());
        if name == StepName::DeliverOrder {
            self.transition(SagaStatus::Completed)?;
        }
        Ok(())
    }

    /// Marks the named step failed and opens the backward chain.
    pub fn fail_step(&mut self, name: StepName, error: impl Into<String>) -> Result<(), SagaError> {
        let step = self.step_mut(name);
        step.status = StepStatus::Failed;
        step.error = Some(error.into());
        step.timestamp = Some(Utc::now());
        self.ensure_compensating()
    }

    /// Marks the named step compensated.
    ///
    /// Compensating CREATE_ORDER terminates the backward chain and moves
    /// the saga to COMPENSATED. Compensations applied after the saga
    /// reached a terminal status (a post-completion shipment cancellation)
    /// mark the step only; terminal statuses are never left.
    pub fn compensate_step(&mut self, name: StepName) -> Result<(), SagaError> {
        if !self.status.is_terminal() {
            self.ensure_compensating()?;
        }
        let step = self.step_mut(name);
        step.status = StepStatus::Compensated;
        step.compensation_status = CompensationStatus::Completed;
        step.timestamp = Some(Utc::now());
        if name == StepName::CreateOrder && self.status == SagaStatus::Compensating {
            self.transition(SagaStatus::Compensated)?;
        }
        Ok(())
    }

    /// Records a failed compensation; the saga becomes FAILED and needs an
    /// operator.
    pub fn fail_compensation(
        &mut self,
        name: StepName,
        error: impl Into<String>,
    ) -> Result<(), SagaError> {
        if !self.status.is_terminal() {
            self.ensure_compensating()?;
        }
        let step = self.step_mut(name);
        step.compensation_status = CompensationStatus::Failed;
        step.error = Some(error.into());
        step.timestamp = Some(Utc::now());
        if self.status == SagaStatus::Compensating {
            self.transition(SagaStatus::Failed)?;
        }
        Ok(())
    }

    /// True once every step has completed.
    pub fn is_completed(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_log() -> SagaLog {
        SagaLog::new(Uuid::now_v7(), CustomerId::new(), "SKU-001", 2, 40.0)
    }

    #[test]
    fn new_log_has_four_pending_steps_in_order() {
        let log = new_log();
        assert_eq!(log.status, SagaStatus::Started);
        assert_eq!(log.steps.len(), 4);
        let names: Vec<StepName> = log.steps.iter().map(|s| s.name).collect();
        assert_eq!(names, StepName::ALL);
        assert!(log.steps.iter().all(|s| s.status == StepStatus::Pending));
        assert!(
            log.steps
                .iter()
                .all(|s| s.compensation_status == CompensationStatus::Pending)
        );
    }

    #[test]
    fn forward_happy_path() {
        let mut log = new_log();

        for name in StepName::ALL {
            log.begin_step(name).unwrap();
            log.complete_step(name).unwrap();
        }

        assert!(log.is_completed());
        assert_eq!(log.status, SagaStatus::Completed);
        assert!(log.steps.iter().all(|s| s.timestamp.is_some()));
    }

    #[test]
    fn step_cannot_complete_out_of_order() {
        let mut log = new_log();
        log.begin_step(StepName::CreateOrder).unwrap();
        log.complete_step(StepName::CreateOrder).unwrap();

        let result = log.complete_step(StepName::UpdateInventory);
        assert!(matches!(
            result,
            Err(SagaError::StepOrder {
                step: StepName::UpdateInventory,
                missing: StepName::ProcessPayment,
            })
        ));
    }

    #[test]
    fn second_step_moves_saga_in_progress() {
        let mut log = new_log();
        log.begin_step(StepName::CreateOrder).unwrap();
        log.complete_step(StepName::CreateOrder).unwrap();
        assert_eq!(log.status, SagaStatus::Started);

        log.begin_step(StepName::ProcessPayment).unwrap();
        assert_eq!(log.status, SagaStatus::InProgress);
    }

    #[test]
    fn failure_opens_backward_chain() {
        let mut log = new_log();
        log.complete_step(StepName::CreateOrder).unwrap();
        log.begin_step(StepName::ProcessPayment).unwrap();
        log.fail_step(StepName::ProcessPayment, "declined").unwrap();

        assert_eq!(log.status, SagaStatus::Compensating);
        let step = log.step(StepName::ProcessPayment);
        assert_eq!(step.status, StepStatus::Failed);
        assert_eq!(step.error.as_deref(), Some("declined"));
    }

    #[test]
    fn compensating_create_order_terminates_the_chain() {
        let mut log = new_log();
        log.complete_step(StepName::CreateOrder).unwrap();
        log.begin_step(StepName::ProcessPayment).unwrap();
        log.fail_step(StepName::ProcessPayment, "declined").unwrap();

        log.compensate_step(StepName::CreateOrder).unwrap();
        assert_eq!(log.status, SagaStatus::Compensated);
        let step = log.step(StepName::CreateOrder);
        assert_eq!(step.status, StepStatus::Compensated);
        assert_eq!(step.compensation_status, CompensationStatus::Completed);
    }

    #[test]
    fn compensated_saga_admits_no_forward_progress() {
        let mut log = new_log();
        log.complete_step(StepName::CreateOrder).unwrap();
        log.fail_step(StepName::ProcessPayment, "declined").unwrap();
        log.compensate_step(StepName::CreateOrder).unwrap();

        assert!(log.complete_step(StepName::ProcessPayment).is_err());
    }

    #[test]
    fn failed_compensation_marks_saga_failed() {
        let mut log = new_log();
        log.complete_step(StepName::CreateOrder).unwrap();
        log.begin_step(StepName::UpdateInventory).unwrap();
        log.fail_step(StepName::UpdateInventory, "out of stock").unwrap();

        log.fail_compensation(StepName::UpdateInventory, "stock row missing")
            .unwrap();
        assert_eq!(log.status, SagaStatus::Failed);
        assert_eq!(
            log.step(StepName::UpdateInventory).compensation_status,
            CompensationStatus::Failed
        );
    }

    #[test]
    fn post_completion_cancellation_marks_step_but_keeps_terminal_status() {
        let mut log = new_log();
        for name in StepName::ALL {
            log.begin_step(name).unwrap();
            log.complete_step(name).unwrap();
        }
        assert_eq!(log.status, SagaStatus::Completed);

        log.compensate_step(StepName::DeliverOrder).unwrap();
        assert_eq!(log.status, SagaStatus::Completed);
        assert_eq!(
            log.step(StepName::DeliverOrder).compensation_status,
            CompensationStatus::Completed
        );
    }

    #[test]
    fn steps_serialize_as_ordered_array() {
        let log = new_log();
        let json = serde_json::to_value(&log).unwrap();
        let steps = json["steps"].as_array().unwrap();
        let names: Vec<&str> = steps.iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(
            names,
            ["CREATE_ORDER", "PROCESS_PAYMENT", "UPDATE_INVENTORY", "DELIVER_ORDER"]
        );

        let back: SagaLog = serde_json::from_value(json).unwrap();
        assert_eq!(back.saga_id, log.saga_id);
        assert_eq!(
            back.steps.iter().map(|s| s.name).collect::<Vec<_>>(),
            StepName::ALL
        );
    }

    #[test]
    fn completed_steps_reports_in_declared_order() {
        let mut log = new_log();
        log.complete_step(StepName::CreateOrder).unwrap();
        log.begin_step(StepName::ProcessPayment).unwrap();
        log.complete_step(StepName::ProcessPayment).unwrap();

        assert_eq!(
            log.completed_steps(),
            vec![StepName::CreateOrder, StepName::ProcessPayment]
        );
    }
}

//! Expense approval flows.
//!
//! # Modules
//!
//! - `types` - Flow, request and expense domain types
//! - `error` - Approval error taxonomy
//! - `flow` - Flow definition validation
//! - `evaluator` - Rule-type evaluation of a step
//! - `generator` - Approver resolution and request creation
//! - `authorization` - Who may decide a request
//! - `store` - Storage seam
//! - `memory` - In-memory store
//! - `service` - Orchestration of submissions, decisions and overrides

pub mod authorization;
pub mod error;
pub mod evaluator;
pub mod flow;
pub mod generator;
pub mod memory;
pub mod service;
pub mod store;
pub mod types;

#[cfg(test)]
mod evaluator_props;

pub use authorization::can_act;
pub use error::ApprovalError;
pub use evaluator::{DecisionEvaluator, StepTally, StepVerdict};
pub use flow::FlowValidator;
pub use generator::RequestGenerator;
pub use memory::InMemoryApprovalStore;
pub use service::{ApprovalService, MAX_DECISION_ATTEMPTS};
pub use store::{ApprovalStore, DecisionCommit, FlowStart};
pub use types::{
    ApprovalFlow, ApprovalHistoryEntry, ApprovalRequest, ApproverRule, CompanyUser, Decision,
    DecisionOutcome, Expense, ExpenseStatus, FlowStep, NewApprovalFlow, NewExpense, NewFlowStep,
    PendingApproval, RequestStatus, RuleType, UserRole,
};

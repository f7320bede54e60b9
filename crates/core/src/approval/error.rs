//! Approval error types.
//!
//! Every failure of the approval engine maps to one HTTP status class:
//! not found, validation, invalid state, forbidden, conflict or storage.

use thiserror::Error;

use spendflow_shared::AppError;
use spendflow_shared::types::{
    ApprovalFlowId, ApprovalRequestId, CompanyId, ExpenseId, UserId,
};

use crate::approval::types::{ExpenseStatus, RequestStatus};

/// Errors that can occur during approval operations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// The company has no active approval flow.
    #[error("No approval flow configured for company {0}")]
    NoActiveFlow(CompanyId),

    /// Approval flow not found.
    #[error("Approval flow {0} not found")]
    FlowNotFound(ApprovalFlowId),

    /// Approval request not found.
    #[error("Approval request {0} not found")]
    RequestNotFound(ApprovalRequestId),

    /// Expense not found.
    #[error("Expense {0} not found")]
    ExpenseNotFound(ExpenseId),

    /// User not found.
    #[error("User {0} not found")]
    UserNotFound(UserId),

    /// The flow configuration is malformed.
    #[error("Invalid approval flow: {0}")]
    InvalidFlow(String),

    /// A step resolved to nobody.
    #[error("No eligible approvers for step {step_order}")]
    NoEligibleApprovers {
        /// The step that could not be staffed.
        step_order: i32,
    },

    /// The expense input is malformed.
    #[error("Invalid expense: {0}")]
    InvalidExpense(String),

    /// The request was already decided.
    #[error("Approval request {request_id} is already {status}")]
    RequestAlreadyDecided {
        /// The request.
        request_id: ApprovalRequestId,
        /// Its terminal status.
        status: RequestStatus,
    },

    /// The expense no longer accepts decisions.
    #[error("Expense {expense_id} is already {status}")]
    ExpenseClosed {
        /// The expense.
        expense_id: ExpenseId,
        /// Its current status.
        status: ExpenseStatus,
    },

    /// The expense was already attached to a flow.
    #[error("Expense {0} has already entered an approval flow")]
    FlowAlreadyStarted(ExpenseId),

    /// The request belongs to a step that is not the active one.
    #[error("Approval request is for step {request_step} but the expense is at step {current_step}")]
    StaleStep {
        /// Step of the request.
        request_step: i32,
        /// Active step of the expense.
        current_step: i32,
    },

    /// The user may not decide this request.
    #[error("User {user_id} is not authorized to decide this approval request")]
    NotAuthorizedToDecide {
        /// The user who attempted the decision.
        user_id: UserId,
    },

    /// The user acts outside their company.
    #[error("User {user_id} does not belong to company {company_id}")]
    CrossTenant {
        /// The acting user.
        user_id: UserId,
        /// The company owning the resource.
        company_id: CompanyId,
    },

    /// A concurrent decision changed the expense first.
    #[error("Concurrent update: {0}")]
    Conflict(String),

    /// Storage failure.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl ApprovalError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NoActiveFlow(_)
            | Self::FlowNotFound(_)
            | Self::RequestNotFound(_)
            | Self::ExpenseNotFound(_)
            | Self::UserNotFound(_) => 404,

            Self::InvalidFlow(_)
            | Self::NoEligibleApprovers { .. }
            | Self::InvalidExpense(_)
            | Self::RequestAlreadyDecided { .. }
            | Self::ExpenseClosed { .. }
            | Self::FlowAlreadyStarted(_)
            | Self::StaleStep { .. } => 400,

            Self::NotAuthorizedToDecide { .. } | Self::CrossTenant { .. } => 403,

            Self::Conflict(_) => 409,

            Self::Storage(_) => 500,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NoActiveFlow(_) => "NO_ACTIVE_FLOW",
            Self::FlowNotFound(_) => "FLOW_NOT_FOUND",
            Self::RequestNotFound(_) => "REQUEST_NOT_FOUND",
            Self::ExpenseNotFound(_) => "EXPENSE_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::InvalidFlow(_) => "INVALID_FLOW",
            Self::NoEligibleApprovers { .. } => "NO_ELIGIBLE_APPROVERS",
            Self::InvalidExpense(_) => "INVALID_EXPENSE",
            Self::RequestAlreadyDecided { .. } => "REQUEST_ALREADY_DECIDED",
            Self::ExpenseClosed { .. } => "EXPENSE_CLOSED",
            Self::FlowAlreadyStarted(_) => "FLOW_ALREADY_STARTED",
            Self::StaleStep { .. } => "STALE_STEP",
            Self::NotAuthorizedToDecide { .. } => "NOT_AUTHORIZED_TO_DECIDE",
            Self::CrossTenant { .. } => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns true for state errors (deciding something that can no longer change).
    #[must_use]
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Self::RequestAlreadyDecided { .. }
                | Self::ExpenseClosed { .. }
                | Self::FlowAlreadyStarted(_)
                | Self::StaleStep { .. }
        )
    }
}

impl From<ApprovalError> for AppError {
    fn from(err: ApprovalError) -> Self {
        let message = err.to_string();
        match err.status_code() {
            404 => Self::NotFound(message),
            403 => Self::Forbidden(message),
            409 => Self::Conflict(message),
            400 if err.is_invalid_state() => Self::InvalidState(message),
            400 => Self::Validation(message),
            _ => Self::Database(message),
        }
    }
}

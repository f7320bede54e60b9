//! Storage seam for the approval engine.
//!
//! The service only talks to storage through [`ApprovalStore`]. Writes that
//! change an expense go through [`ApprovalStore::start_flow`] or
//! [`ApprovalStore::commit_decision`], each of which must be atomic and
//! guarded by the expense `version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use spendflow_shared::types::{
    ApprovalFlowId, ApprovalRequestId, CompanyId, ExpenseId, PageRequest, PageResponse, UserId,
};

use crate::approval::error::ApprovalError;
use crate::approval::types::{
    ApprovalFlow, ApprovalHistoryEntry, ApprovalRequest, CompanyUser, Expense, ExpenseStatus,
    PendingApproval, RequestStatus, UserRole,
};

/// Attaches a flow to a stored expense and creates its first requests.
#[derive(Debug, Clone)]
pub struct FlowStart {
    /// Expense entering the flow.
    pub expense_id: ExpenseId,
    /// Version the caller read.
    pub expected_version: i64,
    /// Flow the expense enters.
    pub flow_id: ApprovalFlowId,
    /// Step-1 requests.
    pub requests: Vec<ApprovalRequest>,
}

/// One decision (or override) and everything it changes.
#[derive(Debug, Clone)]
pub struct DecisionCommit {
    /// Expense the request belongs to.
    pub expense_id: ExpenseId,
    /// Version the caller read.
    pub expected_version: i64,
    /// Request being decided; must still be PENDING.
    pub request_id: ApprovalRequestId,
    /// New request status.
    pub request_status: RequestStatus,
    /// Approver comment.
    pub comment: Option<String>,
    /// Decision time.
    pub decided_at: DateTime<Utc>,
    /// Admin forcing the decision.
    pub overridden_by: Option<UserId>,
    /// Expense status after the decision.
    pub expense_status: ExpenseStatus,
    /// Expense step after the decision.
    pub current_step: i32,
    /// Requests for the next step, when the decision completed a step.
    pub new_requests: Vec<ApprovalRequest>,
}

/// Persistence operations used by [`crate::approval::ApprovalService`].
///
/// Lookups return `Ok(None)` for missing rows; the service turns that into
/// the right not-found error. Guard failures in the commit methods return
/// [`ApprovalError::Conflict`].
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Finds a user by ID.
    async fn find_user(&self, user_id: UserId) -> Result<Option<CompanyUser>, ApprovalError>;

    /// Lists the company's users holding `role`.
    async fn users_with_role(
        &self,
        company_id: CompanyId,
        role: UserRole,
    ) -> Result<Vec<CompanyUser>, ApprovalError>;

    /// Returns the company's active flow.
    async fn find_active_flow(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<ApprovalFlow>, ApprovalError>;

    /// Finds a flow by ID.
    async fn find_flow(&self, flow_id: ApprovalFlowId)
    -> Result<Option<ApprovalFlow>, ApprovalError>;

    /// Lists the company's flows, newest first.
    async fn list_flows(&self, company_id: CompanyId) -> Result<Vec<ApprovalFlow>, ApprovalError>;

    /// Stores a flow and makes it the company's only active flow.
    async fn insert_flow(&self, flow: &ApprovalFlow) -> Result<(), ApprovalError>;

    /// Stores a new expense together with its initial requests.
    async fn insert_expense(
        &self,
        expense: &Expense,
        requests: &[ApprovalRequest],
    ) -> Result<(), ApprovalError>;

    /// Finds an expense by ID.
    async fn find_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, ApprovalError>;

    /// Finds a request by ID.
    async fn find_request(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, ApprovalError>;

    /// Lists every request of an expense.
    async fn requests_for_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError>;

    /// Attaches a flow to an expense at step 1 and stores the requests.
    async fn start_flow(&self, start: FlowStart) -> Result<Expense, ApprovalError>;

    /// Applies a decision atomically and returns the updated expense.
    async fn commit_decision(&self, commit: DecisionCommit) -> Result<Expense, ApprovalError>;

    /// Pending requests of `approver_id` that can be acted on now, newest first.
    async fn pending_for_approver(
        &self,
        approver_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<PendingApproval>, ApprovalError>;

    /// Decided requests of an expense ordered by decision time.
    async fn decided_requests(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalHistoryEntry>, ApprovalError>;
}

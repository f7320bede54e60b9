//! In-memory [`ApprovalStore`].
//!
//! All state lives behind one lock, so every commit is atomic. Used by the
//! service and HTTP tests, and handy for local experiments without Postgres.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use spendflow_shared::types::{
    ApprovalFlowId, ApprovalRequestId, CompanyId, ExpenseId, PageRequest, PageResponse, UserId,
};

use crate::approval::authorization::can_act;
use crate::approval::error::ApprovalError;
use crate::approval::store::{ApprovalStore, DecisionCommit, FlowStart};
use crate::approval::types::{
    ApprovalFlow, ApprovalHistoryEntry, ApprovalRequest, CompanyUser, Expense, PendingApproval,
    UserRole,
};

#[derive(Default)]
struct State {
    users: HashMap<UserId, CompanyUser>,
    flows: HashMap<ApprovalFlowId, ApprovalFlow>,
    expenses: HashMap<ExpenseId, Expense>,
    requests: HashMap<ApprovalRequestId, ApprovalRequest>,
}

/// Approval store keeping everything in process memory.
#[derive(Default)]
pub struct InMemoryApprovalStore {
    state: RwLock<State>,
}

impl InMemoryApprovalStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user.
    pub async fn insert_user(&self, user: CompanyUser) {
        self.state.write().await.users.insert(user.id, user);
    }

    /// Registers a user with a generated ID and email, returning the ID.
    pub async fn add_user(&self, company_id: CompanyId, name: &str, role: UserRole) -> UserId {
        let id = UserId::new();
        self.insert_user(CompanyUser {
            id,
            company_id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            role,
        })
        .await;
        id
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<CompanyUser>, ApprovalError> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn users_with_role(
        &self,
        company_id: CompanyId,
        role: UserRole,
    ) -> Result<Vec<CompanyUser>, ApprovalError> {
        let state = self.state.read().await;
        let mut users: Vec<CompanyUser> = state
            .users
            .values()
            .filter(|u| u.company_id == company_id && u.role == role)
            .cloned()
            .collect();
        users.sort_by_key(|u| u.id);
        Ok(users)
    }

    async fn find_active_flow(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<ApprovalFlow>, ApprovalError> {
        let state = self.state.read().await;
        Ok(state
            .flows
            .values()
            .filter(|f| f.company_id == company_id && f.is_active)
            .max_by_key(|f| (f.created_at, f.id))
            .cloned())
    }

    async fn find_flow(
        &self,
        flow_id: ApprovalFlowId,
    ) -> Result<Option<ApprovalFlow>, ApprovalError> {
        Ok(self.state.read().await.flows.get(&flow_id).cloned())
    }

    async fn list_flows(&self, company_id: CompanyId) -> Result<Vec<ApprovalFlow>, ApprovalError> {
        let state = self.state.read().await;
        let mut flows: Vec<ApprovalFlow> = state
            .flows
            .values()
            .filter(|f| f.company_id == company_id)
            .cloned()
            .collect();
        flows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(flows)
    }

    async fn insert_flow(&self, flow: &ApprovalFlow) -> Result<(), ApprovalError> {
        let mut state = self.state.write().await;
        for existing in state.flows.values_mut() {
            if existing.company_id == flow.company_id {
                existing.is_active = false;
            }
        }
        state.flows.insert(flow.id, flow.clone());
        Ok(())
    }

    async fn insert_expense(
        &self,
        expense: &Expense,
        requests: &[ApprovalRequest],
    ) -> Result<(), ApprovalError> {
        let mut state = self.state.write().await;
        if state.expenses.contains_key(&expense.id) {
            return Err(ApprovalError::Conflict(format!(
                "expense {} already exists",
                expense.id
            )));
        }
        state.expenses.insert(expense.id, expense.clone());
        for request in requests {
            state.requests.insert(request.id, request.clone());
        }
        Ok(())
    }

    async fn find_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, ApprovalError> {
        Ok(self.state.read().await.expenses.get(&expense_id).cloned())
    }

    async fn find_request(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        Ok(self.state.read().await.requests.get(&request_id).cloned())
    }

    async fn requests_for_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let state = self.state.read().await;
        let mut requests: Vec<ApprovalRequest> = state
            .requests
            .values()
            .filter(|r| r.expense_id == expense_id)
            .cloned()
            .collect();
        requests.sort_by_key(|r| (r.step_order, r.id));
        Ok(requests)
    }

    async fn start_flow(&self, start: FlowStart) -> Result<Expense, ApprovalError> {
        let mut state = self.state.write().await;
        let expense = state
            .expenses
            .get_mut(&start.expense_id)
            .ok_or(ApprovalError::ExpenseNotFound(start.expense_id))?;

        if expense.version != start.expected_version || expense.flow_id.is_some() {
            return Err(ApprovalError::Conflict(format!(
                "expense {} changed while starting its flow",
                start.expense_id
            )));
        }

        expense.flow_id = Some(start.flow_id);
        expense.current_step = 1;
        expense.version += 1;
        expense.updated_at = Utc::now();
        let updated = expense.clone();

        for request in start.requests {
            state.requests.insert(request.id, request);
        }
        Ok(updated)
    }

    async fn commit_decision(&self, commit: DecisionCommit) -> Result<Expense, ApprovalError> {
        let mut state = self.state.write().await;

        // Check both guards before touching anything.
        let expense_version = state
            .expenses
            .get(&commit.expense_id)
            .map(|e| e.version)
            .ok_or(ApprovalError::ExpenseNotFound(commit.expense_id))?;
        if expense_version != commit.expected_version {
            return Err(ApprovalError::Conflict(format!(
                "expense {} was modified concurrently",
                commit.expense_id
            )));
        }
        let request = state
            .requests
            .get(&commit.request_id)
            .ok_or(ApprovalError::RequestNotFound(commit.request_id))?;
        if !request.is_pending() {
            return Err(ApprovalError::Conflict(format!(
                "approval request {} was decided concurrently",
                commit.request_id
            )));
        }

        if let Some(request) = state.requests.get_mut(&commit.request_id) {
            request.status = commit.request_status;
            request.comment = commit.comment;
            request.decided_at = Some(commit.decided_at);
            request.overridden_by = commit.overridden_by;
        }
        for request in commit.new_requests {
            state.requests.insert(request.id, request);
        }

        let expense = state
            .expenses
            .get_mut(&commit.expense_id)
            .ok_or(ApprovalError::ExpenseNotFound(commit.expense_id))?;
        expense.status = commit.expense_status;
        expense.current_step = commit.current_step;
        expense.version += 1;
        expense.updated_at = commit.decided_at;
        Ok(expense.clone())
    }

    async fn pending_for_approver(
        &self,
        approver_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<PendingApproval>, ApprovalError> {
        let state = self.state.read().await;
        let mut actionable: Vec<PendingApproval> = state
            .requests
            .values()
            .filter_map(|request| {
                let expense = state.expenses.get(&request.expense_id)?;
                can_act(approver_id, request, expense).then(|| PendingApproval {
                    request: request.clone(),
                    expense: expense.clone(),
                })
            })
            .collect();
        actionable.sort_by(|a, b| {
            (b.request.created_at, b.request.id).cmp(&(a.request.created_at, a.request.id))
        });

        let total = actionable.len() as u64;
        let data = actionable
            .into_iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(page.limit()).unwrap_or(usize::MAX))
            .collect();
        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }

    async fn decided_requests(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalHistoryEntry>, ApprovalError> {
        let state = self.state.read().await;
        let mut decided: Vec<&ApprovalRequest> = state
            .requests
            .values()
            .filter(|r| r.expense_id == expense_id && !r.is_pending())
            .collect();
        decided.sort_by_key(|r| (r.decided_at, r.id));

        Ok(decided
            .into_iter()
            .map(|request| {
                let approver = state.users.get(&request.approver_id);
                ApprovalHistoryEntry {
                    request: request.clone(),
                    approver_name: approver.map(|u| u.name.clone()).unwrap_or_default(),
                    approver_email: approver.map(|u| u.email.clone()).unwrap_or_default(),
                }
            })
            .collect())
    }
}

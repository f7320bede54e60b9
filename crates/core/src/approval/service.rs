//! Approval service.
//!
//! Orchestrates flow configuration, expense submission, decisions and
//! overrides on top of an injected [`ApprovalStore`].

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};

use spendflow_shared::types::{
    ApprovalRequestId, CompanyId, ExpenseId, PageRequest, PageResponse, UserId,
};

use crate::approval::authorization::{can_act, ensure_decidable};
use crate::approval::error::ApprovalError;
use crate::approval::evaluator::{DecisionEvaluator, StepTally, StepVerdict};
use crate::approval::flow::FlowValidator;
use crate::approval::generator::RequestGenerator;
use crate::approval::store::{ApprovalStore, DecisionCommit, FlowStart};
use crate::approval::types::{
    ApprovalFlow, ApprovalHistoryEntry, ApprovalRequest, ApproverRule, CompanyUser, Decision,
    DecisionOutcome, Expense, ExpenseStatus, NewApprovalFlow, NewExpense, PendingApproval,
};

/// Attempts per decision before a conflict is surfaced to the caller.
pub const MAX_DECISION_ATTEMPTS: u32 = 3;

const MAX_DESCRIPTION_LEN: usize = 1000;

/// Entry point for everything the approval engine does.
#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn ApprovalStore>,
}

impl ApprovalService {
    /// Creates a service over `store`.
    pub fn new(store: Arc<dyn ApprovalStore>) -> Self {
        Self { store }
    }

    /// Validates and stores a flow, making it the company's active flow.
    pub async fn create_flow(
        &self,
        company_id: CompanyId,
        input: NewApprovalFlow,
    ) -> Result<ApprovalFlow, ApprovalError> {
        FlowValidator::validate(&input)?;

        let named_users = input
            .steps
            .iter()
            .filter_map(|s| match s.approver {
                ApproverRule::User(user_id) => Some(user_id),
                ApproverRule::Role(_) => None,
            })
            .chain(input.specific_approver_id);
        for user_id in named_users {
            let member = self
                .store
                .find_user(user_id)
                .await?
                .is_some_and(|u| u.company_id == company_id);
            if !member {
                return Err(ApprovalError::InvalidFlow(format!(
                    "user {user_id} is not a member of the company"
                )));
            }
        }

        let flow = FlowValidator::build(company_id, input);
        self.store.insert_flow(&flow).await?;

        info!(
            company_id = %company_id,
            flow_id = %flow.id,
            rule_type = %flow.rule_type,
            steps = flow.steps.len(),
            "Approval flow activated"
        );
        Ok(flow)
    }

    /// Lists the company's flows, newest first.
    pub async fn list_flows(&self, company_id: CompanyId) -> Result<Vec<ApprovalFlow>, ApprovalError> {
        self.store.list_flows(company_id).await
    }

    /// Submits an expense into the company's active flow.
    ///
    /// The expense and its step-1 requests are stored together. Without an
    /// active flow nothing is stored and [`ApprovalError::NoActiveFlow`] is
    /// returned.
    pub async fn submit_expense(
        &self,
        company_id: CompanyId,
        submitted_by: UserId,
        input: NewExpense,
    ) -> Result<(Expense, Vec<ApprovalRequest>), ApprovalError> {
        let submitter = self.company_user(company_id, submitted_by).await?;
        let input = validate_expense(input)?;

        let flow = self
            .store
            .find_active_flow(company_id)
            .await?
            .ok_or(ApprovalError::NoActiveFlow(company_id))?;

        let now = Utc::now();
        let expense = Expense {
            id: ExpenseId::new(),
            company_id,
            submitted_by: submitter.id,
            description: input.description,
            amount: input.amount,
            currency: input.currency,
            status: ExpenseStatus::Pending,
            flow_id: Some(flow.id),
            current_step: 1,
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let requests = RequestGenerator::new(self.store.as_ref())
            .requests_for_step(&flow, expense.id, 1)
            .await?;

        self.store.insert_expense(&expense, &requests).await?;

        info!(
            expense_id = %expense.id,
            company_id = %company_id,
            flow_id = %flow.id,
            approvers = requests.len(),
            "Expense submitted"
        );
        Ok((expense, requests))
    }

    /// Returns an expense of the company.
    pub async fn get_expense(
        &self,
        company_id: CompanyId,
        expense_id: ExpenseId,
    ) -> Result<Expense, ApprovalError> {
        self.store
            .find_expense(expense_id)
            .await?
            .filter(|e| e.company_id == company_id)
            .ok_or(ApprovalError::ExpenseNotFound(expense_id))
    }

    /// Starts the company's active flow for a stored expense that has not
    /// entered one yet, creating the step-1 requests.
    pub async fn create_approval_requests(
        &self,
        expense_id: ExpenseId,
        company_id: CompanyId,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        retry_on_conflict(|| self.start_flow_once(expense_id, company_id)).await
    }

    async fn start_flow_once(
        &self,
        expense_id: ExpenseId,
        company_id: CompanyId,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let expense = self.get_expense(company_id, expense_id).await?;
        if expense.status.is_terminal() {
            return Err(ApprovalError::ExpenseClosed {
                expense_id,
                status: expense.status,
            });
        }
        if expense.flow_id.is_some() {
            return Err(ApprovalError::FlowAlreadyStarted(expense_id));
        }

        let flow = self
            .store
            .find_active_flow(company_id)
            .await?
            .ok_or(ApprovalError::NoActiveFlow(company_id))?;
        let requests = RequestGenerator::new(self.store.as_ref())
            .requests_for_step(&flow, expense_id, 1)
            .await?;

        self.store
            .start_flow(FlowStart {
                expense_id,
                expected_version: expense.version,
                flow_id: flow.id,
                requests: requests.clone(),
            })
            .await?;

        info!(
            expense_id = %expense_id,
            flow_id = %flow.id,
            approvers = requests.len(),
            "Approval flow started"
        );
        Ok(requests)
    }

    /// Returns true if `user_id` may decide the request now.
    pub async fn can_user_approve(
        &self,
        user_id: UserId,
        request_id: ApprovalRequestId,
    ) -> Result<bool, ApprovalError> {
        let (request, expense) = self.load_request(request_id).await?;
        Ok(can_act(user_id, &request, &expense))
    }

    /// Records an approver's decision and re-evaluates the expense.
    ///
    /// The caller is responsible for authorization; see [`Self::decide_as`].
    pub async fn process_approval_decision(
        &self,
        request_id: ApprovalRequestId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        retry_on_conflict(|| self.decide_once(request_id, decision, comment.as_deref(), None)).await
    }

    /// Authorizes `user_id` and records their decision.
    pub async fn decide_as(
        &self,
        user_id: UserId,
        request_id: ApprovalRequestId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        if !self.can_user_approve(user_id, request_id).await? {
            warn!(
                user_id = %user_id,
                request_id = %request_id,
                "Decision refused: user cannot act on this request"
            );
            return Err(ApprovalError::NotAuthorizedToDecide { user_id });
        }
        self.process_approval_decision(request_id, decision, comment)
            .await
    }

    /// Forces a terminal decision on a pending request and its expense,
    /// skipping rule evaluation.
    ///
    /// Other pending requests of the expense are left untouched; they can no
    /// longer be acted on once the expense is closed.
    pub async fn admin_override(
        &self,
        admin_id: UserId,
        request_id: ApprovalRequestId,
        decision: Decision,
        comment: Option<String>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        let (_, expense) = self.load_request(request_id).await?;
        self.company_user(expense.company_id, admin_id).await?;

        retry_on_conflict(|| {
            self.decide_once(request_id, decision, comment.as_deref(), Some(admin_id))
        })
        .await
    }

    /// Requests the user can act on now, newest first.
    pub async fn pending_for_user(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<PendingApproval>, ApprovalError> {
        self.store
            .pending_for_approver(user_id, page.normalized())
            .await
    }

    /// Decided requests of an expense in decision order.
    pub async fn approval_history(
        &self,
        company_id: CompanyId,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalHistoryEntry>, ApprovalError> {
        self.get_expense(company_id, expense_id).await?;
        self.store.decided_requests(expense_id).await
    }

    async fn decide_once(
        &self,
        request_id: ApprovalRequestId,
        decision: Decision,
        comment: Option<&str>,
        overridden_by: Option<UserId>,
    ) -> Result<DecisionOutcome, ApprovalError> {
        let (request, expense) = self.load_request(request_id).await?;
        ensure_decidable(&request, &expense)?;

        let step = expense.current_step;
        let (verdict, flow) = if overridden_by.is_some() {
            let verdict = match decision {
                Decision::Approved => StepVerdict::Approved,
                Decision::Rejected => StepVerdict::Rejected,
            };
            (verdict, None)
        } else {
            let flow = self.expense_flow(&expense).await?;
            let mut requests = self.store.requests_for_expense(expense.id).await?;
            if let Some(decided) = requests.iter_mut().find(|r| r.id == request_id) {
                decided.status = decision.request_status();
            }
            let tally = StepTally::from_requests(&requests, step, flow.specific_approver_id);
            (DecisionEvaluator::evaluate(&flow, &tally), Some(flow))
        };

        let mut new_requests = Vec::new();
        let mut advanced_to_step = None;
        let (expense_status, current_step, message) = match (verdict, &flow) {
            (StepVerdict::Rejected, _) if overridden_by.is_some() => (
                ExpenseStatus::Rejected,
                step,
                "Expense rejected by admin override".to_string(),
            ),
            (StepVerdict::Approved, _) if overridden_by.is_some() => (
                ExpenseStatus::Approved,
                step,
                "Expense approved by admin override".to_string(),
            ),
            (StepVerdict::Rejected, _) => (
                ExpenseStatus::Rejected,
                step,
                format!("Expense rejected at step {step}"),
            ),
            (StepVerdict::Approved, Some(flow)) if flow.has_step(step + 1) => {
                let next = step + 1;
                new_requests = RequestGenerator::new(self.store.as_ref())
                    .requests_for_step(flow, expense.id, next)
                    .await?;
                advanced_to_step = Some(next);
                (
                    ExpenseStatus::Pending,
                    next,
                    format!("Step {step} approved; expense moved to step {next}"),
                )
            }
            (StepVerdict::Approved, _) => (
                ExpenseStatus::Approved,
                step,
                "Expense approved".to_string(),
            ),
            (StepVerdict::Pending, _) => (
                ExpenseStatus::Pending,
                step,
                format!(
                    "Decision recorded; expense is awaiting further approvals at step {step}"
                ),
            ),
        };

        self.store
            .commit_decision(DecisionCommit {
                expense_id: expense.id,
                expected_version: expense.version,
                request_id,
                request_status: decision.request_status(),
                comment: comment.map(str::to_string),
                decided_at: Utc::now(),
                overridden_by,
                expense_status,
                current_step,
                new_requests,
            })
            .await?;

        info!(
            expense_id = %expense.id,
            request_id = %request_id,
            approver_id = %request.approver_id,
            decision = decision.verb(),
            overridden_by = ?overridden_by,
            expense_status = %expense_status,
            current_step,
            "Approval decision committed"
        );

        Ok(DecisionOutcome {
            expense_status,
            message,
            advanced_to_step,
        })
    }

    async fn load_request(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<(ApprovalRequest, Expense), ApprovalError> {
        let request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or(ApprovalError::RequestNotFound(request_id))?;
        let expense = self
            .store
            .find_expense(request.expense_id)
            .await?
            .ok_or(ApprovalError::ExpenseNotFound(request.expense_id))?;
        Ok((request, expense))
    }

    async fn expense_flow(&self, expense: &Expense) -> Result<ApprovalFlow, ApprovalError> {
        let flow_id = expense.flow_id.ok_or_else(|| {
            ApprovalError::Storage(format!("expense {} has requests but no flow", expense.id))
        })?;
        self.store
            .find_flow(flow_id)
            .await?
            .ok_or(ApprovalError::FlowNotFound(flow_id))
    }

    async fn company_user(
        &self,
        company_id: CompanyId,
        user_id: UserId,
    ) -> Result<CompanyUser, ApprovalError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or(ApprovalError::UserNotFound(user_id))?;
        if user.company_id != company_id {
            return Err(ApprovalError::CrossTenant {
                user_id,
                company_id,
            });
        }
        Ok(user)
    }
}

/// Runs `op` again while it fails with [`ApprovalError::Conflict`], up to
/// [`MAX_DECISION_ATTEMPTS`] attempts in total.
async fn retry_on_conflict<T, F, Fut>(mut op: F) -> Result<T, ApprovalError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApprovalError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(ApprovalError::Conflict(reason)) if attempt < MAX_DECISION_ATTEMPTS => {
                warn!(attempt, %reason, "Concurrent update detected, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn validate_expense(input: NewExpense) -> Result<NewExpense, ApprovalError> {
    let description = input.description.trim().to_string();
    if description.is_empty() {
        return Err(ApprovalError::InvalidExpense(
            "description is required".to_string(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ApprovalError::InvalidExpense(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    if input.amount <= Decimal::ZERO {
        return Err(ApprovalError::InvalidExpense(
            "amount must be positive".to_string(),
        ));
    }

    let currency = input.currency.trim().to_ascii_uppercase();
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ApprovalError::InvalidExpense(format!(
            "currency must be a 3-letter ISO code, got {:?}",
            input.currency
        )));
    }

    Ok(NewExpense {
        description,
        amount: input.amount,
        currency,
    })
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;

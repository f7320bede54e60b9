//! Approval request generation.
//!
//! Resolves the approvers of a flow step through the store and builds one
//! pending request per approver.

use tracing::warn;

use spendflow_shared::types::{ExpenseId, UserId};

use crate::approval::error::ApprovalError;
use crate::approval::store::ApprovalStore;
use crate::approval::types::{ApprovalFlow, ApprovalRequest, ApproverRule};

/// Builds pending requests for flow steps.
pub struct RequestGenerator<'a> {
    store: &'a dyn ApprovalStore,
}

impl<'a> RequestGenerator<'a> {
    /// Creates a generator reading users from `store`.
    pub fn new(store: &'a dyn ApprovalStore) -> Self {
        Self { store }
    }

    /// Returns the eligible approvers of `step_order`, deduplicated in
    /// resolution order.
    ///
    /// `Role` rules expand to every company user with the role. `User` rules
    /// name one user, who must belong to the flow's company. SPECIFIC and
    /// HYBRID flows add their specific approver to every step.
    pub async fn resolve_step(
        &self,
        flow: &ApprovalFlow,
        step_order: i32,
    ) -> Result<Vec<UserId>, ApprovalError> {
        let step = flow.step(step_order).ok_or_else(|| {
            ApprovalError::InvalidFlow(format!("flow {} has no step {step_order}", flow.id))
        })?;

        let mut approvers: Vec<UserId> = Vec::new();
        match step.approver {
            ApproverRule::Role(role) => {
                for user in self.store.users_with_role(flow.company_id, role).await? {
                    push_unique(&mut approvers, user.id);
                }
            }
            ApproverRule::User(user_id) => {
                if self.is_company_member(flow, user_id).await? {
                    push_unique(&mut approvers, user_id);
                } else {
                    warn!(
                        flow_id = %flow.id,
                        step_order,
                        user_id = %user_id,
                        "Step approver is not a member of the company"
                    );
                }
            }
        }

        if flow.rule_type.needs_specific_approver()
            && let Some(specific) = flow.specific_approver_id
            && self.is_company_member(flow, specific).await?
        {
            push_unique(&mut approvers, specific);
        }

        Ok(approvers)
    }

    /// Builds one pending request per eligible approver of `step_order`.
    ///
    /// An empty approver set is an error; an expense must never sit at a step
    /// nobody can act on.
    pub async fn requests_for_step(
        &self,
        flow: &ApprovalFlow,
        expense_id: ExpenseId,
        step_order: i32,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let approvers = self.resolve_step(flow, step_order).await?;
        if approvers.is_empty() {
            return Err(ApprovalError::NoEligibleApprovers { step_order });
        }

        Ok(approvers
            .into_iter()
            .map(|approver_id| ApprovalRequest::pending(expense_id, approver_id, step_order))
            .collect())
    }

    async fn is_company_member(
        &self,
        flow: &ApprovalFlow,
        user_id: UserId,
    ) -> Result<bool, ApprovalError> {
        Ok(self
            .store
            .find_user(user_id)
            .await?
            .is_some_and(|user| user.company_id == flow.company_id))
    }
}

fn push_unique(approvers: &mut Vec<UserId>, user_id: UserId) {
    if !approvers.contains(&user_id) {
        approvers.push(user_id);
    }
}

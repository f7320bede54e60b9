//! Postgres-backed [`ApprovalStore`].
//!
//! Each write runs in one transaction. Decision
//! commits are guarded twice: the request update only matches a PENDING row
//! and the expense update only matches the expected `version`. A guard that
//! matches nothing rolls the transaction back and reports a conflict.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::debug;
use uuid::Uuid;

use spendflow_core::approval::{
    ApprovalError, ApprovalFlow, ApprovalHistoryEntry, ApprovalRequest, ApprovalStore,
    ApproverRule, CompanyUser, DecisionCommit, Expense, ExpenseStatus, FlowStart, FlowStep,
    PendingApproval, RequestStatus, RuleType, UserRole,
};
use spendflow_shared::types::{
    ApprovalFlowId, ApprovalRequestId, CompanyId, ExpenseId, PageRequest, PageResponse, UserId,
};

use crate::entities::{
    approval_flow_steps, approval_flows, approval_requests, expenses,
    sea_orm_active_enums::{self as db_enums, ApprovalRuleType, ApprovalStatus},
    users,
};

/// Approval store over a `SeaORM` connection pool.
#[derive(Debug, Clone)]
pub struct SeaOrmApprovalStore {
    db: DatabaseConnection,
}

impl SeaOrmApprovalStore {
    /// Creates a new approval store.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn hydrate_flows(
        &self,
        flows: Vec<approval_flows::Model>,
    ) -> Result<Vec<ApprovalFlow>, ApprovalError> {
        if flows.is_empty() {
            return Ok(Vec::new());
        }

        let flow_ids: Vec<Uuid> = flows.iter().map(|f| f.id).collect();
        let steps = approval_flow_steps::Entity::find()
            .filter(approval_flow_steps::Column::FlowId.is_in(flow_ids))
            .order_by_asc(approval_flow_steps::Column::StepOrder)
            .all(&self.db)
            .await
            .map_err(storage)?;

        let mut by_flow: HashMap<Uuid, Vec<approval_flow_steps::Model>> = HashMap::new();
        for step in steps {
            by_flow.entry(step.flow_id).or_default().push(step);
        }

        flows
            .into_iter()
            .map(|flow| {
                let steps = by_flow.remove(&flow.id).unwrap_or_default();
                flow_to_core(flow, steps)
            })
            .collect()
    }

    async fn expense_model(&self, expense_id: ExpenseId) -> Result<expenses::Model, ApprovalError> {
        expenses::Entity::find_by_id(expense_id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?
            .ok_or(ApprovalError::ExpenseNotFound(expense_id))
    }
}

#[async_trait]
impl ApprovalStore for SeaOrmApprovalStore {
    async fn find_user(&self, user_id: UserId) -> Result<Option<CompanyUser>, ApprovalError> {
        let user = users::Entity::find_by_id(user_id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?;
        Ok(user.map(user_to_core))
    }

    async fn users_with_role(
        &self,
        company_id: CompanyId,
        role: UserRole,
    ) -> Result<Vec<CompanyUser>, ApprovalError> {
        let users = users::Entity::find()
            .filter(users::Column::CompanyId.eq(company_id.into_inner()))
            .filter(users::Column::Role.eq(role_to_db(role)))
            .order_by_asc(users::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;
        Ok(users.into_iter().map(user_to_core).collect())
    }

    async fn find_active_flow(
        &self,
        company_id: CompanyId,
    ) -> Result<Option<ApprovalFlow>, ApprovalError> {
        let flow = approval_flows::Entity::find()
            .filter(approval_flows::Column::CompanyId.eq(company_id.into_inner()))
            .filter(approval_flows::Column::IsActive.eq(true))
            .order_by_desc(approval_flows::Column::CreatedAt)
            .one(&self.db)
            .await
            .map_err(storage)?;

        match flow {
            Some(flow) => Ok(self.hydrate_flows(vec![flow]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn find_flow(
        &self,
        flow_id: ApprovalFlowId,
    ) -> Result<Option<ApprovalFlow>, ApprovalError> {
        let flow = approval_flows::Entity::find_by_id(flow_id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?;

        match flow {
            Some(flow) => Ok(self.hydrate_flows(vec![flow]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list_flows(&self, company_id: CompanyId) -> Result<Vec<ApprovalFlow>, ApprovalError> {
        let flows = approval_flows::Entity::find()
            .filter(approval_flows::Column::CompanyId.eq(company_id.into_inner()))
            .order_by_desc(approval_flows::Column::CreatedAt)
            .order_by_desc(approval_flows::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;
        self.hydrate_flows(flows).await
    }

    async fn insert_flow(&self, flow: &ApprovalFlow) -> Result<(), ApprovalError> {
        let company_id = flow.company_id.into_inner();
        let txn = self.db.begin().await.map_err(storage)?;

        // Deactivate first; the partial unique index allows one active flow.
        approval_flows::Entity::update_many()
            .col_expr(approval_flows::Column::IsActive, Expr::value(false))
            .filter(approval_flows::Column::CompanyId.eq(company_id))
            .filter(approval_flows::Column::IsActive.eq(true))
            .exec(&txn)
            .await
            .map_err(storage)?;

        approval_flows::ActiveModel {
            id: Set(flow.id.into_inner()),
            company_id: Set(company_id),
            name: Set(flow.name.clone()),
            rule_type: Set(rule_type_to_db(flow.rule_type)),
            percentage_threshold: Set(flow.percentage_threshold),
            specific_approver_id: Set(flow.specific_approver_id.map(UserId::into_inner)),
            is_active: Set(flow.is_active),
            created_at: Set(flow.created_at.into()),
        }
        .insert(&txn)
        .await
        .map_err(storage)?;

        for step in &flow.steps {
            let (approver_role, approver_user_id) = match step.approver {
                ApproverRule::Role(role) => (Some(role_to_db(role)), None),
                ApproverRule::User(user_id) => (None, Some(user_id.into_inner())),
            };
            approval_flow_steps::ActiveModel {
                id: Set(step.id.into_inner()),
                flow_id: Set(flow.id.into_inner()),
                step_order: Set(step.step_order),
                approver_role: Set(approver_role),
                approver_user_id: Set(approver_user_id),
            }
            .insert(&txn)
            .await
            .map_err(storage)?;
        }

        txn.commit().await.map_err(storage)
    }

    async fn insert_expense(
        &self,
        expense: &Expense,
        requests: &[ApprovalRequest],
    ) -> Result<(), ApprovalError> {
        let txn = self.db.begin().await.map_err(storage)?;

        expenses::ActiveModel {
            id: Set(expense.id.into_inner()),
            company_id: Set(expense.company_id.into_inner()),
            submitted_by: Set(expense.submitted_by.into_inner()),
            description: Set(expense.description.clone()),
            amount: Set(expense.amount),
            currency: Set(expense.currency.clone()),
            status: Set(expense_status_to_db(expense.status)),
            flow_id: Set(expense.flow_id.map(ApprovalFlowId::into_inner)),
            current_step: Set(expense.current_step),
            version: Set(expense.version),
            created_at: Set(expense.created_at.into()),
            updated_at: Set(expense.updated_at.into()),
        }
        .insert(&txn)
        .await
        .map_err(storage)?;

        insert_requests(&txn, requests).await?;
        txn.commit().await.map_err(storage)
    }

    async fn find_expense(&self, expense_id: ExpenseId) -> Result<Option<Expense>, ApprovalError> {
        let expense = expenses::Entity::find_by_id(expense_id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?;
        Ok(expense.map(expense_to_core))
    }

    async fn find_request(
        &self,
        request_id: ApprovalRequestId,
    ) -> Result<Option<ApprovalRequest>, ApprovalError> {
        let request = approval_requests::Entity::find_by_id(request_id.into_inner())
            .one(&self.db)
            .await
            .map_err(storage)?;
        Ok(request.map(request_to_core))
    }

    async fn requests_for_expense(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalRequest>, ApprovalError> {
        let requests = approval_requests::Entity::find()
            .filter(approval_requests::Column::ExpenseId.eq(expense_id.into_inner()))
            .order_by_asc(approval_requests::Column::StepOrder)
            .order_by_asc(approval_requests::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;
        Ok(requests.into_iter().map(request_to_core).collect())
    }

    async fn start_flow(&self, start: FlowStart) -> Result<Expense, ApprovalError> {
        let expense = self.expense_model(start.expense_id).await?;
        let txn = self.db.begin().await.map_err(storage)?;

        let result = expenses::Entity::update_many()
            .col_expr(
                expenses::Column::FlowId,
                Expr::value(Some(start.flow_id.into_inner())),
            )
            .col_expr(expenses::Column::CurrentStep, Expr::value(1))
            .col_expr(
                expenses::Column::Version,
                Expr::col(expenses::Column::Version).add(1),
            )
            .col_expr(expenses::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(expenses::Column::Id.eq(expense.id))
            .filter(expenses::Column::Version.eq(start.expected_version))
            .filter(expenses::Column::FlowId.is_null())
            .exec(&txn)
            .await
            .map_err(storage)?;

        if result.rows_affected == 0 {
            txn.rollback().await.map_err(storage)?;
            return Err(ApprovalError::Conflict(format!(
                "expense {} changed while starting its flow",
                start.expense_id
            )));
        }

        insert_requests(&txn, &start.requests).await?;
        let updated = reload_expense(&txn, start.expense_id).await?;
        txn.commit().await.map_err(storage)?;
        Ok(updated)
    }

    async fn commit_decision(&self, commit: DecisionCommit) -> Result<Expense, ApprovalError> {
        let expense = self.expense_model(commit.expense_id).await?;
        let txn = self.db.begin().await.map_err(storage)?;

        let decided = approval_requests::Entity::update_many()
            .set(approval_requests::ActiveModel {
                status: Set(request_status_to_db(commit.request_status)),
                comment: Set(commit.comment.clone()),
                decided_at: Set(Some(commit.decided_at.into())),
                overridden_by: Set(commit.overridden_by.map(UserId::into_inner)),
                ..Default::default()
            })
            .filter(approval_requests::Column::Id.eq(commit.request_id.into_inner()))
            .filter(approval_requests::Column::ExpenseId.eq(expense.id))
            .filter(approval_requests::Column::Status.eq(ApprovalStatus::Pending))
            .exec(&txn)
            .await
            .map_err(storage)?;

        if decided.rows_affected == 0 {
            txn.rollback().await.map_err(storage)?;
            return Err(ApprovalError::Conflict(format!(
                "approval request {} was decided concurrently",
                commit.request_id
            )));
        }

        let bumped = expenses::Entity::update_many()
            .set(expenses::ActiveModel {
                status: Set(expense_status_to_db(commit.expense_status)),
                current_step: Set(commit.current_step),
                updated_at: Set(commit.decided_at.into()),
                ..Default::default()
            })
            .col_expr(
                expenses::Column::Version,
                Expr::col(expenses::Column::Version).add(1),
            )
            .filter(expenses::Column::Id.eq(expense.id))
            .filter(expenses::Column::Version.eq(commit.expected_version))
            .exec(&txn)
            .await
            .map_err(storage)?;

        if bumped.rows_affected == 0 {
            txn.rollback().await.map_err(storage)?;
            return Err(ApprovalError::Conflict(format!(
                "expense {} was modified concurrently",
                commit.expense_id
            )));
        }

        insert_requests(&txn, &commit.new_requests).await?;
        let updated = reload_expense(&txn, commit.expense_id).await?;
        txn.commit().await.map_err(storage)?;

        debug!(
            expense_id = %commit.expense_id,
            request_id = %commit.request_id,
            version = updated.version,
            new_requests = commit.new_requests.len(),
            "Decision committed"
        );
        Ok(updated)
    }

    async fn pending_for_approver(
        &self,
        approver_id: UserId,
        page: PageRequest,
    ) -> Result<PageResponse<PendingApproval>, ApprovalError> {
        let paginator = approval_requests::Entity::find()
            .find_also_related(expenses::Entity)
            .filter(approval_requests::Column::ApproverId.eq(approver_id.into_inner()))
            .filter(approval_requests::Column::Status.eq(ApprovalStatus::Pending))
            .filter(expenses::Column::Status.eq(ApprovalStatus::Pending))
            .filter(
                Expr::col((approval_requests::Entity, approval_requests::Column::StepOrder))
                    .equals((expenses::Entity, expenses::Column::CurrentStep)),
            )
            .order_by_desc(approval_requests::Column::CreatedAt)
            .order_by_desc(approval_requests::Column::Id)
            .paginate(&self.db, page.limit());

        let total = paginator.num_items().await.map_err(storage)?;
        let rows = paginator
            .fetch_page(u64::from(page.page.saturating_sub(1)))
            .await
            .map_err(storage)?;

        let data = rows
            .into_iter()
            .filter_map(|(request, expense)| {
                expense.map(|expense| PendingApproval {
                    request: request_to_core(request),
                    expense: expense_to_core(expense),
                })
            })
            .collect();
        Ok(PageResponse::new(data, page.page, page.per_page, total))
    }

    async fn decided_requests(
        &self,
        expense_id: ExpenseId,
    ) -> Result<Vec<ApprovalHistoryEntry>, ApprovalError> {
        let rows = approval_requests::Entity::find()
            .find_also_related(users::Entity)
            .filter(approval_requests::Column::ExpenseId.eq(expense_id.into_inner()))
            .filter(approval_requests::Column::Status.ne(ApprovalStatus::Pending))
            .order_by_asc(approval_requests::Column::DecidedAt)
            .order_by_asc(approval_requests::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|(request, approver)| {
                let (approver_name, approver_email) = approver
                    .map(|u| (u.name, u.email))
                    .unwrap_or_default();
                ApprovalHistoryEntry {
                    request: request_to_core(request),
                    approver_name,
                    approver_email,
                }
            })
            .collect())
    }
}

async fn insert_requests(
    txn: &DatabaseTransaction,
    requests: &[ApprovalRequest],
) -> Result<(), ApprovalError> {
    if requests.is_empty() {
        return Ok(());
    }

    let models = requests.iter().map(|r| approval_requests::ActiveModel {
        id: Set(r.id.into_inner()),
        expense_id: Set(r.expense_id.into_inner()),
        approver_id: Set(r.approver_id.into_inner()),
        step_order: Set(r.step_order),
        status: Set(request_status_to_db(r.status)),
        comment: Set(r.comment.clone()),
        decided_at: Set(r.decided_at.map(Into::into)),
        overridden_by: Set(r.overridden_by.map(UserId::into_inner)),
        created_at: Set(r.created_at.into()),
    });

    approval_requests::Entity::insert_many(models)
        .exec(txn)
        .await
        .map_err(storage)?;
    Ok(())
}

async fn reload_expense(
    txn: &DatabaseTransaction,
    expense_id: ExpenseId,
) -> Result<Expense, ApprovalError> {
    expenses::Entity::find_by_id(expense_id.into_inner())
        .one(txn)
        .await
        .map_err(storage)?
        .map(expense_to_core)
        .ok_or(ApprovalError::ExpenseNotFound(expense_id))
}

#[allow(clippy::needless_pass_by_value)]
fn storage(err: DbErr) -> ApprovalError {
    ApprovalError::Storage(err.to_string())
}

// ============================================================================
// Conversions between database models and core types
// ============================================================================

fn user_to_core(user: users::Model) -> CompanyUser {
    CompanyUser {
        id: UserId::from_uuid(user.id),
        company_id: CompanyId::from_uuid(user.company_id),
        name: user.name,
        email: user.email,
        role: role_to_core(user.role),
    }
}

fn flow_to_core(
    flow: approval_flows::Model,
    steps: Vec<approval_flow_steps::Model>,
) -> Result<ApprovalFlow, ApprovalError> {
    let steps = steps
        .into_iter()
        .map(|step| {
            let approver = match (step.approver_role, step.approver_user_id) {
                (Some(role), None) => ApproverRule::Role(role_to_core(role)),
                (None, Some(user_id)) => ApproverRule::User(UserId::from_uuid(user_id)),
                _ => {
                    return Err(ApprovalError::Storage(format!(
                        "flow step {} must name exactly one of role or user",
                        step.id
                    )));
                }
            };
            Ok(FlowStep {
                id: step.id.into(),
                step_order: step.step_order,
                approver,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ApprovalFlow {
        id: ApprovalFlowId::from_uuid(flow.id),
        company_id: CompanyId::from_uuid(flow.company_id),
        name: flow.name,
        rule_type: rule_type_to_core(flow.rule_type),
        percentage_threshold: flow.percentage_threshold,
        specific_approver_id: flow.specific_approver_id.map(UserId::from_uuid),
        is_active: flow.is_active,
        steps,
        created_at: flow.created_at.with_timezone(&Utc),
    })
}

fn expense_to_core(expense: expenses::Model) -> Expense {
    Expense {
        id: ExpenseId::from_uuid(expense.id),
        company_id: CompanyId::from_uuid(expense.company_id),
        submitted_by: UserId::from_uuid(expense.submitted_by),
        description: expense.description,
        amount: expense.amount,
        currency: expense.currency,
        status: expense_status_to_core(expense.status),
        flow_id: expense.flow_id.map(ApprovalFlowId::from_uuid),
        current_step: expense.current_step,
        version: expense.version,
        created_at: expense.created_at.with_timezone(&Utc),
        updated_at: expense.updated_at.with_timezone(&Utc),
    }
}

fn request_to_core(request: approval_requests::Model) -> ApprovalRequest {
    ApprovalRequest {
        id: ApprovalRequestId::from_uuid(request.id),
        expense_id: ExpenseId::from_uuid(request.expense_id),
        approver_id: UserId::from_uuid(request.approver_id),
        step_order: request.step_order,
        status: request_status_to_core(request.status),
        comment: request.comment,
        decided_at: request.decided_at.map(|t| t.with_timezone(&Utc)),
        overridden_by: request.overridden_by.map(UserId::from_uuid),
        created_at: request.created_at.with_timezone(&Utc),
    }
}

fn role_to_core(role: db_enums::UserRole) -> UserRole {
    match role {
        db_enums::UserRole::Employee => UserRole::Employee,
        db_enums::UserRole::Manager => UserRole::Manager,
        db_enums::UserRole::Admin => UserRole::Admin,
    }
}

fn role_to_db(role: UserRole) -> db_enums::UserRole {
    match role {
        UserRole::Employee => db_enums::UserRole::Employee,
        UserRole::Manager => db_enums::UserRole::Manager,
        UserRole::Admin => db_enums::UserRole::Admin,
    }
}

fn rule_type_to_core(rule_type: ApprovalRuleType) -> RuleType {
    match rule_type {
        ApprovalRuleType::Unanimous => RuleType::Unanimous,
        ApprovalRuleType::Percentage => RuleType::Percentage,
        ApprovalRuleType::Specific => RuleType::Specific,
        ApprovalRuleType::Hybrid => RuleType::Hybrid,
    }
}

fn rule_type_to_db(rule_type: RuleType) -> ApprovalRuleType {
    match rule_type {
        RuleType::Unanimous => ApprovalRuleType::Unanimous,
        RuleType::Percentage => ApprovalRuleType::Percentage,
        RuleType::Specific => ApprovalRuleType::Specific,
        RuleType::Hybrid => ApprovalRuleType::Hybrid,
    }
}

fn request_status_to_core(status: ApprovalStatus) -> RequestStatus {
    match status {
        ApprovalStatus::Pending => RequestStatus::Pending,
        ApprovalStatus::Approved => RequestStatus::Approved,
        ApprovalStatus::Rejected => RequestStatus::Rejected,
    }
}

fn request_status_to_db(status: RequestStatus) -> ApprovalStatus {
    match status {
        RequestStatus::Pending => ApprovalStatus::Pending,
        RequestStatus::Approved => ApprovalStatus::Approved,
        RequestStatus::Rejected => ApprovalStatus::Rejected,
    }
}

fn expense_status_to_core(status: ApprovalStatus) -> ExpenseStatus {
    match status {
        ApprovalStatus::Pending => ExpenseStatus::Pending,
        ApprovalStatus::Approved => ExpenseStatus::Approved,
        ApprovalStatus::Rejected => ExpenseStatus::Rejected,
    }
}

fn expense_status_to_db(status: ExpenseStatus) -> ApprovalStatus {
    match status {
        ExpenseStatus::Pending => ApprovalStatus::Pending,
        ExpenseStatus::Approved => ApprovalStatus::Approved,
        ExpenseStatus::Rejected => ApprovalStatus::Rejected,
    }
}

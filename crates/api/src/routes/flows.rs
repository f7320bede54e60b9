//! Approval flow routes: configuration, pending queue, decisions, overrides
//! and history.
//!
//! `{request_id}` in the decision routes is an approval request id.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::expenses::{ApprovalRequestResponse, ExpenseResponse};
use crate::{AppState, error::ApiError, middleware::AuthUser};
use spendflow_core::approval::{
    ApprovalFlow, ApprovalHistoryEntry, ApproverRule, Decision, DecisionOutcome, NewApprovalFlow,
    NewFlowStep, PendingApproval, RuleType, UserRole,
};
use spendflow_shared::types::{ApprovalRequestId, ExpenseId, PageMeta, PageRequest, UserId};

/// Creates the approval flow routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/flows", get(list_flows).post(create_flow))
        .route("/flows/pending", get(list_pending))
        .route("/flows/history/{expense_id}", get(approval_history))
        .route("/flows/{request_id}/approve", post(approve_request))
        .route("/flows/{request_id}/reject", post(reject_request))
        .route("/flows/{request_id}/override", post(override_request))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// A step in a flow creation request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStepInput {
    /// 1-based position; defaults to the position in the list.
    pub step_order: Option<i32>,
    /// Every company user with this role may act.
    pub approver_role: Option<String>,
    /// Exactly this user may act.
    pub approver_user_id: Option<Uuid>,
}

/// Request body for creating an approval flow.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowRequest {
    /// Flow name.
    pub name: String,
    /// UNANIMOUS, PERCENTAGE, SPECIFIC or HYBRID.
    pub rule_type: String,
    /// Ordered steps.
    pub steps: Vec<FlowStepInput>,
    /// Percent in (0, 100] for PERCENTAGE and HYBRID.
    pub percentage_threshold: Option<Decimal>,
    /// Deciding approver for SPECIFIC and HYBRID.
    pub specific_approver_id: Option<Uuid>,
}

/// A flow step as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowStepResponse {
    /// Step ID.
    pub id: Uuid,
    /// 1-based position.
    pub step_order: i32,
    /// Role rule, if any.
    pub approver_role: Option<&'static str>,
    /// User rule, if any.
    pub approver_user_id: Option<Uuid>,
}

/// An approval flow as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowResponse {
    /// Flow ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Flow name.
    pub name: String,
    /// Aggregation rule.
    pub rule_type: &'static str,
    /// Threshold percent.
    pub percentage_threshold: Option<Decimal>,
    /// Deciding approver.
    pub specific_approver_id: Option<Uuid>,
    /// Whether new expenses use this flow.
    pub is_active: bool,
    /// Steps in order.
    pub steps: Vec<FlowStepResponse>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Request body for approve and reject.
#[derive(Debug, Default, Deserialize)]
pub struct DecisionRequest {
    /// Optional comment.
    pub comment: Option<String>,
}

/// Request body for an admin override.
#[derive(Debug, Deserialize)]
pub struct OverrideRequest {
    /// APPROVED or REJECTED.
    pub action: String,
    /// Optional comment.
    pub comment: Option<String>,
}

/// Response for a decision or override.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    /// Human-readable summary.
    pub message: String,
    /// Expense status after the decision.
    pub expense_status: &'static str,
}

/// A pending approval as returned by the API.
#[derive(Debug, Serialize)]
pub struct PendingApprovalResponse {
    /// The request awaiting the caller.
    #[serde(flatten)]
    pub request: ApprovalRequestResponse,
    /// The expense under review.
    pub expense: ExpenseResponse,
}

/// Pagination block of list responses.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResponse {
    /// Current page.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total matching items.
    pub total: u64,
    /// Total pages.
    pub total_pages: u32,
}

impl From<PageMeta> for PaginationResponse {
    fn from(meta: PageMeta) -> Self {
        Self {
            page: meta.page,
            per_page: meta.per_page,
            total: meta.total,
            total_pages: meta.total_pages,
        }
    }
}

/// Response for the pending queue.
#[derive(Debug, Serialize)]
pub struct PendingResponse {
    /// Actionable requests, newest first.
    pub approvals: Vec<PendingApprovalResponse>,
    /// Paging metadata.
    pub pagination: PaginationResponse,
}

/// One decided request in an expense's history.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryResponse {
    /// Request ID.
    pub id: Uuid,
    /// Approver.
    pub approver_id: Uuid,
    /// Approver display name.
    pub approver_name: String,
    /// Approver email.
    pub approver_email: String,
    /// Step of the request.
    pub step_order: i32,
    /// APPROVED or REJECTED.
    pub status: &'static str,
    /// Approver's comment.
    pub comment: Option<String>,
    /// Decision time.
    pub decided_at: Option<DateTime<Utc>>,
    /// Admin who forced the decision.
    pub overridden_by: Option<Uuid>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/flows` - Create and activate an approval flow (admin only).
async fn create_flow(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<FlowResponse>), ApiError> {
    auth.require_admin()?;
    let input = parse_flow_request(payload)?;

    let flow = state
        .approvals
        .create_flow(auth.company_id(), input)
        .await?;

    info!(
        flow_id = %flow.id,
        admin_id = %auth.user_id(),
        "Approval flow created via API"
    );
    Ok((StatusCode::CREATED, Json(flow_to_response(flow))))
}

/// GET `/flows` - List the company's flows, newest first.
async fn list_flows(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<serde_json::Value>, ApiError> {
    let flows = state.approvals.list_flows(auth.company_id()).await?;
    let items: Vec<FlowResponse> = flows.into_iter().map(flow_to_response).collect();
    Ok(Json(serde_json::json!({ "flows": items })))
}

/// GET `/flows/pending` - Requests the caller can act on now.
async fn list_pending(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(page): Query<PageRequest>,
) -> Result<Json<PendingResponse>, ApiError> {
    let page = state
        .approvals
        .pending_for_user(auth.user_id(), page)
        .await?;

    let pagination = page.meta.into();
    Ok(Json(PendingResponse {
        approvals: page.data.into_iter().map(pending_to_response).collect(),
        pagination,
    }))
}

/// POST `/flows/{request_id}/approve` - Approve as the assigned approver.
async fn approve_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    payload: Option<Json<DecisionRequest>>,
) -> Result<Json<DecisionResponse>, ApiError> {
    decide(&state, &auth, request_id, Decision::Approved, payload).await
}

/// POST `/flows/{request_id}/reject` - Reject as the assigned approver.
async fn reject_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    payload: Option<Json<DecisionRequest>>,
) -> Result<Json<DecisionResponse>, ApiError> {
    decide(&state, &auth, request_id, Decision::Rejected, payload).await
}

async fn decide(
    state: &AppState,
    auth: &AuthUser,
    request_id: Uuid,
    decision: Decision,
    payload: Option<Json<DecisionRequest>>,
) -> Result<Json<DecisionResponse>, ApiError> {
    let comment = payload.and_then(|Json(body)| body.comment);
    let outcome = state
        .approvals
        .decide_as(
            auth.user_id(),
            ApprovalRequestId::from_uuid(request_id),
            decision,
            comment,
        )
        .await?;
    Ok(Json(outcome_to_response(outcome)))
}

/// POST `/flows/{request_id}/override` - Force a decision (admin only).
async fn override_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
    Json(payload): Json<OverrideRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    auth.require_admin()?;
    let decision = Decision::parse(&payload.action).ok_or_else(|| {
        ApiError::validation(format!(
            "Invalid action '{}': expected APPROVED or REJECTED",
            payload.action
        ))
    })?;

    let outcome = state
        .approvals
        .admin_override(
            auth.user_id(),
            ApprovalRequestId::from_uuid(request_id),
            decision,
            payload.comment,
        )
        .await?;
    Ok(Json(outcome_to_response(outcome)))
}

/// GET `/flows/history/{expense_id}` - Decided requests in decision order.
async fn approval_history(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let history = state
        .approvals
        .approval_history(auth.company_id(), ExpenseId::from_uuid(expense_id))
        .await?;
    let items: Vec<HistoryEntryResponse> = history.into_iter().map(history_to_response).collect();
    Ok(Json(serde_json::json!({ "history": items })))
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_flow_request(payload: CreateFlowRequest) -> Result<NewApprovalFlow, ApiError> {
    let rule_type = RuleType::parse(&payload.rule_type).ok_or_else(|| {
        ApiError::validation(format!(
            "Invalid ruleType '{}': expected UNANIMOUS, PERCENTAGE, SPECIFIC or HYBRID",
            payload.rule_type
        ))
    })?;

    let steps = payload
        .steps
        .into_iter()
        .zip(1..)
        .map(|(step, position)| {
            let approver = match (step.approver_role.as_deref(), step.approver_user_id) {
                (Some(role), None) => ApproverRule::Role(UserRole::parse(role).ok_or_else(
                    || ApiError::validation(format!("Invalid approverRole '{role}'")),
                )?),
                (None, Some(user_id)) => ApproverRule::User(UserId::from_uuid(user_id)),
                _ => {
                    return Err(ApiError::validation(
                        "Each step needs exactly one of approverRole or approverUserId",
                    ));
                }
            };
            Ok(NewFlowStep {
                step_order: step.step_order.unwrap_or(position),
                approver,
            })
        })
        .collect::<Result<Vec<_>, ApiError>>()?;

    Ok(NewApprovalFlow {
        name: payload.name,
        rule_type,
        percentage_threshold: payload.percentage_threshold,
        specific_approver_id: payload.specific_approver_id.map(UserId::from_uuid),
        steps,
    })
}

fn flow_to_response(flow: ApprovalFlow) -> FlowResponse {
    FlowResponse {
        id: flow.id.into_inner(),
        company_id: flow.company_id.into_inner(),
        name: flow.name,
        rule_type: flow.rule_type.as_str(),
        percentage_threshold: flow.percentage_threshold,
        specific_approver_id: flow.specific_approver_id.map(UserId::into_inner),
        is_active: flow.is_active,
        steps: flow
            .steps
            .into_iter()
            .map(|step| {
                let (approver_role, approver_user_id) = match step.approver {
                    ApproverRule::Role(role) => (Some(role.as_str()), None),
                    ApproverRule::User(user_id) => (None, Some(user_id.into_inner())),
                };
                FlowStepResponse {
                    id: step.id.into_inner(),
                    step_order: step.step_order,
                    approver_role,
                    approver_user_id,
                }
            })
            .collect(),
        created_at: flow.created_at,
    }
}

fn outcome_to_response(outcome: DecisionOutcome) -> DecisionResponse {
    DecisionResponse {
        message: outcome.message,
        expense_status: outcome.expense_status.as_str(),
    }
}

fn pending_to_response(pending: PendingApproval) -> PendingApprovalResponse {
    PendingApprovalResponse {
        request: pending.request.into(),
        expense: pending.expense.into(),
    }
}

fn history_to_response(entry: ApprovalHistoryEntry) -> HistoryEntryResponse {
    let request = entry.request;
    HistoryEntryResponse {
        id: request.id.into_inner(),
        approver_id: request.approver_id.into_inner(),
        approver_name: entry.approver_name,
        approver_email: entry.approver_email,
        step_order: request.step_order,
        status: request.status.as_str(),
        comment: request.comment,
        decided_at: request.decided_at,
        overridden_by: request.overridden_by.map(UserId::into_inner),
    }
}

#[cfg(test)]
#[path = "flows_tests.rs"]
mod tests;

//! Expense submission routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{AppState, error::ApiError, middleware::AuthUser};
use spendflow_core::approval::{ApprovalRequest, Expense, NewExpense};
use spendflow_shared::types::{ApprovalFlowId, ExpenseId, UserId};

/// Creates the expense routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/expenses", post(submit_expense))
        .route("/expenses/{expense_id}", get(get_expense))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting an expense.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitExpenseRequest {
    /// What was spent on.
    pub description: String,
    /// Amount spent.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
}

/// An expense as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseResponse {
    /// Expense ID.
    pub id: Uuid,
    /// Owning company.
    pub company_id: Uuid,
    /// Submitting user.
    pub submitted_by: Uuid,
    /// What was spent on.
    pub description: String,
    /// Amount spent.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    /// PENDING, APPROVED or REJECTED.
    pub status: &'static str,
    /// Flow the expense runs through.
    pub flow_id: Option<Uuid>,
    /// Active step.
    pub current_step: i32,
    /// Concurrency token.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl From<Expense> for ExpenseResponse {
    fn from(e: Expense) -> Self {
        Self {
            id: e.id.into_inner(),
            company_id: e.company_id.into_inner(),
            submitted_by: e.submitted_by.into_inner(),
            description: e.description,
            amount: e.amount,
            currency: e.currency,
            status: e.status.as_str(),
            flow_id: e.flow_id.map(ApprovalFlowId::into_inner),
            current_step: e.current_step,
            version: e.version,
            created_at: e.created_at,
            updated_at: e.updated_at,
        }
    }
}

/// An approval request as returned by the API.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequestResponse {
    /// Request ID.
    pub id: Uuid,
    /// Expense under review.
    pub expense_id: Uuid,
    /// Assigned approver.
    pub approver_id: Uuid,
    /// Step the request belongs to.
    pub step_order: i32,
    /// PENDING, APPROVED or REJECTED.
    pub status: &'static str,
    /// Approver's comment.
    pub comment: Option<String>,
    /// Decision time.
    pub decided_at: Option<DateTime<Utc>>,
    /// Admin who forced the decision.
    pub overridden_by: Option<Uuid>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl From<ApprovalRequest> for ApprovalRequestResponse {
    fn from(r: ApprovalRequest) -> Self {
        Self {
            id: r.id.into_inner(),
            expense_id: r.expense_id.into_inner(),
            approver_id: r.approver_id.into_inner(),
            step_order: r.step_order,
            status: r.status.as_str(),
            comment: r.comment,
            decided_at: r.decided_at,
            overridden_by: r.overridden_by.map(UserId::into_inner),
            created_at: r.created_at,
        }
    }
}

/// Response for a submitted expense.
#[derive(Debug, Serialize)]
pub struct SubmitExpenseResponse {
    /// The stored expense.
    pub expense: ExpenseResponse,
    /// Requests created for the first step.
    pub approvals: Vec<ApprovalRequestResponse>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST `/expenses` - Submit an expense into the active approval flow.
async fn submit_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SubmitExpenseRequest>,
) -> Result<(StatusCode, Json<SubmitExpenseResponse>), ApiError> {
    let (expense, requests) = state
        .approvals
        .submit_expense(
            auth.company_id(),
            auth.user_id(),
            NewExpense {
                description: payload.description,
                amount: payload.amount,
                currency: payload.currency,
            },
        )
        .await?;

    info!(
        expense_id = %expense.id,
        user_id = %auth.user_id(),
        "Expense submitted via API"
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitExpenseResponse {
            expense: expense.into(),
            approvals: requests.into_iter().map(Into::into).collect(),
        }),
    ))
}

/// GET `/expenses/{expense_id}` - Get an expense of the caller's company.
async fn get_expense(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(expense_id): Path<Uuid>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    let expense = state
        .approvals
        .get_expense(auth.company_id(), ExpenseId::from_uuid(expense_id))
        .await?;
    Ok(Json(expense.into()))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use crate::test_support::TestApp;
    use spendflow_core::approval::{ApproverRule, RuleType, UserRole};

    #[tokio::test]
    async fn test_submit_expense_creates_step_one_approvals() {
        let app = TestApp::new();
        let manager = app.user("Mona", UserRole::Manager).await;
        app.flow(RuleType::Unanimous, vec![ApproverRule::User(manager)])
            .await;
        let employee = app.user("Eve", UserRole::Employee).await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/v1/expenses",
                Some(&app.token(employee, UserRole::Employee)),
                Some(json!({
                    "description": "Train to Berlin",
                    "amount": "89.90",
                    "currency": "eur"
                })),
            )
            .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["expense"]["status"], "PENDING");
        assert_eq!(body["expense"]["currency"], "EUR");
        assert_eq!(body["expense"]["currentStep"], 1);
        assert_eq!(body["approvals"].as_array().unwrap().len(), 1);
        assert_eq!(body["approvals"][0]["approverId"], manager.to_string());
    }

    #[tokio::test]
    async fn test_submit_without_flow_is_not_found() {
        let app = TestApp::new();
        let employee = app.user("Eve", UserRole::Employee).await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/v1/expenses",
                Some(&app.token(employee, UserRole::Employee)),
                Some(json!({ "description": "Taxi", "amount": "12", "currency": "USD" })),
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "NO_ACTIVE_FLOW");
    }

    #[tokio::test]
    async fn test_submit_rejects_non_positive_amount() {
        let app = TestApp::new();
        let manager = app.user("Mona", UserRole::Manager).await;
        app.flow(RuleType::Unanimous, vec![ApproverRule::User(manager)])
            .await;
        let employee = app.user("Eve", UserRole::Employee).await;

        let (status, body) = app
            .request(
                Method::POST,
                "/api/v1/expenses",
                Some(&app.token(employee, UserRole::Employee)),
                Some(json!({ "description": "Refund", "amount": "-5", "currency": "USD" })),
            )
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "INVALID_EXPENSE");
    }

    #[tokio::test]
    async fn test_expense_of_other_company_is_hidden() {
        let app = TestApp::new();
        let manager = app.user("Mona", UserRole::Manager).await;
        app.flow(RuleType::Unanimous, vec![ApproverRule::User(manager)])
            .await;
        let employee = app.user("Eve", UserRole::Employee).await;
        let expense_id = app.submit(employee).await;

        let other = TestApp::with_store(app.store.clone());
        let outsider = other.user("Otto", UserRole::Admin).await;

        let uri = format!("/api/v1/expenses/{expense_id}");
        let (status, _) = other
            .request(
                Method::GET,
                &uri,
                Some(&other.token(outsider, UserRole::Admin)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .request(
                Method::GET,
                &uri,
                Some(&app.token(employee, UserRole::Employee)),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], expense_id.to_string());
        assert_eq!(body["amount"], "42.00");
    }
}

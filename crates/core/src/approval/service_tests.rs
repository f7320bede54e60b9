//! Tests for [`ApprovalService`] against the in-memory store.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;
use crate::approval::memory::InMemoryApprovalStore;
use crate::approval::types::{NewFlowStep, RequestStatus, RuleType, UserRole};

struct Fixture {
    store: Arc<InMemoryApprovalStore>,
    service: ApprovalService,
    company: CompanyId,
    employee: UserId,
}

impl Fixture {
    async fn new() -> Self {
        let store = Arc::new(InMemoryApprovalStore::new());
        let service = ApprovalService::new(store.clone());
        let company = CompanyId::new();
        let employee = store.add_user(company, "Erin", UserRole::Employee).await;
        Self {
            store,
            service,
            company,
            employee,
        }
    }

    async fn user(&self, name: &str, role: UserRole) -> UserId {
        self.store.add_user(self.company, name, role).await
    }

    async fn flow(
        &self,
        rule_type: RuleType,
        percentage_threshold: Option<Decimal>,
        specific_approver_id: Option<UserId>,
        steps: Vec<ApproverRule>,
    ) -> ApprovalFlow {
        self.service
            .create_flow(
                self.company,
                NewApprovalFlow {
                    name: format!("{rule_type} flow"),
                    rule_type,
                    percentage_threshold,
                    specific_approver_id,
                    steps: steps
                        .into_iter()
                        .zip(1..)
                        .map(|(approver, step_order)| NewFlowStep {
                            step_order,
                            approver,
                        })
                        .collect(),
                },
            )
            .await
            .unwrap()
    }

    async fn submit(&self) -> (Expense, Vec<ApprovalRequest>) {
        self.service
            .submit_expense(
                self.company,
                self.employee,
                NewExpense {
                    description: "Client dinner".to_string(),
                    amount: dec!(180.40),
                    currency: "usd".to_string(),
                },
            )
            .await
            .unwrap()
    }

    async fn expense(&self, expense_id: ExpenseId) -> Expense {
        self.service
            .get_expense(self.company, expense_id)
            .await
            .unwrap()
    }

    async fn request(&self, request_id: ApprovalRequestId) -> ApprovalRequest {
        self.store.find_request(request_id).await.unwrap().unwrap()
    }

    async fn approve(&self, request_id: ApprovalRequestId) -> DecisionOutcome {
        self.service
            .process_approval_decision(request_id, Decision::Approved, None)
            .await
            .unwrap()
    }

    async fn reject(&self, request_id: ApprovalRequestId) -> DecisionOutcome {
        self.service
            .process_approval_decision(request_id, Decision::Rejected, Some("no".to_string()))
            .await
            .unwrap()
    }
}

fn request_of(requests: &[ApprovalRequest], approver: UserId) -> ApprovalRequestId {
    requests
        .iter()
        .find(|r| r.approver_id == approver)
        .map(|r| r.id)
        .unwrap()
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_submit_creates_step_one_requests() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    let flow = fx
        .flow(
            RuleType::Unanimous,
            None,
            None,
            vec![ApproverRule::Role(UserRole::Manager)],
        )
        .await;

    let (expense, requests) = fx.submit().await;

    assert_eq!(expense.status, ExpenseStatus::Pending);
    assert_eq!(expense.flow_id, Some(flow.id));
    assert_eq!(expense.current_step, 1);
    assert_eq!(expense.currency, "USD");
    assert_eq!(requests.len(), 2);
    assert!(requests.iter().all(|r| r.step_order == 1 && r.is_pending()));
    let mut approvers: Vec<UserId> = requests.iter().map(|r| r.approver_id).collect();
    approvers.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(approvers, expected);
}

#[tokio::test]
async fn test_submit_without_flow_stores_nothing() {
    let fx = Fixture::new().await;

    let err = fx
        .service
        .submit_expense(
            fx.company,
            fx.employee,
            NewExpense {
                description: "Taxi".to_string(),
                amount: dec!(20),
                currency: "EUR".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::NoActiveFlow(_)));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_submit_with_empty_approver_set_fails() {
    let fx = Fixture::new().await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;

    let err = fx
        .service
        .submit_expense(
            fx.company,
            fx.employee,
            NewExpense {
                description: "Taxi".to_string(),
                amount: dec!(20),
                currency: "EUR".to_string(),
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApprovalError::NoEligibleApprovers { step_order: 1 }
    ));
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_submit_rejects_bad_input() {
    let fx = Fixture::new().await;
    fx.user("Ann", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;

    for (description, amount, currency) in [
        ("", dec!(10), "USD"),
        ("Lunch", dec!(0), "USD"),
        ("Lunch", dec!(-3.50), "USD"),
        ("Lunch", dec!(10), "US"),
        ("Lunch", dec!(10), "U5D"),
    ] {
        let result = fx
            .service
            .submit_expense(
                fx.company,
                fx.employee,
                NewExpense {
                    description: description.to_string(),
                    amount,
                    currency: currency.to_string(),
                },
            )
            .await;
        assert!(
            matches!(result, Err(ApprovalError::InvalidExpense(_))),
            "{description:?} {amount} {currency}"
        );
    }
}

#[tokio::test]
async fn test_create_approval_requests_starts_flow_once() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let flow = fx
        .flow(RuleType::Unanimous, None, None, vec![ApproverRule::User(a)])
        .await;

    let now = Utc::now();
    let expense = Expense {
        id: ExpenseId::new(),
        company_id: fx.company,
        submitted_by: fx.employee,
        description: "Imported".to_string(),
        amount: dec!(99),
        currency: "GBP".to_string(),
        status: ExpenseStatus::Pending,
        flow_id: None,
        current_step: 0,
        version: 1,
        created_at: now,
        updated_at: now,
    };
    fx.store.insert_expense(&expense, &[]).await.unwrap();

    let requests = fx
        .service
        .create_approval_requests(expense.id, fx.company)
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].approver_id, a);

    let started = fx.expense(expense.id).await;
    assert_eq!(started.flow_id, Some(flow.id));
    assert_eq!(started.current_step, 1);
    assert_eq!(started.version, 2);

    let err = fx
        .service
        .create_approval_requests(expense.id, fx.company)
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::FlowAlreadyStarted(_)));
}

#[tokio::test]
async fn test_create_approval_requests_checks_company() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    fx.flow(RuleType::Unanimous, None, None, vec![ApproverRule::User(a)])
        .await;
    let (expense, _) = fx.submit().await;

    let err = fx
        .service
        .create_approval_requests(expense.id, CompanyId::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::ExpenseNotFound(_)));
}

#[tokio::test]
async fn test_create_flow_rejects_foreign_user() {
    let fx = Fixture::new().await;
    let outsider = fx
        .store
        .add_user(CompanyId::new(), "Olga", UserRole::Manager)
        .await;

    let err = fx
        .service
        .create_flow(
            fx.company,
            NewApprovalFlow {
                name: "Bad".to_string(),
                rule_type: RuleType::Specific,
                percentage_threshold: None,
                specific_approver_id: Some(outsider),
                steps: vec![NewFlowStep {
                    step_order: 1,
                    approver: ApproverRule::Role(UserRole::Manager),
                }],
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::InvalidFlow(_)));
}

// ============================================================================
// UNANIMOUS
// ============================================================================

#[tokio::test]
async fn test_unanimous_two_approvers() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    let first = fx.approve(request_of(&requests, a)).await;
    assert_eq!(first.expense_status, ExpenseStatus::Pending);
    assert_eq!(fx.expense(expense.id).await.status, ExpenseStatus::Pending);

    let second = fx.approve(request_of(&requests, b)).await;
    assert_eq!(second.expense_status, ExpenseStatus::Approved);
    assert_eq!(second.advanced_to_step, None);

    let stored = fx.expense(expense.id).await;
    assert_eq!(stored.status, ExpenseStatus::Approved);
    assert_eq!(stored.version, 3);
}

#[tokio::test]
async fn test_unanimous_single_rejection_rejects() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    let c = fx.user("Cid", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    fx.approve(request_of(&requests, a)).await;
    let outcome = fx.reject(request_of(&requests, b)).await;
    assert_eq!(outcome.expense_status, ExpenseStatus::Rejected);

    // The remaining request stays pending but is inert.
    let c_request = request_of(&requests, c);
    assert!(fx.request(c_request).await.is_pending());
    assert!(!fx.service.can_user_approve(c, c_request).await.unwrap());

    let err = fx
        .service
        .process_approval_decision(c_request, Decision::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::ExpenseClosed { .. }));
    assert_eq!(fx.expense(expense.id).await.status, ExpenseStatus::Rejected);
}

// ============================================================================
// PERCENTAGE
// ============================================================================

#[tokio::test]
async fn test_percentage_two_of_three_approves() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    let c = fx.user("Cid", UserRole::Manager).await;
    fx.flow(
        RuleType::Percentage,
        Some(dec!(60)),
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (_, requests) = fx.submit().await;

    assert_eq!(
        fx.approve(request_of(&requests, a)).await.expense_status,
        ExpenseStatus::Pending
    );
    assert_eq!(
        fx.approve(request_of(&requests, c)).await.expense_status,
        ExpenseStatus::Approved
    );
    assert!(fx.request(request_of(&requests, b)).await.is_pending());
}

#[tokio::test]
async fn test_percentage_two_rejections_reject_early() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.user("Cid", UserRole::Manager).await;
    fx.flow(
        RuleType::Percentage,
        Some(dec!(60)),
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (_, requests) = fx.submit().await;

    assert_eq!(
        fx.reject(request_of(&requests, a)).await.expense_status,
        ExpenseStatus::Pending
    );
    assert_eq!(
        fx.reject(request_of(&requests, b)).await.expense_status,
        ExpenseStatus::Rejected
    );
}

// ============================================================================
// SPECIFIC and HYBRID
// ============================================================================

#[tokio::test]
async fn test_specific_ignores_other_approvers() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    let cfo = fx.user("Cfo", UserRole::Admin).await;
    fx.flow(
        RuleType::Specific,
        None,
        Some(cfo),
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (_, requests) = fx.submit().await;
    assert_eq!(requests.len(), 3);

    assert_eq!(
        fx.approve(request_of(&requests, a)).await.expense_status,
        ExpenseStatus::Pending
    );
    assert_eq!(
        fx.reject(request_of(&requests, b)).await.expense_status,
        ExpenseStatus::Pending
    );
    assert_eq!(
        fx.approve(request_of(&requests, cfo)).await.expense_status,
        ExpenseStatus::Approved
    );
}

#[tokio::test]
async fn test_specific_rejection_rejects() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let cfo = fx.user("Cfo", UserRole::Admin).await;
    fx.flow(
        RuleType::Specific,
        None,
        Some(cfo),
        vec![ApproverRule::User(a)],
    )
    .await;
    let (_, requests) = fx.submit().await;

    fx.approve(request_of(&requests, a)).await;
    assert_eq!(
        fx.reject(request_of(&requests, cfo)).await.expense_status,
        ExpenseStatus::Rejected
    );
}

#[tokio::test]
async fn test_hybrid_specific_approval_short_circuits() {
    let fx = Fixture::new().await;
    fx.user("Ann", UserRole::Manager).await;
    fx.user("Bob", UserRole::Manager).await;
    fx.user("Cid", UserRole::Manager).await;
    let cfo = fx.user("Cfo", UserRole::Admin).await;
    fx.flow(
        RuleType::Hybrid,
        Some(dec!(75)),
        Some(cfo),
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (_, requests) = fx.submit().await;

    assert_eq!(
        fx.approve(request_of(&requests, cfo)).await.expense_status,
        ExpenseStatus::Approved
    );
}

#[tokio::test]
async fn test_hybrid_unreachable_threshold_rejects_before_specific_decides() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.user("Cid", UserRole::Manager).await;
    let cfo = fx.user("Cfo", UserRole::Admin).await;
    fx.flow(
        RuleType::Hybrid,
        Some(dec!(75)),
        Some(cfo),
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;
    assert_eq!(requests.len(), 4);

    assert_eq!(
        fx.reject(request_of(&requests, a)).await.expense_status,
        ExpenseStatus::Pending
    );
    // 3 of 4 approvals needed; two rejections leave at most 2.
    assert_eq!(
        fx.reject(request_of(&requests, b)).await.expense_status,
        ExpenseStatus::Rejected
    );
    assert!(fx.request(request_of(&requests, cfo)).await.is_pending());
    assert_eq!(fx.expense(expense.id).await.status, ExpenseStatus::Rejected);
}

// ============================================================================
// Multi-step flows
// ============================================================================

#[tokio::test]
async fn test_step_approval_advances_to_next_step() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    let cfo = fx.user("Cfo", UserRole::Admin).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![
            ApproverRule::Role(UserRole::Manager),
            ApproverRule::User(cfo),
        ],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    fx.approve(request_of(&requests, a)).await;
    let outcome = fx.approve(request_of(&requests, b)).await;
    assert_eq!(outcome.expense_status, ExpenseStatus::Pending);
    assert_eq!(outcome.advanced_to_step, Some(2));

    let stored = fx.expense(expense.id).await;
    assert_eq!(stored.current_step, 2);

    let pending = fx
        .service
        .pending_for_user(cfo, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(pending.meta.total, 1);
    let step_two = pending.data[0].request.clone();
    assert_eq!(step_two.step_order, 2);
    assert!(fx.service.can_user_approve(cfo, step_two.id).await.unwrap());

    let done = fx.approve(step_two.id).await;
    assert_eq!(done.expense_status, ExpenseStatus::Approved);
}

#[tokio::test]
async fn test_unstaffed_next_step_persists_nothing() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![
            ApproverRule::User(a),
            ApproverRule::Role(UserRole::Admin),
        ],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    let err = fx
        .service
        .process_approval_decision(requests[0].id, Decision::Approved, None)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApprovalError::NoEligibleApprovers { step_order: 2 }
    ));
    assert!(fx.request(requests[0].id).await.is_pending());
    assert_eq!(fx.expense(expense.id).await.version, expense.version);
}

// ============================================================================
// Re-deciding and authorization
// ============================================================================

#[tokio::test]
async fn test_redeciding_fails_without_mutation() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    fx.user("Bob", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;
    let a_request = request_of(&requests, a);
    fx.approve(a_request).await;
    let before = fx.expense(expense.id).await;

    let err = fx
        .service
        .process_approval_decision(a_request, Decision::Rejected, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::RequestAlreadyDecided { .. }));
    assert!(err.is_invalid_state());
    assert_eq!(fx.expense(expense.id).await, before);
    assert_eq!(fx.request(a_request).await.status, RequestStatus::Approved);
}

#[tokio::test]
async fn test_can_user_approve_rules() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (_, requests) = fx.submit().await;
    let a_request = request_of(&requests, a);

    assert!(fx.service.can_user_approve(a, a_request).await.unwrap());
    assert!(!fx.service.can_user_approve(b, a_request).await.unwrap());

    fx.approve(a_request).await;
    assert!(!fx.service.can_user_approve(a, a_request).await.unwrap());

    let err = fx
        .service
        .can_user_approve(a, ApprovalRequestId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::RequestNotFound(_)));
}

#[tokio::test]
async fn test_decide_as_requires_assigned_approver() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.flow(RuleType::Unanimous, None, None, vec![ApproverRule::User(a)])
        .await;
    let (_, requests) = fx.submit().await;

    let err = fx
        .service
        .decide_as(b, requests[0].id, Decision::Approved, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::NotAuthorizedToDecide { .. }));
    assert_eq!(err.status_code(), 403);

    let outcome = fx
        .service
        .decide_as(a, requests[0].id, Decision::Approved, Some("fine".into()))
        .await
        .unwrap();
    assert_eq!(outcome.expense_status, ExpenseStatus::Approved);
    assert_eq!(
        fx.request(requests[0].id).await.comment.as_deref(),
        Some("fine")
    );
}

// ============================================================================
// Override
// ============================================================================

#[tokio::test]
async fn test_override_rejects_with_no_decisions() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    let admin = fx.user("Root", UserRole::Admin).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;
    let a_request = request_of(&requests, a);
    let b_request = request_of(&requests, b);

    let outcome = fx
        .service
        .admin_override(admin, a_request, Decision::Rejected, Some("policy".into()))
        .await
        .unwrap();

    assert_eq!(outcome.expense_status, ExpenseStatus::Rejected);
    assert_eq!(fx.expense(expense.id).await.status, ExpenseStatus::Rejected);

    let overridden = fx.request(a_request).await;
    assert_eq!(overridden.status, RequestStatus::Rejected);
    assert_eq!(overridden.overridden_by, Some(admin));

    // Sibling stays pending and inert.
    assert!(fx.request(b_request).await.is_pending());
    assert!(!fx.service.can_user_approve(b, b_request).await.unwrap());
}

#[tokio::test]
async fn test_override_approves_multi_step_flow_immediately() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let cfo = fx.user("Cfo", UserRole::Admin).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::User(a), ApproverRule::User(cfo)],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    let outcome = fx
        .service
        .admin_override(cfo, requests[0].id, Decision::Approved, None)
        .await
        .unwrap();

    assert_eq!(outcome.expense_status, ExpenseStatus::Approved);
    assert_eq!(outcome.advanced_to_step, None);
    assert_eq!(fx.expense(expense.id).await.current_step, 1);
}

#[tokio::test]
async fn test_override_on_decided_request_fails() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    fx.user("Bob", UserRole::Manager).await;
    let admin = fx.user("Root", UserRole::Admin).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (_, requests) = fx.submit().await;
    let a_request = request_of(&requests, a);
    fx.approve(a_request).await;

    let err = fx
        .service
        .admin_override(admin, a_request, Decision::Rejected, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::RequestAlreadyDecided { .. }));
}

#[tokio::test]
async fn test_override_by_other_company_is_forbidden() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let foreign_admin = fx
        .store
        .add_user(CompanyId::new(), "Mallory", UserRole::Admin)
        .await;
    fx.flow(RuleType::Unanimous, None, None, vec![ApproverRule::User(a)])
        .await;
    let (expense, requests) = fx.submit().await;

    let err = fx
        .service
        .admin_override(foreign_admin, requests[0].id, Decision::Approved, None)
        .await
        .unwrap_err();

    assert!(matches!(err, ApprovalError::CrossTenant { .. }));
    assert_eq!(err.status_code(), 403);
    assert_eq!(fx.expense(expense.id).await.status, ExpenseStatus::Pending);
}

// ============================================================================
// Queries and concurrency
// ============================================================================

#[tokio::test]
async fn test_history_lists_decided_requests_in_order() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.user("Cid", UserRole::Manager).await;
    fx.flow(
        RuleType::Percentage,
        Some(dec!(100)),
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    fx.approve(request_of(&requests, b)).await;
    fx.approve(request_of(&requests, a)).await;

    let history = fx
        .service
        .approval_history(fx.company, expense.id)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].request.approver_id, b);
    assert_eq!(history[0].approver_name, "Bob");
    assert_eq!(history[1].request.approver_id, a);

    let err = fx
        .service
        .approval_history(CompanyId::new(), expense.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ApprovalError::ExpenseNotFound(_)));
}

#[tokio::test]
async fn test_pending_for_user_pages_actionable_requests() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    fx.flow(RuleType::Unanimous, None, None, vec![ApproverRule::User(a)])
        .await;
    let (first, _) = fx.submit().await;
    let (second, second_requests) = fx.submit().await;
    fx.submit().await;

    fx.approve(second_requests[0].id).await;

    let page = fx
        .service
        .pending_for_user(a, PageRequest { page: 1, per_page: 1 })
        .await
        .unwrap();
    assert_eq!(page.meta.total, 2);
    assert_eq!(page.meta.total_pages, 2);
    assert_eq!(page.data.len(), 1);

    let all = fx
        .service
        .pending_for_user(a, PageRequest { page: 0, per_page: 500 })
        .await
        .unwrap();
    assert_eq!(all.meta.page, 1);
    assert_eq!(all.data.len(), 2);
    assert!(all.data.iter().all(|p| p.expense.id != second.id));
    assert!(all.data.iter().any(|p| p.expense.id == first.id));
}

#[tokio::test]
async fn test_concurrent_decisions_both_land() {
    let fx = Fixture::new().await;
    let a = fx.user("Ann", UserRole::Manager).await;
    let b = fx.user("Bob", UserRole::Manager).await;
    fx.flow(
        RuleType::Unanimous,
        None,
        None,
        vec![ApproverRule::Role(UserRole::Manager)],
    )
    .await;
    let (expense, requests) = fx.submit().await;

    let (ra, rb) = tokio::join!(
        fx.service
            .process_approval_decision(request_of(&requests, a), Decision::Approved, None),
        fx.service
            .process_approval_decision(request_of(&requests, b), Decision::Approved, None),
    );
    ra.unwrap();
    rb.unwrap();

    let stored = fx.expense(expense.id).await;
    assert_eq!(stored.status, ExpenseStatus::Approved);
    assert_eq!(stored.version, 3);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let mut calls = 0;
    let result: Result<(), ApprovalError> = retry_on_conflict(|| {
        calls += 1;
        async { Err(ApprovalError::Conflict("busy".to_string())) }
    })
    .await;

    assert!(matches!(result, Err(ApprovalError::Conflict(_))));
    assert_eq!(calls, MAX_DECISION_ATTEMPTS);
}

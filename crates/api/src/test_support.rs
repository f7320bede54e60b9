//! Router harness for HTTP tests over the in-memory store.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::Value;
use tower::ServiceExt;

use crate::{AppState, create_router};
use spendflow_core::approval::{
    ApprovalService, ApproverRule, InMemoryApprovalStore, NewApprovalFlow, NewExpense,
    NewFlowStep, RuleType, UserRole,
};
use spendflow_shared::types::{CompanyId, ExpenseId, UserId};
use spendflow_shared::{JwtConfig, JwtService};

pub(crate) struct TestApp {
    pub store: Arc<InMemoryApprovalStore>,
    pub service: ApprovalService,
    pub company: CompanyId,
    router: Router,
    jwt: Arc<JwtService>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(InMemoryApprovalStore::new()))
    }

    /// A second company sharing the same store.
    pub fn with_store(store: Arc<InMemoryApprovalStore>) -> Self {
        let jwt = Arc::new(JwtService::new(JwtConfig {
            secret: "test-secret-key-for-testing".to_string(),
            access_token_expires_minutes: 15,
        }));
        let service = ApprovalService::new(store.clone());
        let router = create_router(AppState {
            approvals: service.clone(),
            jwt_service: jwt.clone(),
        });
        Self {
            store,
            service,
            company: CompanyId::new(),
            router,
            jwt,
        }
    }

    pub async fn user(&self, name: &str, role: UserRole) -> UserId {
        self.store.add_user(self.company, name, role).await
    }

    pub fn token(&self, user: UserId, role: UserRole) -> String {
        self.jwt
            .generate_access_token(user.into_inner(), self.company.into_inner(), role.as_str())
            .unwrap()
    }

    pub async fn flow(&self, rule_type: RuleType, steps: Vec<ApproverRule>) {
        self.service
            .create_flow(
                self.company,
                NewApprovalFlow {
                    name: "Test flow".to_string(),
                    rule_type,
                    percentage_threshold: None,
                    specific_approver_id: None,
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
            .unwrap();
    }

    pub async fn submit(&self, employee: UserId) -> ExpenseId {
        let (expense, _) = self
            .service
            .submit_expense(
                self.company,
                employee,
                NewExpense {
                    description: "Team lunch".to_string(),
                    amount: dec!(42.00),
                    currency: "USD".to_string(),
                },
            )
            .await
            .unwrap();
        expense.id
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

//! Domain types for expense approval flows.
//!
//! Flows are configured per company and consist of ordered steps. Each step
//! names who may act through an [`ApproverRule`]. Submitting an expense
//! creates one [`ApprovalRequest`] per eligible approver of the active step.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use spendflow_shared::types::{
    ApprovalFlowId, ApprovalRequestId, CompanyId, ExpenseId, FlowStepId, UserId,
};

/// Role of a user within a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    /// Submits expenses.
    Employee,
    /// Reviews and approves expenses.
    Manager,
    /// Configures flows and may override decisions.
    Admin,
}

impl UserRole {
    /// Parse a role from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "EMPLOYEE" => Some(Self::Employee),
            "MANAGER" => Some(Self::Manager),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    /// Returns the string representation of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Employee => "EMPLOYEE",
            Self::Manager => "MANAGER",
            Self::Admin => "ADMIN",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregation policy rolling per-approver decisions up to a step verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    /// Every approver of the step must approve; one rejection rejects.
    Unanimous,
    /// A share of approvers (threshold percent) must approve.
    Percentage,
    /// A single designated approver decides.
    Specific,
    /// Percentage or the designated approver, whichever settles first.
    Hybrid,
}

impl RuleType {
    /// Parse a rule type from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "UNANIMOUS" => Some(Self::Unanimous),
            "PERCENTAGE" => Some(Self::Percentage),
            "SPECIFIC" => Some(Self::Specific),
            "HYBRID" => Some(Self::Hybrid),
            _ => None,
        }
    }

    /// Returns the string representation of the rule type.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unanimous => "UNANIMOUS",
            Self::Percentage => "PERCENTAGE",
            Self::Specific => "SPECIFIC",
            Self::Hybrid => "HYBRID",
        }
    }

    /// Returns true if the rule needs a percentage threshold.
    #[must_use]
    pub fn needs_threshold(&self) -> bool {
        matches!(self, Self::Percentage | Self::Hybrid)
    }

    /// Returns true if the rule needs a specific approver.
    #[must_use]
    pub fn needs_specific_approver(&self) -> bool {
        matches!(self, Self::Specific | Self::Hybrid)
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    /// Awaiting the approver's decision.
    Pending,
    /// Approved by the approver (or an override).
    Approved,
    /// Rejected by the approver (or an override).
    Rejected,
}

impl RequestStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Returns true once the request has been decided.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of an expense, derived from its approval requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    /// In the approval flow.
    Pending,
    /// Approved at the last step, or by override.
    Approved,
    /// Rejected at some step, or by override.
    Rejected,
}

impl ExpenseStatus {
    /// Returns the string representation of the status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    /// Returns true if no further decisions can change the expense.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal decision on an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    /// Approve.
    Approved,
    /// Reject.
    Rejected,
}

impl Decision {
    /// Parse a decision, accepting both verb and participle forms.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "APPROVED" | "APPROVE" => Some(Self::Approved),
            "REJECTED" | "REJECT" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// The request status this decision sets.
    #[must_use]
    pub const fn request_status(self) -> RequestStatus {
        match self {
            Self::Approved => RequestStatus::Approved,
            Self::Rejected => RequestStatus::Rejected,
        }
    }

    /// The expense status an override with this decision forces.
    #[must_use]
    pub const fn expense_status(self) -> ExpenseStatus {
        match self {
            Self::Approved => ExpenseStatus::Approved,
            Self::Rejected => ExpenseStatus::Rejected,
        }
    }

    /// Lowercase verb used in messages.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Who is eligible to act at a flow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApproverRule {
    /// Every company user holding the role.
    Role(UserRole),
    /// Exactly this user.
    User(UserId),
}

/// A user as seen by the approval engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyUser {
    /// User ID.
    pub id: UserId,
    /// Company the user belongs to.
    pub company_id: CompanyId,
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Role in the company.
    pub role: UserRole,
}

/// One stage of an approval flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowStep {
    /// Step ID.
    pub id: FlowStepId,
    /// 1-based position in the flow.
    pub step_order: i32,
    /// Who may act at this step.
    pub approver: ApproverRule,
}

/// A company's approval flow definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalFlow {
    /// Flow ID.
    pub id: ApprovalFlowId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Human-readable name.
    pub name: String,
    /// Aggregation policy applied at every step.
    pub rule_type: RuleType,
    /// Percent in (0, 100], for PERCENTAGE and HYBRID.
    pub percentage_threshold: Option<Decimal>,
    /// Deciding approver, for SPECIFIC and HYBRID.
    pub specific_approver_id: Option<UserId>,
    /// Whether new expenses use this flow.
    pub is_active: bool,
    /// Steps sorted by `step_order`.
    pub steps: Vec<FlowStep>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ApprovalFlow {
    /// Returns the step with the given order.
    #[must_use]
    pub fn step(&self, step_order: i32) -> Option<&FlowStep> {
        self.steps.iter().find(|s| s.step_order == step_order)
    }

    /// Returns true if a step with the given order exists.
    #[must_use]
    pub fn has_step(&self, step_order: i32) -> bool {
        self.step(step_order).is_some()
    }
}

/// Input for a flow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFlowStep {
    /// 1-based position in the flow.
    pub step_order: i32,
    /// Who may act at this step.
    pub approver: ApproverRule,
}

/// Input for creating an approval flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewApprovalFlow {
    /// Human-readable name.
    pub name: String,
    /// Aggregation policy.
    pub rule_type: RuleType,
    /// Percent in (0, 100].
    pub percentage_threshold: Option<Decimal>,
    /// Deciding approver.
    pub specific_approver_id: Option<UserId>,
    /// Steps, any order.
    pub steps: Vec<NewFlowStep>,
}

/// A single approver's pending-or-decided action on one expense at one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalRequest {
    /// Request ID.
    pub id: ApprovalRequestId,
    /// Expense under review.
    pub expense_id: ExpenseId,
    /// Assigned approver.
    pub approver_id: UserId,
    /// Step the request belongs to.
    pub step_order: i32,
    /// Current status.
    pub status: RequestStatus,
    /// Approver's comment.
    pub comment: Option<String>,
    /// When the request was decided.
    pub decided_at: Option<DateTime<Utc>>,
    /// Admin who forced the decision, if overridden.
    pub overridden_by: Option<UserId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    /// Creates a pending request.
    #[must_use]
    pub fn pending(expense_id: ExpenseId, approver_id: UserId, step_order: i32) -> Self {
        Self {
            id: ApprovalRequestId::new(),
            expense_id,
            approver_id,
            step_order,
            status: RequestStatus::Pending,
            comment: None,
            decided_at: None,
            overridden_by: None,
            created_at: Utc::now(),
        }
    }

    /// Returns true if the request awaits a decision.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// An expense report moving through an approval flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    /// Expense ID.
    pub id: ExpenseId,
    /// Owning company.
    pub company_id: CompanyId,
    /// Employee who submitted it.
    pub submitted_by: UserId,
    /// What was spent on.
    pub description: String,
    /// Amount spent.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Derived approval status.
    pub status: ExpenseStatus,
    /// Flow the expense was submitted into.
    pub flow_id: Option<ApprovalFlowId>,
    /// Active step; 0 before the flow starts.
    pub current_step: i32,
    /// Optimistic-concurrency token, bumped on every commit.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

/// Input for submitting an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    /// What was spent on.
    pub description: String,
    /// Amount spent.
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency: String,
}

/// Result of a decision or override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    /// Expense status after the commit.
    pub expense_status: ExpenseStatus,
    /// Human-readable summary.
    pub message: String,
    /// Step the flow moved to, if the decision completed a step.
    pub advanced_to_step: Option<i32>,
}

/// An actionable request together with its expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingApproval {
    /// The request awaiting the user.
    pub request: ApprovalRequest,
    /// The expense under review.
    pub expense: Expense,
}

/// A decided request with the approver's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalHistoryEntry {
    /// The decided request.
    pub request: ApprovalRequest,
    /// Approver display name.
    pub approver_name: String,
    /// Approver email.
    pub approver_email: String,
}

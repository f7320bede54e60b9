//! Rule evaluation for a single flow step.
//!
//! The evaluator is pure: it looks at the requests of one step after a
//! decision has been applied and reports whether the step is settled.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use spendflow_shared::types::UserId;

use crate::approval::types::{ApprovalFlow, ApprovalRequest, RequestStatus, RuleType};

/// Outcome of evaluating one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepVerdict {
    /// More decisions are needed.
    Pending,
    /// The step is approved.
    Approved,
    /// The step, and with it the expense, is rejected.
    Rejected,
}

/// Decision counts for the requests of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepTally {
    /// Number of requests at the step.
    pub total: u32,
    /// Approved requests.
    pub approved: u32,
    /// Rejected requests.
    pub rejected: u32,
    /// Requests still pending.
    pub pending: u32,
    /// Status of the specific approver's request, if they have one at the step.
    pub specific: Option<RequestStatus>,
}

impl StepTally {
    /// Counts the requests belonging to `step_order`.
    pub fn from_requests<'a>(
        requests: impl IntoIterator<Item = &'a ApprovalRequest>,
        step_order: i32,
        specific_approver: Option<UserId>,
    ) -> Self {
        let mut tally = Self::default();
        for request in requests.into_iter().filter(|r| r.step_order == step_order) {
            tally.total += 1;
            match request.status {
                RequestStatus::Pending => tally.pending += 1,
                RequestStatus::Approved => tally.approved += 1,
                RequestStatus::Rejected => tally.rejected += 1,
            }
            if Some(request.approver_id) == specific_approver {
                tally.specific = Some(request.status);
            }
        }
        tally
    }
}

/// Applies a flow's rule type to a step tally.
pub struct DecisionEvaluator;

impl DecisionEvaluator {
    /// Number of approvals a percentage rule needs: `ceil(threshold * total / 100)`,
    /// never more than `total`.
    ///
    /// A missing threshold counts as 100%.
    #[must_use]
    pub fn required_approvals(threshold: Option<Decimal>, total: u32) -> u32 {
        let threshold = threshold.unwrap_or(Decimal::ONE_HUNDRED);
        let required = (threshold * Decimal::from(total) / Decimal::ONE_HUNDRED).ceil();
        required.to_u32().unwrap_or(total).min(total)
    }

    /// Evaluates the step against the flow's rule type.
    #[must_use]
    pub fn evaluate(flow: &ApprovalFlow, tally: &StepTally) -> StepVerdict {
        Self::evaluate_rule(flow.rule_type, flow.percentage_threshold, tally)
    }

    /// Evaluates a tally for an explicit rule type and threshold.
    #[must_use]
    pub fn evaluate_rule(
        rule_type: RuleType,
        threshold: Option<Decimal>,
        tally: &StepTally,
    ) -> StepVerdict {
        if tally.total == 0 {
            return StepVerdict::Pending;
        }

        match rule_type {
            RuleType::Unanimous => {
                if tally.rejected > 0 {
                    StepVerdict::Rejected
                } else if tally.approved == tally.total {
                    StepVerdict::Approved
                } else {
                    StepVerdict::Pending
                }
            }
            RuleType::Percentage => Self::percentage(threshold, tally),
            RuleType::Specific => match tally.specific {
                Some(RequestStatus::Approved) => StepVerdict::Approved,
                Some(RequestStatus::Rejected) => StepVerdict::Rejected,
                Some(RequestStatus::Pending) | None => StepVerdict::Pending,
            },
            RuleType::Hybrid => {
                let by_percentage = Self::percentage(threshold, tally);
                if by_percentage == StepVerdict::Approved
                    || tally.specific == Some(RequestStatus::Approved)
                {
                    StepVerdict::Approved
                } else if by_percentage == StepVerdict::Rejected
                    || tally.specific == Some(RequestStatus::Rejected)
                {
                    StepVerdict::Rejected
                } else {
                    StepVerdict::Pending
                }
            }
        }
    }

    fn percentage(threshold: Option<Decimal>, tally: &StepTally) -> StepVerdict {
        let required = Self::required_approvals(threshold, tally.total);
        if tally.approved >= required {
            StepVerdict::Approved
        } else if tally.approved + tally.pending < required {
            // Not enough undecided approvers left to reach the threshold.
            StepVerdict::Rejected
        } else {
            StepVerdict::Pending
        }
    }
}

//! Property-based tests for the decision evaluator.

use proptest::prelude::*;
use rust_decimal::Decimal;

use crate::approval::evaluator::{DecisionEvaluator, StepTally, StepVerdict};
use crate::approval::types::{RequestStatus, RuleType};

/// Threshold in (0, 100] with two decimal places.
fn arb_threshold() -> impl Strategy<Value = Decimal> {
    (1i64..=10_000i64).prop_map(|n| Decimal::new(n, 2))
}

/// Decisions of a step's approvers: `Some(true)` approved, `Some(false)`
/// rejected, `None` pending.
fn arb_decisions() -> impl Strategy<Value = Vec<Option<bool>>> {
    prop::collection::vec(prop::option::of(any::<bool>()), 1..12)
}

fn tally_of(decisions: &[Option<bool>], specific_index: Option<usize>) -> StepTally {
    let mut tally = StepTally::default();
    for (i, decision) in decisions.iter().enumerate() {
        let status = match decision {
            None => RequestStatus::Pending,
            Some(true) => RequestStatus::Approved,
            Some(false) => RequestStatus::Rejected,
        };
        tally.total += 1;
        match status {
            RequestStatus::Pending => tally.pending += 1,
            RequestStatus::Approved => tally.approved += 1,
            RequestStatus::Rejected => tally.rejected += 1,
        }
        if Some(i) == specific_index {
            tally.specific = Some(status);
        }
    }
    tally
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// UNANIMOUS approves iff everyone approved and rejects iff anyone rejected.
    #[test]
    fn prop_unanimous(decisions in arb_decisions()) {
        let tally = tally_of(&decisions, None);
        let verdict = DecisionEvaluator::evaluate_rule(RuleType::Unanimous, None, &tally);

        let any_rejected = decisions.contains(&Some(false));
        let all_approved = decisions.iter().all(|d| *d == Some(true));
        let expected = if any_rejected {
            StepVerdict::Rejected
        } else if all_approved {
            StepVerdict::Approved
        } else {
            StepVerdict::Pending
        };
        prop_assert_eq!(verdict, expected);
    }

    /// The required count is the smallest count whose share reaches the threshold.
    #[test]
    fn prop_required_approvals_is_minimal(threshold in arb_threshold(), total in 1u32..50) {
        let required = DecisionEvaluator::required_approvals(Some(threshold), total);
        let hundred = Decimal::ONE_HUNDRED;

        prop_assert!(required >= 1);
        prop_assert!(required <= total);
        prop_assert!(Decimal::from(required) * hundred >= threshold * Decimal::from(total));
        prop_assert!(Decimal::from(required - 1) * hundred < threshold * Decimal::from(total));
    }

    /// PERCENTAGE approves once the required count is met and rejects once it
    /// cannot be met any more.
    #[test]
    fn prop_percentage(threshold in arb_threshold(), decisions in arb_decisions()) {
        let tally = tally_of(&decisions, None);
        let required = DecisionEvaluator::required_approvals(Some(threshold), tally.total);
        let verdict = DecisionEvaluator::evaluate_rule(RuleType::Percentage, Some(threshold), &tally);

        if tally.approved >= required {
            prop_assert_eq!(verdict, StepVerdict::Approved);
        } else if tally.approved + tally.pending < required {
            prop_assert_eq!(verdict, StepVerdict::Rejected);
        } else {
            prop_assert_eq!(verdict, StepVerdict::Pending);
        }
    }

    /// SPECIFIC always mirrors the specific approver.
    #[test]
    fn prop_specific_mirrors_specific_approver(
        decisions in arb_decisions(),
        index in any::<prop::sample::Index>(),
    ) {
        let specific = index.index(decisions.len());
        let tally = tally_of(&decisions, Some(specific));
        let verdict = DecisionEvaluator::evaluate_rule(RuleType::Specific, None, &tally);

        let expected = match decisions[specific] {
            None => StepVerdict::Pending,
            Some(true) => StepVerdict::Approved,
            Some(false) => StepVerdict::Rejected,
        };
        prop_assert_eq!(verdict, expected);
    }

    /// HYBRID approves whenever either component approves.
    #[test]
    fn prop_hybrid_approval_wins(
        threshold in arb_threshold(),
        decisions in arb_decisions(),
        index in any::<prop::sample::Index>(),
    ) {
        let specific = index.index(decisions.len());
        let tally = tally_of(&decisions, Some(specific));
        let verdict = DecisionEvaluator::evaluate_rule(RuleType::Hybrid, Some(threshold), &tally);
        let by_percentage = DecisionEvaluator::evaluate_rule(RuleType::Percentage, Some(threshold), &tally);
        let by_specific = DecisionEvaluator::evaluate_rule(RuleType::Specific, None, &tally);

        if by_percentage == StepVerdict::Approved || by_specific == StepVerdict::Approved {
            prop_assert_eq!(verdict, StepVerdict::Approved);
        } else if by_percentage == StepVerdict::Rejected || by_specific == StepVerdict::Rejected {
            prop_assert_eq!(verdict, StepVerdict::Rejected);
        } else {
            prop_assert_eq!(verdict, StepVerdict::Pending);
        }
    }

    /// Turning a pending request into an approval never rejects a step that
    /// was not already rejected, and never un-approves one.
    #[test]
    fn prop_approval_is_monotonic(threshold in arb_threshold(), decisions in arb_decisions()) {
        let mut decisions = decisions;
        let tally = tally_of(&decisions, None);
        let before = DecisionEvaluator::evaluate_rule(RuleType::Percentage, Some(threshold), &tally);

        if let Some(slot) = decisions.iter_mut().find(|d| d.is_none()) {
            *slot = Some(true);
            let tally = tally_of(&decisions, None);
            let after = DecisionEvaluator::evaluate_rule(RuleType::Percentage, Some(threshold), &tally);
            if before == StepVerdict::Approved {
                prop_assert_eq!(after, StepVerdict::Approved);
            }
            if before != StepVerdict::Rejected {
                prop_assert_ne!(after, StepVerdict::Rejected);
            }
        }
    }
}

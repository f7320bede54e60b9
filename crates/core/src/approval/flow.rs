//! Approval flow configuration rules.

use chrono::Utc;
use rust_decimal::Decimal;

use spendflow_shared::types::{ApprovalFlowId, CompanyId, FlowStepId};

use crate::approval::error::ApprovalError;
use crate::approval::types::{ApprovalFlow, FlowStep, NewApprovalFlow};

const MAX_NAME_LEN: usize = 255;
const MAX_THRESHOLD_SCALE: u32 = 2;

/// Stateless validator and builder for flow definitions.
pub struct FlowValidator;

impl FlowValidator {
    /// Checks the structural invariants of a flow definition.
    ///
    /// - name is non-empty and at most 255 characters
    /// - at least one step, with orders exactly `1..=n`
    /// - PERCENTAGE and HYBRID carry a threshold in (0, 100] with at most
    ///   two decimal places
    /// - SPECIFIC and HYBRID carry a specific approver
    ///
    /// Membership of referenced users is checked by the service, which has
    /// store access.
    pub fn validate(input: &NewApprovalFlow) -> Result<(), ApprovalError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ApprovalError::InvalidFlow("name is required".to_string()));
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ApprovalError::InvalidFlow(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }

        if input.steps.is_empty() {
            return Err(ApprovalError::InvalidFlow(
                "at least one step is required".to_string(),
            ));
        }

        let mut orders: Vec<i32> = input.steps.iter().map(|s| s.step_order).collect();
        orders.sort_unstable();
        for (expected, actual) in (1..).zip(&orders) {
            if *actual != expected {
                return Err(ApprovalError::InvalidFlow(format!(
                    "step orders must be unique and contiguous from 1 (found {actual} where {expected} was expected)"
                )));
            }
        }

        if input.rule_type.needs_threshold() {
            match input.percentage_threshold {
                Some(t) if t.normalize().scale() > MAX_THRESHOLD_SCALE => {
                    return Err(ApprovalError::InvalidFlow(format!(
                        "percentage threshold allows at most {MAX_THRESHOLD_SCALE} decimal places, got {t}"
                    )));
                }
                Some(t) if t > Decimal::ZERO && t <= Decimal::ONE_HUNDRED => {}
                Some(t) => {
                    return Err(ApprovalError::InvalidFlow(format!(
                        "percentage threshold must be in (0, 100], got {t}"
                    )));
                }
                None => {
                    return Err(ApprovalError::InvalidFlow(format!(
                        "{} flows require a percentage threshold",
                        input.rule_type
                    )));
                }
            }
        }

        if input.rule_type.needs_specific_approver() && input.specific_approver_id.is_none() {
            return Err(ApprovalError::InvalidFlow(format!(
                "{} flows require a specific approver",
                input.rule_type
            )));
        }

        Ok(())
    }

    /// Builds an active flow from a validated definition.
    ///
    /// Steps are sorted by order; a threshold or specific approver the rule
    /// type does not use is dropped.
    #[must_use]
    pub fn build(company_id: CompanyId, input: NewApprovalFlow) -> ApprovalFlow {
        let mut steps: Vec<FlowStep> = input
            .steps
            .into_iter()
            .map(|s| FlowStep {
                id: FlowStepId::new(),
                step_order: s.step_order,
                approver: s.approver,
            })
            .collect();
        steps.sort_by_key(|s| s.step_order);

        ApprovalFlow {
            id: ApprovalFlowId::new(),
            company_id,
            name: input.name.trim().to_string(),
            rule_type: input.rule_type,
            percentage_threshold: input
                .percentage_threshold
                .filter(|_| input.rule_type.needs_threshold()),
            specific_approver_id: input
                .specific_approver_id
                .filter(|_| input.rule_type.needs_specific_approver()),
            is_active: true,
            steps,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::types::{ApproverRule, NewFlowStep, RuleType, UserRole};
    use rust_decimal_macros::dec;
    use spendflow_shared::types::UserId;

    fn flow(rule_type: RuleType, orders: &[i32]) -> NewApprovalFlow {
        NewApprovalFlow {
            name: "Default".to_string(),
            rule_type,
            percentage_threshold: None,
            specific_approver_id: None,
            steps: orders
                .iter()
                .map(|&step_order| NewFlowStep {
                    step_order,
                    approver: ApproverRule::Role(UserRole::Manager),
                })
                .collect(),
        }
    }

    #[test]
    fn test_unanimous_flow_is_valid() {
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[1, 2])).is_ok());
    }

    #[test]
    fn test_steps_in_any_input_order_are_valid() {
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[3, 1, 2])).is_ok());
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut input = flow(RuleType::Unanimous, &[1]);
        input.name = "   ".to_string();
        assert!(matches!(
            FlowValidator::validate(&input),
            Err(ApprovalError::InvalidFlow(_))
        ));
    }

    #[test]
    fn test_no_steps_rejected() {
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[])).is_err());
    }

    #[test]
    fn test_gap_in_step_orders_rejected() {
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[1, 3])).is_err());
    }

    #[test]
    fn test_duplicate_step_orders_rejected() {
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[1, 1])).is_err());
    }

    #[test]
    fn test_steps_must_start_at_one() {
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[0, 1])).is_err());
        assert!(FlowValidator::validate(&flow(RuleType::Unanimous, &[2])).is_err());
    }

    #[test]
    fn test_percentage_requires_threshold() {
        let input = flow(RuleType::Percentage, &[1]);
        assert!(FlowValidator::validate(&input).is_err());
    }

    #[test]
    fn test_percentage_threshold_bounds() {
        for (threshold, ok) in [
            (dec!(0), false),
            (dec!(-5), false),
            (dec!(0.5), true),
            (dec!(60), true),
            (dec!(100), true),
            (dec!(100.01), false),
            (dec!(66.67), true),
            (dec!(66.670), true),
            (dec!(66.666), false),
            (dec!(0.001), false),
        ] {
            let mut input = flow(RuleType::Percentage, &[1]);
            input.percentage_threshold = Some(threshold);
            assert_eq!(
                FlowValidator::validate(&input).is_ok(),
                ok,
                "threshold {threshold}"
            );
        }
    }

    #[test]
    fn test_specific_requires_approver() {
        let mut input = flow(RuleType::Specific, &[1]);
        assert!(FlowValidator::validate(&input).is_err());
        input.specific_approver_id = Some(UserId::new());
        assert!(FlowValidator::validate(&input).is_ok());
    }

    #[test]
    fn test_hybrid_requires_both() {
        let mut input = flow(RuleType::Hybrid, &[1]);
        input.specific_approver_id = Some(UserId::new());
        assert!(FlowValidator::validate(&input).is_err());
        input.percentage_threshold = Some(dec!(50));
        assert!(FlowValidator::validate(&input).is_ok());
    }

    #[test]
    fn test_build_sorts_steps_and_drops_unused_fields() {
        let mut input = flow(RuleType::Unanimous, &[2, 1]);
        input.percentage_threshold = Some(dec!(50));
        input.specific_approver_id = Some(UserId::new());

        let company_id = CompanyId::new();
        let built = FlowValidator::build(company_id, input);

        assert_eq!(built.company_id, company_id);
        assert!(built.is_active);
        assert_eq!(
            built.steps.iter().map(|s| s.step_order).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(built.percentage_threshold, None);
        assert_eq!(built.specific_approver_id, None);
    }
}

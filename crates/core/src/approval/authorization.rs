//! Who may decide an approval request.

use spendflow_shared::types::UserId;

use crate::approval::error::ApprovalError;
use crate::approval::types::{ApprovalRequest, Expense, ExpenseStatus};

/// Returns true if `user_id` may decide `request` right now.
///
/// The user must be the assigned approver, the request must be pending, the
/// expense must be pending and the request must belong to the expense's
/// current step.
#[must_use]
pub fn can_act(user_id: UserId, request: &ApprovalRequest, expense: &Expense) -> bool {
    request.approver_id == user_id
        && request.is_pending()
        && expense.status == ExpenseStatus::Pending
        && request.step_order == expense.current_step
}

/// Checks that `request` can still receive a decision, regardless of who
/// makes it.
pub fn ensure_decidable(request: &ApprovalRequest, expense: &Expense) -> Result<(), ApprovalError> {
    if !request.is_pending() {
        return Err(ApprovalError::RequestAlreadyDecided {
            request_id: request.id,
            status: request.status,
        });
    }
    if expense.status.is_terminal() {
        return Err(ApprovalError::ExpenseClosed {
            expense_id: expense.id,
            status: expense.status,
        });
    }
    if request.step_order != expense.current_step {
        return Err(ApprovalError::StaleStep {
            request_step: request.step_order,
            current_step: expense.current_step,
        });
    }
    Ok(())
}

//! Review rules for the coordinator/manager approval chain.
//!
//! Coordinators verify pending claims, managers approve verified ones, and
//! either may reject a claim that is still under review.

use thiserror::Error;

use crate::{claims::ClaimStatus, users::Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    Verify,
    Approve,
    Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("role {role} may not {action:?} claims")]
    Forbidden { role: Role, action: ReviewAction },
    #[error("cannot {action:?} a claim that is {current}")]
    InvalidTransition {
        action: ReviewAction,
        current: ClaimStatus,
    },
}

/// Status a claim moves to when `role` performs `action` on it.
pub fn review(
    role: Role,
    action: ReviewAction,
    current: ClaimStatus,
) -> Result<ClaimStatus, WorkflowError> {
    let allowed = match action {
        ReviewAction::Verify => role == Role::Coordinator,
        ReviewAction::Approve => role == Role::Manager,
        ReviewAction::Reject => matches!(role, Role::Coordinator | Role::Manager),
    };
    if !allowed {
        return Err(WorkflowError::Forbidden { role, action });
    }

    let next = match (action, current) {
        (ReviewAction::Verify, ClaimStatus::Pending) => ClaimStatus::Verified,
        (ReviewAction::Approve, ClaimStatus::Verified) => ClaimStatus::Approved,
        (ReviewAction::Reject, ClaimStatus::Pending | ClaimStatus::Verified) => {
            ClaimStatus::Rejected
        }
        _ => return Err(WorkflowError::InvalidTransition { action, current }),
    };
    Ok(next)
}

/// Approver label recorded when the reviewer has no display name.
pub fn default_approver(action: ReviewAction) -> &'static str {
    match action {
        ReviewAction::Verify => "Programme Coordinator",
        ReviewAction::Approve => "Academic Manager",
        ReviewAction::Reject => "Approver",
    }
}

//! Approval Policy.
//!
//! Decides whether an order must be preceded by an on-chain allowance
//! approval, may carry a signed permit instead, or can go straight out.
//!
//! Rules, in order:
//! 1. A zero (or negative) amount never needs approval.
//! 2. A backend without allowances never needs approval.
//! 3. `allowance >= amount` needs nothing.
//! 4. Pool-currency orders on a permit-capable backend whose currency
//!    supports permits use a permit, unless the previous action was itself
//!    an approval (the allowance read may be stale right after one).
//! 5. Otherwise an approval transaction is required first.

use std::fmt;

use serde::Serialize;
use tpo_schemas::{ActionKind, BackendKind, Decimal};

use crate::policy::BackendPolicy;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalReason {
    ZeroAmount,
    NoAllowanceConcept,
    Sufficient,
    PermitShortcut,
    AllowanceTooLow,
}

impl fmt::Display for ApprovalReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalReason::ZeroAmount => "nothing to approve for a zero amount",
            ApprovalReason::NoAllowanceConcept => "this network does not use allowances",
            ApprovalReason::Sufficient => "current allowance covers the amount",
            ApprovalReason::PermitShortcut => "order will carry a signed permit",
            ApprovalReason::AllowanceTooLow => "allowance is lower than the amount",
        };
        f.write_str(s)
    }
}

/// Derived, never stored.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApprovalRequirement {
    /// A separate approval action must succeed before the order.
    pub needed: bool,
    /// The order itself carries a signed permit.
    pub use_permit: bool,
    pub reason: ApprovalReason,
    /// Approval kind to dispatch when `needed`.
    pub approval: Option<ActionKind>,
}

impl ApprovalRequirement {
    fn not_needed(reason: ApprovalReason) -> Self {
        Self {
            needed: false,
            use_permit: false,
            reason,
            approval: None,
        }
    }
}

/// Approval action that authorises spending for `order`, if any.
pub fn approval_kind_for(order: ActionKind) -> Option<ActionKind> {
    match order {
        ActionKind::Invest => Some(ActionKind::ApprovePoolCurrency),
        ActionKind::Redeem => Some(ActionKind::ApproveTrancheToken),
        _ => None,
    }
}

/// Evaluate the approval rules for one order.
///
/// `current_allowance` is `None` on backends without allowances.
/// `prior_action` is the kind of the context's most recent action.
pub fn required(
    backend: BackendKind,
    order: ActionKind,
    requested: Decimal,
    current_allowance: Option<Decimal>,
    supports_permit: bool,
    prior_action: Option<ActionKind>,
) -> ApprovalRequirement {
    let Some(approval) = approval_kind_for(order) else {
        return ApprovalRequirement::not_needed(ApprovalReason::Sufficient);
    };
    if requested <= Decimal::ZERO {
        return ApprovalRequirement::not_needed(ApprovalReason::ZeroAmount);
    }

    let policy = BackendPolicy::for_backend(backend);
    let allowance = match current_allowance {
        Some(a) if policy.has_allowances => a,
        _ => return ApprovalRequirement::not_needed(ApprovalReason::NoAllowanceConcept),
    };
    if allowance >= requested {
        return ApprovalRequirement::not_needed(ApprovalReason::Sufficient);
    }

    let after_approval = prior_action.map(|k| k.is_approval()).unwrap_or(false);
    if order == ActionKind::Invest && policy.permit_capable && supports_permit && !after_approval {
        return ApprovalRequirement {
            needed: false,
            use_permit: true,
            reason: ApprovalReason::PermitShortcut,
            approval: None,
        };
    }

    ApprovalRequirement {
        needed: true,
        use_permit: false,
        reason: ApprovalReason::AllowanceTooLow,
        approval: Some(approval),
    }
}

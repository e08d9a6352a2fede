use std::fmt;

use tpo_schemas::{ActionKind, CollectType};

/// Why a dispatch was refused at the router boundary.
///
/// Refusal is an expected outcome; the router state is left untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchRejection {
    /// At most one in-flight action per context.
    ActionInFlight { kind: ActionKind },
    /// Snapshot sections the action needs have not loaded.
    StateLoading,
    /// Pool is computing epoch results; order mutations are refused.
    PoolBusy { kind: ActionKind },
    /// Executed proceeds must be collected before a new order.
    CollectRequired { collect_type: CollectType },
    NoPendingOrder { kind: ActionKind },
    NothingToCollect,
    /// Backend only supports cancel-then-resubmit.
    OrderChangeUnsupported,
    /// Amount has more decimals than the token supports, or is negative.
    AmountNotRepresentable { reason: String },
    /// Backend has no allowance concept.
    ApprovalNotApplicable,
}

impl DispatchRejection {
    /// Stable machine-readable code for logs.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchRejection::ActionInFlight { .. } => "DISPATCH_REFUSED_IN_FLIGHT",
            DispatchRejection::StateLoading => "DISPATCH_REFUSED_LOADING",
            DispatchRejection::PoolBusy { .. } => "DISPATCH_REFUSED_POOL_BUSY",
            DispatchRejection::CollectRequired { .. } => "DISPATCH_REFUSED_COLLECT_FIRST",
            DispatchRejection::NoPendingOrder { .. } => "DISPATCH_REFUSED_NO_PENDING_ORDER",
            DispatchRejection::NothingToCollect => "DISPATCH_REFUSED_NOTHING_TO_COLLECT",
            DispatchRejection::OrderChangeUnsupported => "DISPATCH_REFUSED_CHANGE_UNSUPPORTED",
            DispatchRejection::AmountNotRepresentable { .. } => "DISPATCH_REFUSED_AMOUNT",
            DispatchRejection::ApprovalNotApplicable => "DISPATCH_REFUSED_NO_ALLOWANCES",
        }
    }
}

fn action_phrase(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Invest => "an investment",
        ActionKind::Redeem => "a redemption",
        ActionKind::CancelInvest => "an investment cancellation",
        ActionKind::CancelRedeem => "a redemption cancellation",
        ActionKind::Collect => "a collection",
        ActionKind::ApprovePoolCurrency => "a currency approval",
        ActionKind::ApproveTrancheToken => "a token approval",
    }
}

impl fmt::Display for DispatchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchRejection::ActionInFlight { kind } => write!(
                f,
                "Please wait: {} is still being processed",
                action_phrase(*kind)
            ),
            DispatchRejection::StateLoading => {
                write!(f, "Your position is still loading; try again in a moment")
            }
            DispatchRejection::PoolBusy { .. } => write!(
                f,
                "The pool is currently computing results; orders cannot be changed until it finishes"
            ),
            DispatchRejection::CollectRequired { collect_type } => match collect_type {
                CollectType::Redeem => write!(
                    f,
                    "Collect your redeemed currency before placing a new order"
                ),
                _ => write!(f, "Collect your tokens before placing a new order"),
            },
            DispatchRejection::NoPendingOrder { kind } => match kind {
                ActionKind::CancelRedeem => write!(f, "There is no pending redemption to cancel"),
                _ => write!(f, "There is no pending investment to cancel"),
            },
            DispatchRejection::NothingToCollect => write!(f, "There is nothing to collect"),
            DispatchRejection::OrderChangeUnsupported => write!(
                f,
                "This network cannot change an order in place; cancel it first"
            ),
            DispatchRejection::AmountNotRepresentable { reason } => {
                write!(f, "Amount cannot be submitted: {reason}")
            }
            DispatchRejection::ApprovalNotApplicable => {
                write!(f, "This network does not use token approvals")
            }
        }
    }
}

impl std::error::Error for DispatchRejection {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_sentences_not_state_names() {
        let r = DispatchRejection::CollectRequired {
            collect_type: CollectType::Invest,
        };
        let msg = r.to_string();
        assert!(msg.starts_with("Collect"));
        assert!(!msg.contains("CollectRequired"));
        assert_eq!(r.code(), "DISPATCH_REFUSED_COLLECT_FIRST");
    }
}

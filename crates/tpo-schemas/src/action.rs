use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// ActionKind
// ---------------------------------------------------------------------------

/// Logical actions a caller can dispatch against an order context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Invest,
    Redeem,
    CancelInvest,
    CancelRedeem,
    Collect,
    ApprovePoolCurrency,
    ApproveTrancheToken,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Invest => "invest",
            ActionKind::Redeem => "redeem",
            ActionKind::CancelInvest => "cancelInvest",
            ActionKind::CancelRedeem => "cancelRedeem",
            ActionKind::Collect => "collect",
            ActionKind::ApprovePoolCurrency => "approvePoolCurrency",
            ActionKind::ApproveTrancheToken => "approveTrancheToken",
        }
    }

    /// Kinds that change the outstanding order and are refused while the pool
    /// is computing epoch results. `Collect` settles an already executed order
    /// and is exempt.
    pub fn mutates_order(&self) -> bool {
        matches!(
            self,
            ActionKind::Invest
                | ActionKind::Redeem
                | ActionKind::CancelInvest
                | ActionKind::CancelRedeem
        )
    }

    pub fn is_approval(&self) -> bool {
        matches!(
            self,
            ActionKind::ApprovePoolCurrency | ActionKind::ApproveTrancheToken
        )
    }

    pub fn is_cancel(&self) -> bool {
        matches!(self, ActionKind::CancelInvest | ActionKind::CancelRedeem)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a dispatched action.
///
/// ```text
/// creating ──► unconfirmed ──► pending ──► succeeded
///    │              │             │
///    └──────────────┴─────────────┴──────► failed
/// ```
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// Being resolved, signed, and handed to the backend.
    Creating,
    /// Backend returned a transaction handle; not yet seen in a block.
    Unconfirmed,
    /// Seen on chain; not final, or its effect has not reached the companion chain.
    Pending,
    /// **Terminal.**
    Succeeded,
    /// **Terminal.**
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActionStatus::Succeeded | ActionStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Creating => "creating",
            ActionStatus::Unconfirmed => "unconfirmed",
            ActionStatus::Pending => "pending",
            ActionStatus::Succeeded => "succeeded",
            ActionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Identifiers / handles
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque transaction reference returned by a backend submitter
/// (tx hash on EVM chains, extrinsic hash on the native chain).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionHandle(pub String);

impl TransactionHandle {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// BridgingNote
// ---------------------------------------------------------------------------

/// Informational status for an action that is final on its source chain but
/// whose effect is not yet visible on the companion chain.
///
/// Never an error and never timed out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgingNote {
    pub action: ActionKind,
    pub message: String,
}

impl BridgingNote {
    pub fn awaiting_companion(action: ActionKind) -> Self {
        let message = match action {
            ActionKind::CancelInvest => {
                "Cancellation confirmed; waiting for it to be bridged. \
                 The pending investment stays visible until then."
            }
            ActionKind::CancelRedeem => {
                "Cancellation confirmed; waiting for it to be bridged. \
                 The pending redemption stays visible until then."
            }
            _ => "Transaction confirmed; waiting for it to be bridged.",
        };
        Self {
            action,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for BridgingNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why an action ended in `Failed`.
///
/// Submission failures and on-chain reverts are kept apart for diagnostics;
/// callers handle all of them the same way (re-dispatch is allowed).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FailureReason {
    /// Wallet refused to sign or the node rejected the call.
    Submission { message: String },
    /// Wallet refused to sign the permit message.
    PermitSigning { message: String },
    /// Mined but reverted.
    Reverted { message: String },
    /// Never observed on chain within the confirmation window.
    NotObserved { waited_secs: u64 },
    /// Not submitted: the pool no longer accepted the order when it was
    /// about to go out.
    Refused { message: String },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Submission { message } => {
                write!(f, "Transaction could not be submitted: {message}")
            }
            FailureReason::PermitSigning { message } => {
                write!(f, "Permit could not be signed: {message}")
            }
            FailureReason::Reverted { message } => {
                write!(f, "Transaction failed on chain: {message}")
            }
            FailureReason::NotObserved { waited_secs } => write!(
                f,
                "Transaction was not seen on chain after {waited_secs}s; check your wallet before retrying"
            ),
            FailureReason::Refused { message } => write!(f, "Order was not submitted: {message}"),
        }
    }
}

// ---------------------------------------------------------------------------
// PendingAction
// ---------------------------------------------------------------------------

/// The single in-flight (or last terminal) action of one context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    pub id: ActionId,
    pub kind: ActionKind,
    pub status: ActionStatus,
    /// Requested amount; for approvals, the amount of the order they unblock.
    pub amount: Option<Decimal>,
    pub handle: Option<TransactionHandle>,
    /// Submission carries a signed permit instead of a prior approval.
    pub permit: bool,
    /// Order kind an approval re-dispatches once it succeeds.
    pub resume: Option<ActionKind>,
    pub bridging: Option<BridgingNote>,
    pub failure: Option<FailureReason>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingAction {
    pub fn new(kind: ActionKind, amount: Option<Decimal>) -> Self {
        let now = Utc::now();
        Self {
            id: ActionId::new_v4(),
            kind,
            status: ActionStatus::Creating,
            amount,
            handle: None,
            permit: false,
            resume: None,
            bridging: None,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.status.is_in_flight()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_is_not_an_order_mutation() {
        assert!(ActionKind::Invest.mutates_order());
        assert!(ActionKind::CancelRedeem.mutates_order());
        assert!(!ActionKind::Collect.mutates_order());
        assert!(!ActionKind::ApprovePoolCurrency.mutates_order());
    }

    #[test]
    fn terminal_states() {
        assert!(ActionStatus::Succeeded.is_terminal());
        assert!(ActionStatus::Failed.is_terminal());
        assert!(ActionStatus::Pending.is_in_flight());
        assert!(ActionStatus::Creating.is_in_flight());
    }

    #[test]
    fn new_action_starts_creating() {
        let a = PendingAction::new(ActionKind::Invest, Some(Decimal::from(10)));
        assert_eq!(a.status, ActionStatus::Creating);
        assert!(a.handle.is_none());
        assert!(a.is_in_flight());
    }

    #[test]
    fn failure_messages_do_not_leak_state_names() {
        let msg = FailureReason::NotObserved { waited_secs: 180 }.to_string();
        assert!(msg.contains("180s"));
        assert!(!msg.contains("NotObserved"));
    }
}

//! tpo-execution
//!
//! Order-reconciliation core shared by all three backends.
//!
//! - `policy`: per-backend capability table
//! - `approval`: allowance / permit decision for an order
//! - `calls`: logical action -> backend call resolution (exact raw units)
//! - `router`: per-context Action Router state machine and tracking task
//! - `aggregator`: snapshot + pending action + approval -> `OrderState`
//! - `validation`: amount checks run before anything is dispatched
//!
//! Backend specifics enter only through `TransactionSubmitter` and
//! `PermitSigner`; everything else is backend-agnostic.

mod aggregator;
mod approval;
mod calls;
mod policy;
mod rejection;
mod router;
mod submitter;
mod validation;

pub use aggregator::{OrderState, OrderStateAggregator};
pub use approval::{
    approval_kind_for, required as approval_required, ApprovalReason, ApprovalRequirement,
};
pub use calls::{ActionRequest, BackendCall, BridgeCall, LegacyCall, NativeCall, ResolveOptions};
pub use policy::{BackendPolicy, CollectRequirement};
pub use rejection::DispatchRejection;
pub use router::{ActionObserver, ActionRouter, PollSettings, RouterSettings};
pub use submitter::{
    Permit, PermitRequest, PermitSigner, SubmitError, TransactionSubmitter, TxStatus,
};
pub use validation::ValidationError;

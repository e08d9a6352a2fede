//! tpo-schemas
//!
//! Shared data model for the tranche-pool order core.
//!
//! - Context identity: pool / tranche / investor address
//! - `BackendKind`: the three chain families an order can live on
//! - `OrderSnapshot`: backend-agnostic view of one investor's position
//! - `PendingAction`: the single in-flight operation per context
//!
//! Pure data. No IO, no async, no backend knowledge.

mod action;
mod ids;
mod snapshot;
mod units;

pub use action::{
    ActionId, ActionKind, ActionStatus, BridgingNote, FailureReason, PendingAction,
    TransactionHandle,
};
pub use ids::{Address, BackendKind, ContextKey, PoolId, TrancheId, WalletNetwork};
pub use snapshot::{
    Allowances, Balances, CollectType, Collectable, Loadable, OrderPosition, OrderSnapshot,
    PoolMetadata, PoolStatus,
};
pub use units::{from_raw_units, to_raw_units, Units, UnitsError};

/// Re-exported so downstream crates name one decimal type.
pub use rust_decimal::Decimal;

//! tpo-snapshot
//!
//! Snapshot Readers: one per backend family, each turning its data source's
//! raw wire structs into the shared [`OrderSnapshot`].
//!
//! # Design constraints
//! - Read-only. A reader never mutates its data source and may be called
//!   repeatedly; two reads with no intervening chain activity are identical.
//! - A section whose source has not answered yet is `Loadable::Loading`,
//!   never an error.
//! - Amounts arrive as integer strings in the token's smallest unit and are
//!   converted exactly with the backend's decimals.

use async_trait::async_trait;

use tpo_schemas::{
    Address, BackendKind, ContextKey, Loadable, OrderSnapshot, PoolId, PoolMetadata, TrancheId,
};

mod amount;
pub mod bridge;
mod error;
pub mod legacy;
pub mod native;

pub use bridge::{
    cancel_bridged, BridgeDataSource, BridgeSnapshotReader, BridgedEvent, BridgedEventKind,
    RawBridgeBalances, RawBridgeOrder, RawBridgePool, RawBridgePosition,
};
pub use error::{SnapshotError, SourceError};
pub use legacy::{
    LegacyDataSource, LegacySnapshotReader, RawDisbursement, RawLegacyBalances, RawLegacyPool,
    RawLegacyPosition,
};
pub use native::{
    NativeDataSource, NativeSnapshotReader, RawEpochStatus, RawNativeBalances, RawNativeOrder,
    RawNativePool, RawNativePosition,
};

/// Backend-agnostic reader contract consumed by the order context.
///
/// Implementations must be `Send + Sync` so one reader can be shared by the
/// context and any task that refreshes state.
#[async_trait]
pub trait SnapshotReader: Send + Sync {
    fn backend(&self) -> BackendKind;

    async fn read(&self, key: &ContextKey) -> Result<OrderSnapshot, SnapshotError>;
}

/// Pool configuration and onboarding lookups, consumed read-only.
#[async_trait]
pub trait PoolMetadataProvider: Send + Sync {
    async fn metadata(
        &self,
        pool: &PoolId,
        tranche: &TrancheId,
        investor: &Address,
    ) -> Result<Loadable<PoolMetadata>, SourceError>;
}

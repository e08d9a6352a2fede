//! Native chain backend: direct node queries against the pool module.
//!
//! The node reports the epoch as a phase enum, the token price as an 18
//! decimal fixed-point integer, and amounts in the pool currency's decimals.
//! Tranche tokens share the pool currency's decimals on this chain. There is
//! no allowance concept.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use tpo_schemas::{
    Allowances, BackendKind, Balances, Collectable, ContextKey, Loadable, OrderPosition,
    OrderSnapshot, PoolStatus, Units,
};

use crate::amount::parse_amount;
use crate::{SnapshotError, SnapshotReader, SourceError};

const PRICE_DECIMALS: u32 = 18;
const NATIVE_DECIMALS: u32 = 18;

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

/// Pool epoch phase as reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEpochStatus {
    Ongoing,
    SubmissionPeriod,
    InChallengePeriod,
    Executing,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNativePool {
    pub epoch: RawEpochStatus,
    /// 18-decimal fixed point.
    pub token_price: String,
    pub currency_symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNativeBalances {
    /// Chain fee token, 18 decimals.
    pub native: String,
    pub currency: String,
    pub tranche_tokens: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawNativeOrder {
    pub invest: String,
    pub redeem: String,
    /// Tranche tokens from an executed invest order.
    pub payout_token_amount: String,
    /// Pool currency from an executed redeem order.
    pub payout_currency_amount: String,
    pub has_invested_before: bool,
}

/// Everything the node returns for one investor in one tranche.
#[derive(Debug, Clone, Deserialize)]
pub struct RawNativePosition {
    pub currency_decimals: u32,
    pub pool: Loadable<RawNativePool>,
    pub balances: Loadable<RawNativeBalances>,
    pub order: Loadable<RawNativeOrder>,
}

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

#[async_trait]
pub trait NativeDataSource: Send + Sync {
    async fn query(&self, key: &ContextKey) -> Result<RawNativePosition, SourceError>;
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

impl RawEpochStatus {
    /// Every phase except `Ongoing` means results are being computed.
    pub fn is_busy(self) -> bool {
        !matches!(self, RawEpochStatus::Ongoing)
    }
}

/// Pure conversion of a raw native position into the shared snapshot.
pub fn normalize(raw: RawNativePosition) -> Result<OrderSnapshot, SnapshotError> {
    let decimals = raw.currency_decimals;
    let units = Units::new(decimals, decimals);

    let pool = raw.pool.try_map(|p| -> Result<PoolStatus, SnapshotError> {
        Ok(PoolStatus {
            busy: p.epoch.is_busy(),
            token_price: parse_amount("token_price", &p.token_price, PRICE_DECIMALS)?,
            units,
            currency_symbol: p.currency_symbol,
            supports_permit: false,
        })
    })?;

    let balances = raw.balances.try_map(|b| -> Result<Balances, SnapshotError> {
        Ok(Balances {
            native: parse_amount("native", &b.native, NATIVE_DECIMALS)?,
            pool_currency: parse_amount("currency", &b.currency, decimals)?,
            tranche_token: parse_amount("tranche_tokens", &b.tranche_tokens, decimals)?,
            allowances: Allowances::default(),
        })
    })?;

    let position = raw.order.try_map(|o| -> Result<OrderPosition, SnapshotError> {
        let payout_token = parse_amount("payout_token_amount", &o.payout_token_amount, decimals)?;
        let payout_currency =
            parse_amount("payout_currency_amount", &o.payout_currency_amount, decimals)?;
        Ok(OrderPosition {
            pending_invest: parse_amount("invest", &o.invest, decimals)?,
            pending_redeem: parse_amount("redeem", &o.redeem, decimals)?,
            collectable: Collectable::from_payouts(payout_token, payout_currency),
            first_investment: !o.has_invested_before,
        })
    })?;

    Ok(OrderSnapshot {
        pool,
        balances,
        position,
    })
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct NativeSnapshotReader {
    source: Arc<dyn NativeDataSource>,
}

impl NativeSnapshotReader {
    pub fn new(source: Arc<dyn NativeDataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SnapshotReader for NativeSnapshotReader {
    fn backend(&self) -> BackendKind {
        BackendKind::Native
    }

    async fn read(&self, key: &ContextKey) -> Result<OrderSnapshot, SnapshotError> {
        let raw = self.source.query(key).await?;
        let snap = normalize(raw)?;
        debug!(context = %key, complete = snap.is_complete(), "native snapshot read");
        Ok(snap)
    }
}

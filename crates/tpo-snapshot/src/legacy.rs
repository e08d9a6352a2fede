//! Legacy EVM lending-pool backend.
//!
//! Orders live in a per-tranche operator contract. Outstanding orders and
//! executed proceeds are both read from one `calcDisburse` struct at 18
//! decimals; the token price is a 27-decimal "ray".

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use tpo_schemas::{
    Allowances, BackendKind, Balances, Collectable, ContextKey, Loadable, OrderPosition,
    OrderSnapshot, PoolStatus, Units,
};

use crate::amount::{parse_allowance, parse_amount, parse_price};
use crate::{SnapshotError, SnapshotReader, SourceError};

const AMOUNT_DECIMALS: u32 = 18;
const RAY_DECIMALS: u32 = 27;

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawLegacyPool {
    /// Coordinator is computing an epoch solution.
    pub epoch_computing: bool,
    /// 27-decimal ray.
    pub token_price: String,
    pub currency_symbol: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLegacyBalances {
    pub eth: String,
    pub currency: String,
    pub token: String,
    pub currency_allowance: String,
    pub token_allowance: String,
}

/// Result of `calcDisburse(user)`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDisbursement {
    pub payout_currency_amount: String,
    pub payout_token_amount: String,
    /// Part of the supply order not yet executed.
    pub remaining_supply_currency: String,
    /// Part of the redeem order not yet executed.
    pub remaining_redeem_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLegacyPosition {
    pub pool: Loadable<RawLegacyPool>,
    pub balances: Loadable<RawLegacyBalances>,
    pub disbursement: Loadable<RawDisbursement>,
    pub has_invested: bool,
}

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

#[async_trait]
pub trait LegacyDataSource: Send + Sync {
    async fn query(&self, key: &ContextKey) -> Result<RawLegacyPosition, SourceError>;
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

pub fn normalize(raw: RawLegacyPosition) -> Result<OrderSnapshot, SnapshotError> {
    let units = Units::new(AMOUNT_DECIMALS, AMOUNT_DECIMALS);

    let pool = raw.pool.try_map(|p| -> Result<PoolStatus, SnapshotError> {
        Ok(PoolStatus {
            busy: p.epoch_computing,
            token_price: parse_price("token_price", &p.token_price, RAY_DECIMALS)?,
            units,
            currency_symbol: p.currency_symbol,
            supports_permit: false,
        })
    })?;

    let balances = raw.balances.try_map(|b| -> Result<Balances, SnapshotError> {
        Ok(Balances {
            native: parse_amount("eth", &b.eth, AMOUNT_DECIMALS)?,
            pool_currency: parse_amount("currency", &b.currency, AMOUNT_DECIMALS)?,
            tranche_token: parse_amount("token", &b.token, AMOUNT_DECIMALS)?,
            allowances: Allowances {
                pool_currency: Some(parse_allowance(
                    "currency_allowance",
                    &b.currency_allowance,
                    AMOUNT_DECIMALS,
                )?),
                tranche_token: Some(parse_allowance(
                    "token_allowance",
                    &b.token_allowance,
                    AMOUNT_DECIMALS,
                )?),
            },
        })
    })?;

    let has_invested = raw.has_invested;
    let position = raw
        .disbursement
        .try_map(|d| -> Result<OrderPosition, SnapshotError> {
            let payout_token =
                parse_amount("payout_token_amount", &d.payout_token_amount, AMOUNT_DECIMALS)?;
            let payout_currency = parse_amount(
                "payout_currency_amount",
                &d.payout_currency_amount,
                AMOUNT_DECIMALS,
            )?;
            Ok(OrderPosition {
                pending_invest: parse_amount(
                    "remaining_supply_currency",
                    &d.remaining_supply_currency,
                    AMOUNT_DECIMALS,
                )?,
                pending_redeem: parse_amount(
                    "remaining_redeem_token",
                    &d.remaining_redeem_token,
                    AMOUNT_DECIMALS,
                )?,
                collectable: Collectable::from_payouts(payout_token, payout_currency),
                first_investment: !has_invested,
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
pub struct LegacySnapshotReader {
    source: Arc<dyn LegacyDataSource>,
}

impl LegacySnapshotReader {
    pub fn new(source: Arc<dyn LegacyDataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SnapshotReader for LegacySnapshotReader {
    fn backend(&self) -> BackendKind {
        BackendKind::LegacyEvm
    }

    async fn read(&self, key: &ContextKey) -> Result<OrderSnapshot, SnapshotError> {
        let raw = self.source.query(key).await?;
        let snap = normalize(raw)?;
        debug!(context = %key, complete = snap.is_complete(), "legacy snapshot read");
        Ok(snap)
    }
}

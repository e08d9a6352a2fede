//! EVM liquidity-pool bridge backend.
//!
//! State comes from two places: view calls on the liquidity-pool contract
//! (balances, allowances, pending requests, claimable amounts) and events
//! bridged back from the native chain. A cancellation is only effective once
//! its bridged event is observed; until then the view call keeps reporting
//! the old pending request.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use tpo_schemas::{
    Allowances, BackendKind, Balances, Collectable, ContextKey, Decimal, Loadable, OrderPosition,
    OrderSnapshot, PoolStatus, Units,
};

use crate::amount::{parse_allowance, parse_amount};
use crate::{SnapshotError, SnapshotReader, SourceError};

const PRICE_DECIMALS: u32 = 18;
const NATIVE_DECIMALS: u32 = 18;

// ---------------------------------------------------------------------------
// Raw wire-level structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct RawBridgePool {
    /// Native chain is executing the epoch; requests would not be processed.
    pub epoch_executing: bool,
    /// 18-decimal fixed point, currency per share.
    pub token_price: String,
    pub currency_symbol: String,
    /// Pool currency implements EIP-2612 `permit`.
    pub supports_permit: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBridgeBalances {
    pub native: String,
    pub currency: String,
    pub tranche_tokens: String,
    /// Currency allowance granted to the liquidity-pool contract.
    pub currency_allowance: String,
    /// Share allowance granted to the liquidity-pool contract.
    pub tranche_token_allowance: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBridgeOrder {
    pub pending_deposit_request: String,
    pub pending_redeem_request: String,
    /// Shares claimable from an executed deposit.
    pub max_mint: String,
    /// Currency claimable from an executed redemption.
    pub max_withdraw: String,
    pub has_deposited_before: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum BridgedEventKind {
    DepositRequest,
    RedeemRequest,
    CancelDepositRequest,
    CancelRedeemRequest,
}

/// One event observed for this investor, ordered by `sequence`
/// (block number and log index folded into one monotonic value).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BridgedEvent {
    pub kind: BridgedEventKind,
    pub sequence: u64,
    #[serde(default)]
    pub tx: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawBridgePosition {
    pub currency_decimals: u32,
    pub token_decimals: u32,
    pub pool: Loadable<RawBridgePool>,
    pub balances: Loadable<RawBridgeBalances>,
    pub order: Loadable<RawBridgeOrder>,
    pub events: Loadable<Vec<BridgedEvent>>,
}

// ---------------------------------------------------------------------------
// Data source
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BridgeDataSource: Send + Sync {
    async fn query(&self, key: &ContextKey) -> Result<RawBridgePosition, SourceError>;
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

fn latest(events: &[BridgedEvent], kind: BridgedEventKind) -> Option<u64> {
    events
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.sequence)
        .max()
}

/// A cancel counts once its bridged event is newer than the request it cancels.
///
/// Shared with anything that replays bridged events into balances.
pub fn cancel_bridged(
    events: &[BridgedEvent],
    request: BridgedEventKind,
    cancel: BridgedEventKind,
) -> bool {
    match (latest(events, request), latest(events, cancel)) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(req), Some(c)) => c > req,
    }
}

/// Pure conversion of a raw bridge position into the shared snapshot.
///
/// The position section needs both the view call and the event list; it stays
/// `Loading` until both have answered.
pub fn normalize(raw: RawBridgePosition) -> Result<OrderSnapshot, SnapshotError> {
    let units = Units::new(raw.currency_decimals, raw.token_decimals);
    let (cd, td) = (raw.currency_decimals, raw.token_decimals);

    let pool = raw.pool.try_map(|p| -> Result<PoolStatus, SnapshotError> {
        Ok(PoolStatus {
            busy: p.epoch_executing,
            token_price: parse_amount("token_price", &p.token_price, PRICE_DECIMALS)?,
            units,
            currency_symbol: p.currency_symbol,
            supports_permit: p.supports_permit,
        })
    })?;

    let balances = raw.balances.try_map(|b| -> Result<Balances, SnapshotError> {
        Ok(Balances {
            native: parse_amount("native", &b.native, NATIVE_DECIMALS)?,
            pool_currency: parse_amount("currency", &b.currency, cd)?,
            tranche_token: parse_amount("tranche_tokens", &b.tranche_tokens, td)?,
            allowances: Allowances {
                pool_currency: Some(parse_allowance(
                    "currency_allowance",
                    &b.currency_allowance,
                    cd,
                )?),
                tranche_token: Some(parse_allowance(
                    "tranche_token_allowance",
                    &b.tranche_token_allowance,
                    td,
                )?),
            },
        })
    })?;

    let position = match (raw.order, raw.events) {
        (Loadable::Ready(o), Loadable::Ready(events)) => {
            let mut pending_invest =
                parse_amount("pending_deposit_request", &o.pending_deposit_request, cd)?;
            let mut pending_redeem =
                parse_amount("pending_redeem_request", &o.pending_redeem_request, td)?;

            if cancel_bridged(
                &events,
                BridgedEventKind::DepositRequest,
                BridgedEventKind::CancelDepositRequest,
            ) {
                pending_invest = Decimal::ZERO;
            }
            if cancel_bridged(
                &events,
                BridgedEventKind::RedeemRequest,
                BridgedEventKind::CancelRedeemRequest,
            ) {
                pending_redeem = Decimal::ZERO;
            }

            let claimable_shares = parse_amount("max_mint", &o.max_mint, td)?;
            let claimable_currency = parse_amount("max_withdraw", &o.max_withdraw, cd)?;

            Loadable::Ready(OrderPosition {
                pending_invest,
                pending_redeem,
                collectable: Collectable::from_payouts(claimable_shares, claimable_currency),
                first_investment: !o.has_deposited_before,
            })
        }
        _ => Loadable::Loading,
    };

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
pub struct BridgeSnapshotReader {
    source: Arc<dyn BridgeDataSource>,
}

impl BridgeSnapshotReader {
    pub fn new(source: Arc<dyn BridgeDataSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl SnapshotReader for BridgeSnapshotReader {
    fn backend(&self) -> BackendKind {
        BackendKind::EvmBridge
    }

    async fn read(&self, key: &ContextKey) -> Result<OrderSnapshot, SnapshotError> {
        let raw = self.source.query(key).await?;
        let snap = normalize(raw)?;
        debug!(context = %key, complete = snap.is_complete(), "bridge snapshot read");
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use tpo_schemas::CollectType;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ev(kind: BridgedEventKind, sequence: u64) -> BridgedEvent {
        BridgedEvent {
            kind,
            sequence,
            tx: None,
        }
    }

    fn raw(events: Vec<BridgedEvent>) -> RawBridgePosition {
        RawBridgePosition {
            currency_decimals: 6,
            token_decimals: 18,
            pool: Loadable::Ready(RawBridgePool {
                epoch_executing: false,
                token_price: "1000000000000000000".into(),
                currency_symbol: "USDC".into(),
                supports_permit: true,
            }),
            balances: Loadable::Ready(RawBridgeBalances {
                native: "0".into(),
                currency: "1000000000".into(),
                tranche_tokens: "5000000000000000000".into(),
                currency_allowance: "0".into(),
                tranche_token_allowance: "0".into(),
            }),
            order: Loadable::Ready(RawBridgeOrder {
                pending_deposit_request: "200000000".into(),
                pending_redeem_request: "0".into(),
                max_mint: "0".into(),
                max_withdraw: "0".into(),
                has_deposited_before: true,
            }),
            events: Loadable::Ready(events),
        }
    }

    fn pending_invest(snap: &OrderSnapshot) -> Decimal {
        snap.position.as_ready().unwrap().pending_invest
    }

    #[test]
    fn pending_request_stays_until_cancel_is_bridged() {
        let snap = normalize(raw(vec![ev(BridgedEventKind::DepositRequest, 10)])).unwrap();
        assert_eq!(pending_invest(&snap), dec("200"));

        let snap = normalize(raw(vec![
            ev(BridgedEventKind::DepositRequest, 10),
            ev(BridgedEventKind::CancelDepositRequest, 11),
        ]))
        .unwrap();
        assert_eq!(pending_invest(&snap), Decimal::ZERO);
    }

    #[test]
    fn newer_request_supersedes_older_cancel() {
        let snap = normalize(raw(vec![
            ev(BridgedEventKind::DepositRequest, 10),
            ev(BridgedEventKind::CancelDepositRequest, 11),
            ev(BridgedEventKind::DepositRequest, 12),
        ]))
        .unwrap();
        assert_eq!(pending_invest(&snap), dec("200"));
    }

    #[test]
    fn position_waits_for_events() {
        let mut r = raw(vec![]);
        r.events = Loadable::Loading;
        let snap = normalize(r).unwrap();
        assert_eq!(snap.position, Loadable::Loading);
        assert!(snap.balances.is_ready());
    }

    #[test]
    fn allowances_and_claims_use_each_token_decimals() {
        let mut r = raw(vec![]);
        if let Loadable::Ready(o) = &mut r.order {
            o.max_mint = "1500000000000000000".into();
        }
        let snap = normalize(r).unwrap();
        let bal = snap.balances.as_ready().unwrap();
        assert_eq!(bal.allowances.pool_currency, Some(Decimal::ZERO));
        assert_eq!(bal.tranche_token, dec("5"));
        let pos = snap.position.as_ready().unwrap();
        assert_eq!(pos.collectable.collect_type, CollectType::Invest);
        assert_eq!(pos.collectable.amount, dec("1.5"));
        assert!(snap.pool.as_ready().unwrap().supports_permit);
    }

    #[test]
    fn cancel_counts_only_after_its_request() {
        use BridgedEventKind::{CancelDepositRequest, DepositRequest};
        let cancelled = |events: &[BridgedEvent]| {
            cancel_bridged(events, DepositRequest, CancelDepositRequest)
        };
        assert!(!cancelled(&[]));
        assert!(!cancelled(&[ev(DepositRequest, 1)]));
        assert!(cancelled(&[ev(DepositRequest, 1), ev(CancelDepositRequest, 2)]));
        // A new request after the cancel reopens the order.
        assert!(!cancelled(&[
            ev(DepositRequest, 1),
            ev(CancelDepositRequest, 2),
            ev(DepositRequest, 3),
        ]));
    }
}

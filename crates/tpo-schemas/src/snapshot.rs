use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::units::Units;

// ---------------------------------------------------------------------------
// Loadable
// ---------------------------------------------------------------------------

/// Loading sentinel: a section whose data source has not answered yet.
///
/// Readers return `Loading` instead of failing so callers can render what is
/// already known and read again later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Loadable<T> {
    Loading,
    Ready(T),
}

impl<T> Loadable<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Loadable::Ready(_))
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            Loadable::Ready(v) => Some(v),
            Loadable::Loading => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loadable<U> {
        match self {
            Loadable::Ready(v) => Loadable::Ready(f(v)),
            Loadable::Loading => Loadable::Loading,
        }
    }

    /// Like `map`, for conversions that can fail.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Loadable<U>, E> {
        match self {
            Loadable::Ready(v) => f(v).map(Loadable::Ready),
            Loadable::Loading => Ok(Loadable::Loading),
        }
    }
}

impl<T> From<Option<T>> for Loadable<T> {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Loadable::Ready(v),
            None => Loadable::Loading,
        }
    }
}

// ---------------------------------------------------------------------------
// Collectable
// ---------------------------------------------------------------------------

/// Which direction an executed-but-uncollected order came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectType {
    /// Executed invest order: tranche tokens are waiting.
    Invest,
    /// Executed redeem order: pool currency is waiting.
    Redeem,
    None,
}

/// Proceeds of an executed order not yet moved into the investor's balance.
///
/// `amount` is in tranche tokens for `Invest` and pool currency for `Redeem`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collectable {
    pub amount: Decimal,
    pub collect_type: CollectType,
}

impl Collectable {
    pub fn none() -> Self {
        Self {
            amount: Decimal::ZERO,
            collect_type: CollectType::None,
        }
    }

    /// Single precedence rule for every backend: invest payouts win when both
    /// directions report a non-zero amount.
    pub fn from_payouts(payout_token: Decimal, payout_currency: Decimal) -> Self {
        if payout_token > Decimal::ZERO {
            Self {
                amount: payout_token,
                collect_type: CollectType::Invest,
            }
        } else if payout_currency > Decimal::ZERO {
            Self {
                amount: payout_currency,
                collect_type: CollectType::Redeem,
            }
        } else {
            Self::none()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.collect_type == CollectType::None
    }
}

// ---------------------------------------------------------------------------
// Snapshot sections
// ---------------------------------------------------------------------------

/// Pool-level status for the context's tranche.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Pool is computing epoch results; order mutations are refused.
    pub busy: bool,
    /// Pool currency per tranche token.
    pub token_price: Decimal,
    pub units: Units,
    pub currency_symbol: String,
    /// Pool currency accepts an off-chain signed permit instead of `approve`.
    pub supports_permit: bool,
}

/// Spending allowances granted to the order contracts.
///
/// `None` means the backend has no allowance concept (approval never needed).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowances {
    pub pool_currency: Option<Decimal>,
    pub tranche_token: Option<Decimal>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub native: Decimal,
    pub pool_currency: Decimal,
    pub tranche_token: Decimal,
    pub allowances: Allowances,
}

/// Outstanding orders and uncollected proceeds.
///
/// `pending_invest` and `pending_redeem` are normally exclusive but both may
/// be non-zero while a position changes direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPosition {
    pub pending_invest: Decimal,
    pub pending_redeem: Decimal,
    pub collectable: Collectable,
    /// No order has ever been placed by this investor in this tranche.
    pub first_investment: bool,
}

// ---------------------------------------------------------------------------
// OrderSnapshot
// ---------------------------------------------------------------------------

/// Backend-agnostic view of one investor's position in one pool/tranche.
///
/// Re-derived on every read; each section loads independently.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub pool: Loadable<PoolStatus>,
    pub balances: Loadable<Balances>,
    pub position: Loadable<OrderPosition>,
}

impl OrderSnapshot {
    pub fn loading() -> Self {
        Self {
            pool: Loadable::Loading,
            balances: Loadable::Loading,
            position: Loadable::Loading,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.pool.is_ready() && self.balances.is_ready() && self.position.is_ready()
    }

    /// Busy flag; a pool that has not loaded yet is treated as busy.
    pub fn pool_busy(&self) -> bool {
        self.pool.as_ready().map(|p| p.busy).unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// PoolMetadata
// ---------------------------------------------------------------------------

/// Read-only pool configuration supplied by the metadata provider.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMetadata {
    /// Applies to the very first order of a new investor only.
    pub min_initial_investment: Option<Decimal>,
    /// Investor passed onboarding for this tranche.
    pub investor_eligible: bool,
}

//! Raw on-chain integer amounts <-> `Decimal`.
//!
//! Chains report amounts as integers in the token's smallest unit. Every
//! conversion here is exact: a decimal with more fractional digits than the
//! token supports is refused rather than rounded.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places of the two denominations an order touches.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub currency_decimals: u32,
    pub token_decimals: u32,
}

impl Units {
    pub fn new(currency_decimals: u32, token_decimals: u32) -> Self {
        Self {
            currency_decimals,
            token_decimals,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitsError {
    /// Negative amounts have no on-chain representation.
    Negative(Decimal),
    /// More fractional digits than the token has decimals.
    TooPrecise { amount: Decimal, decimals: u32 },
    /// Value does not fit the target representation.
    Overflow { raw: String, decimals: u32 },
}

impl fmt::Display for UnitsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitsError::Negative(d) => write!(f, "amount {d} is negative"),
            UnitsError::TooPrecise { amount, decimals } => write!(
                f,
                "amount {amount} has more than {decimals} decimal places"
            ),
            UnitsError::Overflow { raw, decimals } => {
                write!(f, "raw amount {raw} at {decimals} decimals is out of range")
            }
        }
    }
}

impl std::error::Error for UnitsError {}

/// Convert a raw integer amount into a normalized `Decimal`.
pub fn from_raw_units(raw: u128, decimals: u32) -> Result<Decimal, UnitsError> {
    let overflow = || UnitsError::Overflow {
        raw: raw.to_string(),
        decimals,
    };
    let signed = i128::try_from(raw).map_err(|_| overflow())?;
    Decimal::try_from_i128_with_scale(signed, decimals)
        .map(|d| d.normalize())
        .map_err(|_| overflow())
}

/// Convert a `Decimal` into the raw integer amount a contract call expects.
pub fn to_raw_units(amount: Decimal, decimals: u32) -> Result<u128, UnitsError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(UnitsError::Negative(amount));
    }
    let normalized = amount.normalize();
    let scale = normalized.scale();
    if scale > decimals {
        return Err(UnitsError::TooPrecise { amount, decimals });
    }
    let overflow = || UnitsError::Overflow {
        raw: amount.to_string(),
        decimals,
    };
    let mantissa = u128::try_from(normalized.mantissa()).map_err(|_| overflow())?;
    let factor = 10u128.checked_pow(decimals - scale).ok_or_else(overflow)?;
    mantissa.checked_mul(factor).ok_or_else(overflow)
}

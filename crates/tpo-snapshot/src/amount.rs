//! Raw amount strings as chains report them.
//!
//! Accepts base-10 integers (`"1500000"`) and `0x`-prefixed hex (`"0x16e360"`),
//! the two encodings node RPCs and indexers use for `uint256` values.

use std::num::IntErrorKind;

use tpo_schemas::{from_raw_units, Decimal, UnitsError};

use crate::SnapshotError;

enum RawInt {
    Value(u128),
    /// Valid integer wider than 128 bits.
    TooWide,
}

fn parse_int(s: &str) -> Result<RawInt, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => s.parse::<u128>(),
    };
    match parsed {
        Ok(v) => Ok(RawInt::Value(v)),
        Err(e) if *e.kind() == IntErrorKind::PosOverflow => Ok(RawInt::TooWide),
        Err(e) => Err(e.to_string()),
    }
}

fn invalid(field: &'static str, raw: &str, reason: String) -> SnapshotError {
    SnapshotError::InvalidAmount {
        field,
        raw: raw.to_string(),
        reason,
    }
}

pub(crate) fn parse_amount(
    field: &'static str,
    raw: &str,
    decimals: u32,
) -> Result<Decimal, SnapshotError> {
    match parse_int(raw).map_err(|e| invalid(field, raw, e))? {
        RawInt::Value(v) => {
            from_raw_units(v, decimals).map_err(|e| invalid(field, raw, e.to_string()))
        }
        RawInt::TooWide => Err(invalid(field, raw, "wider than 128 bits".to_string())),
    }
}

/// Decimals a price keeps once parsed. Rays carry 27; at that scale a price
/// above roughly 79.2 no longer fits `Decimal`'s 96-bit mantissa, so the raw
/// value is truncated to 18 decimals first.
const PRICE_DECIMALS: u32 = 18;

pub(crate) fn parse_price(
    field: &'static str,
    raw: &str,
    decimals: u32,
) -> Result<Decimal, SnapshotError> {
    if decimals <= PRICE_DECIMALS {
        return parse_amount(field, raw, decimals);
    }
    match parse_int(raw).map_err(|e| invalid(field, raw, e))? {
        RawInt::Value(v) => {
            let scaled = 10u128
                .checked_pow(decimals - PRICE_DECIMALS)
                .map_or(0, |divisor| v / divisor);
            from_raw_units(scaled, PRICE_DECIMALS).map_err(|e| invalid(field, raw, e.to_string()))
        }
        RawInt::TooWide => Err(invalid(field, raw, "wider than 128 bits".to_string())),
    }
}

/// Allowances are often the maximum `uint` ("unlimited"), which exceeds what
/// a `Decimal` can hold; those saturate at `Decimal::MAX`.
pub(crate) fn parse_allowance(
    field: &'static str,
    raw: &str,
    decimals: u32,
) -> Result<Decimal, SnapshotError> {
    match parse_int(raw).map_err(|e| invalid(field, raw, e))? {
        RawInt::Value(v) => match from_raw_units(v, decimals) {
            Ok(d) => Ok(d),
            Err(UnitsError::Overflow { .. }) => Ok(Decimal::MAX),
            Err(e) => Err(invalid(field, raw, e.to_string())),
        },
        RawInt::TooWide => Ok(Decimal::MAX),
    }
}

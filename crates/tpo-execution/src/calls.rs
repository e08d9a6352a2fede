//! Logical action -> backend call resolution.
//!
//! Amounts leave this module as raw integers in the token's smallest unit.
//! Conversion is exact; an amount with more fractional digits than the token
//! has decimals is refused, never rounded.

use serde::Serialize;
use tpo_schemas::{to_raw_units, ActionKind, BackendKind, CollectType, Decimal, Units};

use crate::aggregator::OrderState;
use crate::rejection::DispatchRejection;
use crate::submitter::Permit;

// ---------------------------------------------------------------------------
// ActionRequest
// ---------------------------------------------------------------------------

/// A logical action as a caller requests it.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ActionRequest {
    Invest { amount: Decimal },
    Redeem { amount: Decimal },
    CancelInvest,
    CancelRedeem,
    Collect,
    /// `amount` is the size of the order the approval unblocks.
    ApprovePoolCurrency { amount: Decimal },
    ApproveTrancheToken { amount: Decimal },
}

impl ActionRequest {
    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::Invest { .. } => ActionKind::Invest,
            ActionRequest::Redeem { .. } => ActionKind::Redeem,
            ActionRequest::CancelInvest => ActionKind::CancelInvest,
            ActionRequest::CancelRedeem => ActionKind::CancelRedeem,
            ActionRequest::Collect => ActionKind::Collect,
            ActionRequest::ApprovePoolCurrency { .. } => ActionKind::ApprovePoolCurrency,
            ActionRequest::ApproveTrancheToken { .. } => ActionKind::ApproveTrancheToken,
        }
    }

    pub fn amount(&self) -> Option<Decimal> {
        match self {
            ActionRequest::Invest { amount }
            | ActionRequest::Redeem { amount }
            | ActionRequest::ApprovePoolCurrency { amount }
            | ActionRequest::ApproveTrancheToken { amount } => Some(*amount),
            _ => None,
        }
    }

    /// Rebuild a request from a kind and the amount recorded with it.
    pub(crate) fn from_parts(kind: ActionKind, amount: Option<Decimal>) -> Option<Self> {
        Some(match kind {
            ActionKind::Invest => ActionRequest::Invest { amount: amount? },
            ActionKind::Redeem => ActionRequest::Redeem { amount: amount? },
            ActionKind::CancelInvest => ActionRequest::CancelInvest,
            ActionKind::CancelRedeem => ActionRequest::CancelRedeem,
            ActionKind::Collect => ActionRequest::Collect,
            ActionKind::ApprovePoolCurrency => {
                ActionRequest::ApprovePoolCurrency { amount: amount? }
            }
            ActionKind::ApproveTrancheToken => {
                ActionRequest::ApproveTrancheToken { amount: amount? }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Backend calls
// ---------------------------------------------------------------------------

/// Pool module extrinsics on the native chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum NativeCall {
    /// Sets the outstanding invest order to `amount`; 0 cancels.
    UpdateInvestOrder { amount: u128 },
    UpdateRedeemOrder { amount: u128 },
    CollectInvest,
    CollectRedeem,
}

/// Liquidity-pool contract calls on an EVM chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum BridgeCall {
    RequestDeposit { amount: u128, permit: Option<Permit> },
    RequestRedeem { amount: u128 },
    CancelDepositRequest,
    CancelRedeemRequest,
    /// Claim shares of an executed deposit.
    Mint { shares: u128 },
    /// Claim currency of an executed redemption.
    Withdraw { assets: u128 },
    ApproveCurrency { amount: u128 },
    ApproveTrancheToken { amount: u128 },
}

/// Tranche operator calls on the legacy contracts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LegacyCall {
    /// Sets the supply order to `amount`; 0 cancels.
    SupplyOrder { amount: u128 },
    RedeemOrder { amount: u128 },
    Disburse,
    ApproveCurrency { amount: u128 },
    ApproveToken { amount: u128 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "backend", content = "call", rename_all = "snake_case")]
pub enum BackendCall {
    Native(NativeCall),
    Bridge(BridgeCall),
    Legacy(LegacyCall),
}

impl BackendCall {
    pub fn backend(&self) -> BackendKind {
        match self {
            BackendCall::Native(_) => BackendKind::Native,
            BackendCall::Bridge(_) => BackendKind::EvmBridge,
            BackendCall::Legacy(_) => BackendKind::LegacyEvm,
        }
    }

    /// Raw amount of a deposit request that should carry a permit.
    pub(crate) fn permit_amount(&self) -> Option<u128> {
        match self {
            BackendCall::Bridge(BridgeCall::RequestDeposit { amount, .. }) => Some(*amount),
            _ => None,
        }
    }

    pub(crate) fn attach_permit(&mut self, signed: Permit) {
        if let BackendCall::Bridge(BridgeCall::RequestDeposit { permit, .. }) = self {
            *permit = Some(signed);
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Approve the maximum raw allowance instead of the order amount.
    pub approve_unlimited: bool,
}

/// Inputs resolution reads from an `OrderState`, captured so a resumed order
/// can be resolved again after its approval without a fresh read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ResolveInputs {
    pub units: Units,
    pub pending_invest: Decimal,
    pub pending_redeem: Decimal,
    pub collect_type: CollectType,
    pub collect_amount: Decimal,
}

impl ResolveInputs {
    pub fn from_state(state: &OrderState) -> Option<Self> {
        Some(Self {
            units: state.units?,
            pending_invest: state.pending_invest,
            pending_redeem: state.pending_redeem,
            collect_type: state.collectable.collect_type,
            collect_amount: state.collectable.amount,
        })
    }
}

fn raw(amount: Decimal, decimals: u32) -> Result<u128, DispatchRejection> {
    to_raw_units(amount, decimals).map_err(|e| DispatchRejection::AmountNotRepresentable {
        reason: e.to_string(),
    })
}

fn approval_amount(
    amount: Decimal,
    decimals: u32,
    opts: ResolveOptions,
) -> Result<u128, DispatchRejection> {
    if opts.approve_unlimited {
        Ok(u128::MAX)
    } else {
        raw(amount, decimals)
    }
}

pub(crate) fn resolve(
    backend: BackendKind,
    request: ActionRequest,
    inputs: &ResolveInputs,
    opts: ResolveOptions,
) -> Result<BackendCall, DispatchRejection> {
    let cd = inputs.units.currency_decimals;
    let td = inputs.units.token_decimals;
    let kind = request.kind();

    match request {
        ActionRequest::CancelInvest if inputs.pending_invest <= Decimal::ZERO => {
            return Err(DispatchRejection::NoPendingOrder { kind })
        }
        ActionRequest::CancelRedeem if inputs.pending_redeem <= Decimal::ZERO => {
            return Err(DispatchRejection::NoPendingOrder { kind })
        }
        ActionRequest::Collect if inputs.collect_type == CollectType::None => {
            return Err(DispatchRejection::NothingToCollect)
        }
        _ => {}
    }

    let call = match backend {
        BackendKind::Native => BackendCall::Native(match request {
            ActionRequest::Invest { amount } => NativeCall::UpdateInvestOrder {
                amount: raw(amount, cd)?,
            },
            ActionRequest::Redeem { amount } => NativeCall::UpdateRedeemOrder {
                amount: raw(amount, td)?,
            },
            ActionRequest::CancelInvest => NativeCall::UpdateInvestOrder { amount: 0 },
            ActionRequest::CancelRedeem => NativeCall::UpdateRedeemOrder { amount: 0 },
            ActionRequest::Collect => match inputs.collect_type {
                CollectType::Redeem => NativeCall::CollectRedeem,
                _ => NativeCall::CollectInvest,
            },
            ActionRequest::ApprovePoolCurrency { .. }
            | ActionRequest::ApproveTrancheToken { .. } => {
                return Err(DispatchRejection::ApprovalNotApplicable)
            }
        }),
        BackendKind::EvmBridge => BackendCall::Bridge(match request {
            ActionRequest::Invest { amount } => BridgeCall::RequestDeposit {
                amount: raw(amount, cd)?,
                permit: None,
            },
            ActionRequest::Redeem { amount } => BridgeCall::RequestRedeem {
                amount: raw(amount, td)?,
            },
            ActionRequest::CancelInvest => BridgeCall::CancelDepositRequest,
            ActionRequest::CancelRedeem => BridgeCall::CancelRedeemRequest,
            ActionRequest::Collect => match inputs.collect_type {
                CollectType::Redeem => BridgeCall::Withdraw {
                    assets: raw(inputs.collect_amount, cd)?,
                },
                _ => BridgeCall::Mint {
                    shares: raw(inputs.collect_amount, td)?,
                },
            },
            ActionRequest::ApprovePoolCurrency { amount } => BridgeCall::ApproveCurrency {
                amount: approval_amount(amount, cd, opts)?,
            },
            ActionRequest::ApproveTrancheToken { amount } => BridgeCall::ApproveTrancheToken {
                amount: approval_amount(amount, td, opts)?,
            },
        }),
        BackendKind::LegacyEvm => BackendCall::Legacy(match request {
            ActionRequest::Invest { amount } => LegacyCall::SupplyOrder {
                amount: raw(amount, cd)?,
            },
            ActionRequest::Redeem { amount } => LegacyCall::RedeemOrder {
                amount: raw(amount, td)?,
            },
            ActionRequest::CancelInvest => LegacyCall::SupplyOrder { amount: 0 },
            ActionRequest::CancelRedeem => LegacyCall::RedeemOrder { amount: 0 },
            ActionRequest::Collect => LegacyCall::Disburse,
            ActionRequest::ApprovePoolCurrency { amount } => LegacyCall::ApproveCurrency {
                amount: approval_amount(amount, cd, opts)?,
            },
            ActionRequest::ApproveTrancheToken { amount } => LegacyCall::ApproveToken {
                amount: approval_amount(amount, td, opts)?,
            },
        }),
    };
    Ok(call)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn inputs() -> ResolveInputs {
        ResolveInputs {
            units: Units::new(6, 18),
            pending_invest: dec("200"),
            pending_redeem: Decimal::ZERO,
            collect_type: CollectType::Invest,
            collect_amount: dec("1.5"),
        }
    }

    #[test]
    fn native_cancel_is_an_update_to_zero() {
        let call = resolve(
            BackendKind::Native,
            ActionRequest::CancelInvest,
            &inputs(),
            ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(call, BackendCall::Native(NativeCall::UpdateInvestOrder { amount: 0 }));
    }

    #[test]
    fn bridge_amounts_use_each_token_decimals() {
        let call = resolve(
            BackendKind::EvmBridge,
            ActionRequest::Invest { amount: dec("1000") },
            &inputs(),
            ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(
            call,
            BackendCall::Bridge(BridgeCall::RequestDeposit {
                amount: 1_000_000_000,
                permit: None
            })
        );

        let call = resolve(
            BackendKind::EvmBridge,
            ActionRequest::Collect,
            &inputs(),
            ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(
            call,
            BackendCall::Bridge(BridgeCall::Mint {
                shares: 1_500_000_000_000_000_000
            })
        );
    }

    #[test]
    fn cancel_without_pending_order_is_refused() {
        let err = resolve(
            BackendKind::LegacyEvm,
            ActionRequest::CancelRedeem,
            &inputs(),
            ResolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DispatchRejection::NoPendingOrder {
                kind: ActionKind::CancelRedeem
            }
        );
    }

    #[test]
    fn collect_with_nothing_collectable_is_refused() {
        let mut i = inputs();
        i.collect_type = CollectType::None;
        let err = resolve(
            BackendKind::Native,
            ActionRequest::Collect,
            &i,
            ResolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err, DispatchRejection::NothingToCollect);
    }

    #[test]
    fn unrepresentable_amount_is_refused() {
        let err = resolve(
            BackendKind::EvmBridge,
            ActionRequest::Invest {
                amount: dec("0.0000001"),
            },
            &inputs(),
            ResolveOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, DispatchRejection::AmountNotRepresentable { .. }));
    }

    #[test]
    fn unlimited_approval() {
        let call = resolve(
            BackendKind::LegacyEvm,
            ActionRequest::ApprovePoolCurrency { amount: dec("10") },
            &inputs(),
            ResolveOptions {
                approve_unlimited: true,
            },
        )
        .unwrap();
        assert_eq!(
            call,
            BackendCall::Legacy(LegacyCall::ApproveCurrency { amount: u128::MAX })
        );
    }
}

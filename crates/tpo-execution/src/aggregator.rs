//! Order State Aggregator.
//!
//! Pure function of (snapshot, pending action, approval result) plus the pool
//! metadata the aggregator was built with. Produces the single immutable
//! `OrderState` callers render and validate against.
//!
//! # Invariants
//! - Deterministic: identical inputs give identical output.
//! - Decimal only: every derived amount is exact.
//! - A section that is still loading contributes zeros and sets `loading`.

use serde::Serialize;
use tpo_schemas::{
    Allowances, BackendKind, BridgingNote, Collectable, Decimal, Loadable, OrderSnapshot,
    PendingAction, PoolMetadata, Units,
};

use crate::approval::ApprovalRequirement;
use crate::policy::BackendPolicy;

/// Everything a caller needs to render and validate an order form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OrderState {
    pub backend: BackendKind,
    /// At least one snapshot section (or the metadata) has not loaded.
    pub loading: bool,
    /// Pool is computing epoch results (also true while the pool is loading).
    pub busy: bool,

    pub units: Option<Units>,
    pub token_price: Option<Decimal>,
    pub currency_symbol: Option<String>,
    pub supports_permit: bool,

    pub native_balance: Decimal,
    pub pool_currency_balance: Decimal,
    pub tranche_token_balance: Decimal,
    pub allowances: Allowances,

    pub pending_invest: Decimal,
    pub pending_redeem: Decimal,
    /// Pool currency balance plus the currency locked in the invest order.
    pub combined_currency_balance: Decimal,
    /// Tranche token balance plus the tokens locked in the redeem order.
    pub combined_token_balance: Decimal,
    /// `combined_token_balance` valued at the current token price.
    pub investment_value: Decimal,

    pub collectable: Collectable,
    pub needs_to_collect_before_order: bool,
    pub can_change_order: bool,
    pub can_cancel_order: bool,

    pub is_first_investment: bool,
    pub min_initial_investment: Option<Decimal>,
    pub investor_eligible: bool,

    pub pending_action: Option<PendingAction>,
    pub bridging_note: Option<BridgingNote>,
    pub approval: Option<ApprovalRequirement>,
}

impl OrderState {
    pub fn policy(&self) -> BackendPolicy {
        BackendPolicy::for_backend(self.backend)
    }

    pub fn has_pending_order(&self) -> bool {
        self.pending_invest > Decimal::ZERO || self.pending_redeem > Decimal::ZERO
    }

    pub fn action_in_flight(&self) -> bool {
        self.pending_action
            .as_ref()
            .map(|a| a.is_in_flight())
            .unwrap_or(false)
    }
}

#[derive(Clone, Debug)]
pub struct OrderStateAggregator {
    policy: BackendPolicy,
    metadata: Loadable<PoolMetadata>,
}

impl OrderStateAggregator {
    /// Without metadata, no minimum applies and the investor is eligible.
    pub fn new(backend: BackendKind) -> Self {
        Self {
            policy: BackendPolicy::for_backend(backend),
            metadata: Loadable::Ready(PoolMetadata {
                min_initial_investment: None,
                investor_eligible: true,
            }),
        }
    }

    pub fn with_metadata(mut self, metadata: Loadable<PoolMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn aggregate(
        &self,
        snapshot: &OrderSnapshot,
        pending: Option<&PendingAction>,
        approval: Option<ApprovalRequirement>,
    ) -> OrderState {
        let pool = snapshot.pool.as_ready();
        let balances = snapshot.balances.as_ready();
        let position = snapshot.position.as_ready();
        let metadata = self.metadata.as_ready();

        let loading = !snapshot.is_complete() || metadata.is_none();

        let pool_currency_balance = balances.map(|b| b.pool_currency).unwrap_or_default();
        let tranche_token_balance = balances.map(|b| b.tranche_token).unwrap_or_default();
        let pending_invest = position.map(|p| p.pending_invest).unwrap_or_default();
        let pending_redeem = position.map(|p| p.pending_redeem).unwrap_or_default();
        let collectable = position
            .map(|p| p.collectable.clone())
            .unwrap_or_else(Collectable::none);

        let combined_token_balance = tranche_token_balance + pending_redeem;
        let token_price = pool.map(|p| p.token_price);

        let has_pending = pending_invest > Decimal::ZERO || pending_redeem > Decimal::ZERO;

        let bridging_note = pending
            .filter(|a| a.is_in_flight())
            .and_then(|a| a.bridging.clone());

        OrderState {
            backend: self.policy.backend,
            loading,
            busy: snapshot.pool_busy(),
            units: pool.map(|p| p.units),
            token_price,
            currency_symbol: pool.map(|p| p.currency_symbol.clone()),
            supports_permit: pool.map(|p| p.supports_permit).unwrap_or(false),
            native_balance: balances.map(|b| b.native).unwrap_or_default(),
            pool_currency_balance,
            tranche_token_balance,
            allowances: balances.map(|b| b.allowances.clone()).unwrap_or_default(),
            pending_invest,
            pending_redeem,
            combined_currency_balance: pool_currency_balance + pending_invest,
            combined_token_balance,
            investment_value: combined_token_balance * token_price.unwrap_or_default(),
            needs_to_collect_before_order: self.policy.requires_collect(&collectable),
            collectable,
            can_change_order: self.policy.can_change_in_place,
            can_cancel_order: self.policy.can_cancel && has_pending,
            is_first_investment: position.map(|p| p.first_investment).unwrap_or(false),
            min_initial_investment: metadata.and_then(|m| m.min_initial_investment),
            investor_eligible: metadata.map(|m| m.investor_eligible).unwrap_or(false),
            pending_action: pending.cloned(),
            bridging_note,
            approval,
        }
    }
}

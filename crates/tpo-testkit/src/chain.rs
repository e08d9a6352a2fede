//! Deterministic paper chain.
//!
//! One in-memory ledger per investor position that plays both sides of a
//! backend: it answers data-source queries with raw wire structs and accepts
//! backend calls as a transaction submitter. Submitted calls take effect when
//! their transaction confirms, so snapshots lag submissions the way a real
//! chain does. No randomness, no network I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rust_decimal::RoundingStrategy;
use tracing::debug;

use tpo_execution::{
    BackendCall, BridgeCall, LegacyCall, NativeCall, SubmitError, TransactionSubmitter, TxStatus,
};
use tpo_schemas::{
    from_raw_units, to_raw_units, BackendKind, ContextKey, Decimal, Loadable, TransactionHandle,
    Units,
};
use tpo_snapshot::{
    cancel_bridged, BridgeDataSource, BridgedEvent, BridgedEventKind, LegacyDataSource,
    NativeDataSource, RawBridgeBalances, RawBridgeOrder, RawBridgePool, RawBridgePosition,
    RawDisbursement, RawEpochStatus, RawLegacyBalances, RawLegacyPool, RawLegacyPosition,
    RawNativeBalances, RawNativeOrder, RawNativePool, RawNativePosition, SourceError,
};

const PRICE_DECIMALS: u32 = 18;
const RAY_DECIMALS: u32 = 27;
const NATIVE_DECIMALS: u32 = 18;

/// How the next submitted transaction behaves.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxPlan {
    /// Mined on the first poll, final (effects applied) on the second.
    Confirm,
    /// Never observed in a block.
    Stuck,
    /// Mined, then reverted with the given reason.
    Revert(String),
    /// Mined, then awaiting the companion chain until `relay_bridged`.
    Bridged,
}

#[derive(Default)]
struct Ledger {
    native: u128,
    currency: u128,
    tokens: u128,
    currency_allowance: u128,
    token_allowance: u128,
    pending_invest: u128,
    pending_redeem: u128,
    claimable_tokens: u128,
    claimable_currency: u128,
    has_invested: bool,
    busy: bool,
    price: Decimal,
    events: Vec<BridgedEvent>,
    next_seq: u64,
    pool_loading: bool,
    position_loading: bool,
}

struct TxRecord {
    call: BackendCall,
    plan: TxPlan,
    polls: u32,
    relayed: bool,
    outcome: Option<TxStatus>,
}

#[derive(Default)]
struct Inner {
    ledger: Ledger,
    txs: HashMap<String, TxRecord>,
    script: VecDeque<TxPlan>,
    submit_errors: VecDeque<SubmitError>,
    status_errors: u32,
    submitted: Vec<BackendCall>,
    next_tx: u64,
}

pub struct PaperChain {
    backend: BackendKind,
    units: Units,
    currency_symbol: String,
    supports_permit: bool,
    inner: Mutex<Inner>,
}

fn to_raw(amount: Decimal, decimals: u32) -> u128 {
    let truncated = amount
        .max(Decimal::ZERO)
        .round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
    to_raw_units(truncated, decimals).unwrap_or(u128::MAX)
}

fn render(raw: u128) -> String {
    raw.to_string()
}

fn debit(balance: &mut u128, amount: u128, what: &str) -> Result<(), String> {
    *balance = balance
        .checked_sub(amount)
        .ok_or_else(|| format!("{what}: transfer amount exceeds balance"))?;
    Ok(())
}

fn ensure_covers(available: u128, amount: u128, what: &str) -> Result<(), String> {
    if amount > available {
        return Err(format!("{what}: order exceeds balance"));
    }
    Ok(())
}

fn spend_allowance(allowance: &mut u128, amount: u128) -> Result<(), String> {
    if *allowance == u128::MAX {
        return Ok(());
    }
    *allowance = allowance
        .checked_sub(amount)
        .ok_or_else(|| "ERC20: insufficient allowance".to_string())?;
    Ok(())
}

impl Ledger {
    fn push_event(&mut self, kind: BridgedEventKind) {
        self.next_seq += 1;
        self.events.push(BridgedEvent {
            kind,
            sequence: self.next_seq,
            tx: None,
        });
    }

    fn invest_cancelled(&self) -> bool {
        cancel_bridged(
            &self.events,
            BridgedEventKind::DepositRequest,
            BridgedEventKind::CancelDepositRequest,
        )
    }

    fn redeem_cancelled(&self) -> bool {
        cancel_bridged(
            &self.events,
            BridgedEventKind::RedeemRequest,
            BridgedEventKind::CancelRedeemRequest,
        )
    }

    fn apply(&mut self, call: &BackendCall) -> Result<(), String> {
        match call {
            BackendCall::Native(c) => self.apply_native(c),
            BackendCall::Bridge(c) => self.apply_bridge(c),
            BackendCall::Legacy(c) => self.apply_legacy(c),
        }
    }

    fn apply_native(&mut self, call: &NativeCall) -> Result<(), String> {
        match call {
            NativeCall::UpdateInvestOrder { amount } => {
                let available = self.currency + self.pending_invest;
                ensure_covers(available, *amount, "currency")?;
                self.currency = available - amount;
                self.pending_invest = *amount;
                self.has_invested |= *amount > 0;
            }
            NativeCall::UpdateRedeemOrder { amount } => {
                let available = self.tokens + self.pending_redeem;
                ensure_covers(available, *amount, "tranche tokens")?;
                self.tokens = available - amount;
                self.pending_redeem = *amount;
            }
            NativeCall::CollectInvest => {
                self.tokens += std::mem::take(&mut self.claimable_tokens);
            }
            NativeCall::CollectRedeem => {
                self.currency += std::mem::take(&mut self.claimable_currency);
            }
        }
        Ok(())
    }

    fn apply_bridge(&mut self, call: &BridgeCall) -> Result<(), String> {
        match call {
            BridgeCall::RequestDeposit { amount, permit } => {
                if let Some(p) = permit {
                    self.currency_allowance = p.value;
                }
                spend_allowance(&mut self.currency_allowance, *amount)?;
                debit(&mut self.currency, *amount, "currency")?;
                if self.invest_cancelled() {
                    self.pending_invest = 0;
                }
                self.pending_invest += amount;
                self.has_invested = true;
                self.push_event(BridgedEventKind::DepositRequest);
            }
            BridgeCall::RequestRedeem { amount } => {
                spend_allowance(&mut self.token_allowance, *amount)?;
                debit(&mut self.tokens, *amount, "tranche tokens")?;
                if self.redeem_cancelled() {
                    self.pending_redeem = 0;
                }
                self.pending_redeem += amount;
                self.push_event(BridgedEventKind::RedeemRequest);
            }
            // The view call keeps the old request; only the bridged event
            // tells readers it is gone.
            BridgeCall::CancelDepositRequest => {
                if !self.invest_cancelled() {
                    self.currency += self.pending_invest;
                    self.push_event(BridgedEventKind::CancelDepositRequest);
                }
            }
            BridgeCall::CancelRedeemRequest => {
                if !self.redeem_cancelled() {
                    self.tokens += self.pending_redeem;
                    self.push_event(BridgedEventKind::CancelRedeemRequest);
                }
            }
            BridgeCall::Mint { shares } => {
                debit(&mut self.claimable_tokens, *shares, "claimable shares")?;
                self.tokens += shares;
            }
            BridgeCall::Withdraw { assets } => {
                debit(&mut self.claimable_currency, *assets, "claimable assets")?;
                self.currency += assets;
            }
            BridgeCall::ApproveCurrency { amount } => self.currency_allowance = *amount,
            BridgeCall::ApproveTrancheToken { amount } => self.token_allowance = *amount,
        }
        Ok(())
    }

    fn apply_legacy(&mut self, call: &LegacyCall) -> Result<(), String> {
        match call {
            LegacyCall::SupplyOrder { amount } => {
                let increase = amount.saturating_sub(self.pending_invest);
                spend_allowance(&mut self.currency_allowance, increase)?;
                let available = self.currency + self.pending_invest;
                ensure_covers(available, *amount, "currency")?;
                self.currency = available - amount;
                self.pending_invest = *amount;
                self.has_invested |= *amount > 0;
            }
            LegacyCall::RedeemOrder { amount } => {
                let increase = amount.saturating_sub(self.pending_redeem);
                spend_allowance(&mut self.token_allowance, increase)?;
                let available = self.tokens + self.pending_redeem;
                ensure_covers(available, *amount, "tokens")?;
                self.tokens = available - amount;
                self.pending_redeem = *amount;
            }
            LegacyCall::Disburse => {
                self.tokens += std::mem::take(&mut self.claimable_tokens);
                self.currency += std::mem::take(&mut self.claimable_currency);
            }
            LegacyCall::ApproveCurrency { amount } => self.currency_allowance = *amount,
            LegacyCall::ApproveToken { amount } => self.token_allowance = *amount,
        }
        Ok(())
    }
}

fn lock(m: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PaperChain {
    fn new(backend: BackendKind, units: Units, symbol: &str, supports_permit: bool) -> Self {
        let inner = Inner {
            ledger: Ledger {
                price: Decimal::ONE,
                ..Ledger::default()
            },
            ..Inner::default()
        };
        Self {
            backend,
            units,
            currency_symbol: symbol.to_string(),
            supports_permit,
            inner: Mutex::new(inner),
        }
    }

    /// Native chain pool; tranche tokens share the currency's decimals.
    pub fn native(currency_decimals: u32) -> Self {
        Self::new(
            BackendKind::Native,
            Units::new(currency_decimals, currency_decimals),
            "USDC",
            false,
        )
    }

    pub fn bridge(currency_decimals: u32, token_decimals: u32, supports_permit: bool) -> Self {
        Self::new(
            BackendKind::EvmBridge,
            Units::new(currency_decimals, token_decimals),
            "USDC",
            supports_permit,
        )
    }

    pub fn legacy() -> Self {
        Self::new(BackendKind::LegacyEvm, Units::new(18, 18), "DAI", false)
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend
    }

    // --- scripting ---------------------------------------------------------
    //
    // Setters take human amounts, truncated to the token's decimals.

    pub fn set_currency_balance(&self, amount: Decimal) {
        lock(&self.inner).ledger.currency = to_raw(amount, self.units.currency_decimals);
    }

    pub fn set_token_balance(&self, amount: Decimal) {
        lock(&self.inner).ledger.tokens = to_raw(amount, self.units.token_decimals);
    }

    pub fn set_currency_allowance(&self, amount: Decimal) {
        lock(&self.inner).ledger.currency_allowance = to_raw(amount, self.units.currency_decimals);
    }

    pub fn set_token_allowance(&self, amount: Decimal) {
        lock(&self.inner).ledger.token_allowance = to_raw(amount, self.units.token_decimals);
    }

    /// Outstanding invest order. On the bridge this also records the
    /// matching request event.
    pub fn set_pending_invest(&self, amount: Decimal) {
        let mut inner = lock(&self.inner);
        inner.ledger.pending_invest = to_raw(amount, self.units.currency_decimals);
        inner.ledger.has_invested = true;
        if self.backend == BackendKind::EvmBridge {
            inner.ledger.push_event(BridgedEventKind::DepositRequest);
        }
    }

    pub fn set_pending_redeem(&self, amount: Decimal) {
        let mut inner = lock(&self.inner);
        inner.ledger.pending_redeem = to_raw(amount, self.units.token_decimals);
        if self.backend == BackendKind::EvmBridge {
            inner.ledger.push_event(BridgedEventKind::RedeemRequest);
        }
    }

    pub fn set_claimable_tokens(&self, amount: Decimal) {
        lock(&self.inner).ledger.claimable_tokens = to_raw(amount, self.units.token_decimals);
    }

    pub fn set_claimable_currency(&self, amount: Decimal) {
        lock(&self.inner).ledger.claimable_currency = to_raw(amount, self.units.currency_decimals);
    }

    pub fn set_price(&self, price: Decimal) {
        lock(&self.inner).ledger.price = price;
    }

    pub fn set_busy(&self, busy: bool) {
        lock(&self.inner).ledger.busy = busy;
    }

    pub fn set_has_invested(&self, has_invested: bool) {
        lock(&self.inner).ledger.has_invested = has_invested;
    }

    pub fn set_pool_loading(&self, loading: bool) {
        lock(&self.inner).ledger.pool_loading = loading;
    }

    pub fn set_position_loading(&self, loading: bool) {
        lock(&self.inner).ledger.position_loading = loading;
    }

    /// Plan for the next submission; unscripted submissions use the default
    /// (bridge cancels are `Bridged`, everything else `Confirm`).
    pub fn script_next(&self, plan: TxPlan) {
        lock(&self.inner).script.push_back(plan);
    }

    pub fn fail_next_submit(&self, err: SubmitError) {
        lock(&self.inner).submit_errors.push_back(err);
    }

    /// The next `n` status queries fail with a transport error.
    pub fn fail_status_queries(&self, n: u32) {
        lock(&self.inner).status_errors = n;
    }

    /// Deliver every bridged transaction's effect to this chain.
    pub fn relay_bridged(&self) -> usize {
        let mut inner = lock(&self.inner);
        let Inner { ledger, txs, .. } = &mut *inner;
        let mut relayed = 0;
        for rec in txs.values_mut() {
            if rec.plan == TxPlan::Bridged && !rec.relayed {
                if let Err(reason) = ledger.apply(&rec.call) {
                    rec.outcome = Some(TxStatus::Reverted { reason });
                }
                rec.relayed = true;
                relayed += 1;
            }
        }
        debug!(relayed, "paper chain relayed bridged transactions");
        relayed
    }

    /// Execute every outstanding order at the current price.
    pub fn settle_epoch(&self) {
        let mut inner = lock(&self.inner);
        let l = &mut inner.ledger;
        let (cd, td) = (self.units.currency_decimals, self.units.token_decimals);
        if l.price <= Decimal::ZERO {
            return;
        }

        let invest = if l.invest_cancelled() { 0 } else { l.pending_invest };
        let redeem = if l.redeem_cancelled() { 0 } else { l.pending_redeem };

        let currency_in = from_raw_units(invest, cd).unwrap_or_default();
        l.claimable_tokens += to_raw(currency_in / l.price, td);
        let tokens_in = from_raw_units(redeem, td).unwrap_or_default();
        l.claimable_currency += to_raw(tokens_in * l.price, cd);

        l.pending_invest = 0;
        l.pending_redeem = 0;
    }

    pub fn submissions(&self) -> Vec<BackendCall> {
        lock(&self.inner).submitted.clone()
    }

    pub fn bridged_events(&self) -> Vec<BridgedEvent> {
        lock(&self.inner).ledger.events.clone()
    }

    fn default_plan(call: &BackendCall) -> TxPlan {
        match call {
            BackendCall::Bridge(BridgeCall::CancelDepositRequest)
            | BackendCall::Bridge(BridgeCall::CancelRedeemRequest) => TxPlan::Bridged,
            _ => TxPlan::Confirm,
        }
    }

    fn price_raw(&self, l: &Ledger, decimals: u32) -> String {
        render(to_raw(l.price, decimals))
    }
}

fn section<T>(loading: bool, f: impl FnOnce() -> T) -> Loadable<T> {
    if loading {
        Loadable::Loading
    } else {
        Loadable::Ready(f())
    }
}

// ---------------------------------------------------------------------------
// Data sources
// ---------------------------------------------------------------------------

#[async_trait]
impl NativeDataSource for PaperChain {
    async fn query(&self, _key: &ContextKey) -> Result<RawNativePosition, SourceError> {
        let inner = lock(&self.inner);
        let l = &inner.ledger;
        Ok(RawNativePosition {
            currency_decimals: self.units.currency_decimals,
            pool: section(l.pool_loading, || RawNativePool {
                epoch: if l.busy {
                    RawEpochStatus::SubmissionPeriod
                } else {
                    RawEpochStatus::Ongoing
                },
                token_price: self.price_raw(l, PRICE_DECIMALS),
                currency_symbol: self.currency_symbol.clone(),
            }),
            balances: Loadable::Ready(RawNativeBalances {
                native: render(l.native),
                currency: render(l.currency),
                tranche_tokens: render(l.tokens),
            }),
            order: section(l.position_loading, || RawNativeOrder {
                invest: render(l.pending_invest),
                redeem: render(l.pending_redeem),
                payout_token_amount: render(l.claimable_tokens),
                payout_currency_amount: render(l.claimable_currency),
                has_invested_before: l.has_invested,
            }),
        })
    }
}

#[async_trait]
impl BridgeDataSource for PaperChain {
    async fn query(&self, _key: &ContextKey) -> Result<RawBridgePosition, SourceError> {
        let inner = lock(&self.inner);
        let l = &inner.ledger;
        Ok(RawBridgePosition {
            currency_decimals: self.units.currency_decimals,
            token_decimals: self.units.token_decimals,
            pool: section(l.pool_loading, || RawBridgePool {
                epoch_executing: l.busy,
                token_price: self.price_raw(l, PRICE_DECIMALS),
                currency_symbol: self.currency_symbol.clone(),
                supports_permit: self.supports_permit,
            }),
            balances: Loadable::Ready(RawBridgeBalances {
                native: render(l.native),
                currency: render(l.currency),
                tranche_tokens: render(l.tokens),
                currency_allowance: render(l.currency_allowance),
                tranche_token_allowance: render(l.token_allowance),
            }),
            order: section(l.position_loading, || RawBridgeOrder {
                pending_deposit_request: render(l.pending_invest),
                pending_redeem_request: render(l.pending_redeem),
                max_mint: render(l.claimable_tokens),
                max_withdraw: render(l.claimable_currency),
                has_deposited_before: l.has_invested,
            }),
            events: Loadable::Ready(l.events.clone()),
        })
    }
}

#[async_trait]
impl LegacyDataSource for PaperChain {
    async fn query(&self, _key: &ContextKey) -> Result<RawLegacyPosition, SourceError> {
        let inner = lock(&self.inner);
        let l = &inner.ledger;
        Ok(RawLegacyPosition {
            pool: section(l.pool_loading, || RawLegacyPool {
                epoch_computing: l.busy,
                token_price: self.price_raw(l, RAY_DECIMALS),
                currency_symbol: self.currency_symbol.clone(),
            }),
            balances: Loadable::Ready(RawLegacyBalances {
                eth: render(l.native),
                currency: render(l.currency),
                token: render(l.tokens),
                currency_allowance: render(l.currency_allowance),
                token_allowance: render(l.token_allowance),
            }),
            disbursement: section(l.position_loading, || RawDisbursement {
                payout_currency_amount: render(l.claimable_currency),
                payout_token_amount: render(l.claimable_tokens),
                remaining_supply_currency: render(l.pending_invest),
                remaining_redeem_token: render(l.pending_redeem),
            }),
            has_invested: l.has_invested,
        })
    }
}

// ---------------------------------------------------------------------------
// Submitter
// ---------------------------------------------------------------------------

#[async_trait]
impl TransactionSubmitter for PaperChain {
    fn backend(&self) -> BackendKind {
        self.backend
    }

    async fn submit(&self, call: &BackendCall) -> Result<TransactionHandle, SubmitError> {
        if call.backend() != self.backend {
            return Err(SubmitError::WrongBackend {
                expected: self.backend,
                got: call.backend(),
            });
        }
        let mut inner = lock(&self.inner);
        if let Some(err) = inner.submit_errors.pop_front() {
            return Err(err);
        }
        let plan = inner
            .script
            .pop_front()
            .unwrap_or_else(|| Self::default_plan(call));

        inner.next_tx += 1;
        let handle = match self.backend {
            BackendKind::Native => format!("ext-{:08}", inner.next_tx),
            _ => format!("0x{:064x}", inner.next_tx),
        };
        inner.submitted.push(call.clone());
        inner.txs.insert(
            handle.clone(),
            TxRecord {
                call: call.clone(),
                plan,
                polls: 0,
                relayed: false,
                outcome: None,
            },
        );
        Ok(TransactionHandle::new(handle))
    }

    async fn status(&self, handle: &TransactionHandle) -> Result<TxStatus, SubmitError> {
        let mut inner = lock(&self.inner);
        if inner.status_errors > 0 {
            inner.status_errors -= 1;
            return Err(SubmitError::Transport("paper node unavailable".to_string()));
        }
        let Inner { ledger, txs, .. } = &mut *inner;
        let rec = txs
            .get_mut(handle.as_str())
            .ok_or_else(|| SubmitError::NodeRejected(format!("unknown transaction {handle}")))?;
        if let Some(outcome) = &rec.outcome {
            return Ok(outcome.clone());
        }

        rec.polls += 1;
        let first_poll = rec.polls == 1;
        let status = match &rec.plan {
            TxPlan::Stuck => TxStatus::Unconfirmed,
            _ if first_poll => TxStatus::Mined,
            TxPlan::Revert(reason) => TxStatus::Reverted {
                reason: reason.clone(),
            },
            TxPlan::Confirm => match ledger.apply(&rec.call) {
                Ok(()) => TxStatus::Succeeded,
                Err(reason) => TxStatus::Reverted { reason },
            },
            TxPlan::Bridged if rec.relayed => TxStatus::Succeeded,
            TxPlan::Bridged => TxStatus::AwaitingCompanion,
        };
        if matches!(status, TxStatus::Succeeded | TxStatus::Reverted { .. }) {
            rec.outcome = Some(status.clone());
        }
        Ok(status)
    }
}

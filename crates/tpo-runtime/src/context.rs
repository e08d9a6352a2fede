//! One order context per (pool, tranche, investor).
//!
//! # Design
//!
//! The context owns a reader handle and a router; it holds no cached
//! snapshot. Every `state` call re-reads the chain so callers never act on
//! stale pending amounts. Order operations check the router's pool gates
//! (in flight, busy, collect first) against that fresh state, then validate
//! the amount, and only then dispatch.
//!
//! # Invariants
//!
//! 1. A validation error never reaches the router.
//! 2. A pool that must be collected from first reports that, not a balance
//!    error caused by the uncollected tokens.
//! 3. Switching tranche tears the context down; the new context starts
//!    with no pending action.

use std::sync::Arc;

use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use tpo_execution::{
    approval_required, ActionObserver, ActionRequest, ActionRouter, ApprovalRequirement,
    OrderState, OrderStateAggregator,
};
use tpo_schemas::{
    ActionId, ActionKind, BackendKind, ContextKey, Decimal, Loadable, OrderSnapshot,
    PendingAction, PoolMetadata, TrancheId, WalletNetwork,
};

use crate::error::OrderError;
use crate::selector::Wiring;

pub struct OrderContext {
    key: ContextKey,
    network: WalletNetwork,
    backend: BackendKind,
    wiring: Wiring,
    router: ActionRouter,
}

impl OrderContext {
    pub(crate) fn new(key: ContextKey, network: WalletNetwork, wiring: Wiring) -> Self {
        let backend = wiring.services.submitter.backend();
        let router = ActionRouter::new(
            key.clone(),
            wiring.services.submitter.clone(),
            wiring.signer.clone(),
            wiring.settings,
        )
        .with_state_reader(wiring.services.reader.clone());
        Self {
            key,
            network,
            backend,
            wiring,
            router,
        }
    }

    pub fn key(&self) -> &ContextKey {
        &self.key
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn network(&self) -> WalletNetwork {
        self.network
    }

    pub fn router(&self) -> &ActionRouter {
        &self.router
    }

    pub fn add_observer(&self, observer: Arc<dyn ActionObserver>) {
        self.router.add_observer(observer);
    }

    pub fn subscribe(&self) -> BroadcastStream<PendingAction> {
        self.router.subscribe()
    }

    pub fn current_action(&self) -> Option<PendingAction> {
        self.router.current()
    }

    pub async fn wait_terminal(&self) -> Option<PendingAction> {
        self.router.wait_terminal().await
    }

    /// Clears a terminal action; `false` while one is in flight.
    pub fn reset(&self) -> bool {
        self.router.reset()
    }

    /// Fresh snapshot + metadata, aggregated with the current action.
    ///
    /// With a `draft` invest/redeem, the state also carries the approval the
    /// draft would need.
    pub async fn state(&self, draft: Option<ActionRequest>) -> Result<OrderState, OrderError> {
        let snapshot = self.wiring.services.reader.read(&self.key).await?;
        let metadata = self.metadata().await?;
        let approval = draft.and_then(|d| self.approval_for(&snapshot, d));

        let pending = self.router.current();
        let state = OrderStateAggregator::new(self.backend)
            .with_metadata(metadata)
            .aggregate(&snapshot, pending.as_ref(), approval);
        debug!(
            context = %self.key,
            loading = state.loading,
            busy = state.busy,
            pending_invest = %state.pending_invest,
            pending_redeem = %state.pending_redeem,
            "order state read"
        );
        Ok(state)
    }

    pub async fn invest(&self, amount: Decimal) -> Result<ActionId, OrderError> {
        let request = ActionRequest::Invest { amount };
        let state = self.state(Some(request)).await?;
        self.precheck(ActionKind::Invest, &state)?;
        state.validate_invest(amount)?;
        Ok(self.router.dispatch(request, &state)?)
    }

    pub async fn redeem(&self, amount: Decimal) -> Result<ActionId, OrderError> {
        let request = ActionRequest::Redeem { amount };
        let state = self.state(Some(request)).await?;
        self.precheck(ActionKind::Redeem, &state)?;
        state.validate_redeem(amount)?;
        Ok(self.router.dispatch(request, &state)?)
    }

    pub async fn cancel_invest(&self) -> Result<ActionId, OrderError> {
        self.dispatch(ActionRequest::CancelInvest).await
    }

    pub async fn cancel_redeem(&self) -> Result<ActionId, OrderError> {
        self.dispatch(ActionRequest::CancelRedeem).await
    }

    pub async fn collect(&self) -> Result<ActionId, OrderError> {
        self.dispatch(ActionRequest::Collect).await
    }

    /// Tear this context down and open the same pool for another tranche.
    /// An in-flight transaction keeps going on chain but is no longer tracked.
    pub fn switch_tranche(self, tranche: TrancheId) -> OrderContext {
        let key = self.key.with_tranche(tranche);
        info!(from = %self.key, to = %key, "switching tranche");
        let OrderContext {
            network, wiring, ..
        } = self;
        OrderContext::new(key, network, wiring)
    }

    /// Loading is left to validation so it reports as a validation error.
    fn precheck(&self, kind: ActionKind, state: &OrderState) -> Result<(), OrderError> {
        if !state.loading {
            self.router.precheck(kind, state)?;
        }
        Ok(())
    }

    async fn dispatch(&self, request: ActionRequest) -> Result<ActionId, OrderError> {
        let state = self.state(None).await?;
        Ok(self.router.dispatch(request, &state)?)
    }

    /// Without a provider, no minimum applies and the investor is eligible.
    async fn metadata(&self) -> Result<Loadable<PoolMetadata>, OrderError> {
        let Some(provider) = &self.wiring.metadata else {
            return Ok(Loadable::Ready(PoolMetadata {
                min_initial_investment: None,
                investor_eligible: true,
            }));
        };
        provider
            .metadata(&self.key.pool, &self.key.tranche, &self.key.user)
            .await
            .map_err(|e| OrderError::Snapshot(e.into()))
    }

    fn approval_for(
        &self,
        snapshot: &OrderSnapshot,
        draft: ActionRequest,
    ) -> Option<ApprovalRequirement> {
        let kind = draft.kind();
        let amount = draft.amount()?;
        if !matches!(kind, ActionKind::Invest | ActionKind::Redeem) {
            return None;
        }
        let balances = snapshot.balances.as_ready()?;
        let supports_permit = snapshot
            .pool
            .as_ready()
            .map(|p| p.supports_permit)
            .unwrap_or(false);
        let allowance = if kind == ActionKind::Invest {
            balances.allowances.pool_currency
        } else {
            balances.allowances.tranche_token
        };
        Some(approval_required(
            self.backend,
            kind,
            amount,
            allowance,
            supports_permit && self.wiring.signer.is_some(),
            self.router.last_kind(),
        ))
    }
}

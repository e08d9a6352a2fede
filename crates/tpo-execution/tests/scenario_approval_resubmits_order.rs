//! Scenario: approval resubmission.
//!
//! An invest or redeem whose allowance is too low starts the matching
//! approval instead. Once the approval succeeds, the original order is
//! submitted automatically for exactly the originally requested amount.
//! Observers hear about the order's success once and never about the
//! approval's.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tpo_execution::{
    ActionObserver, ActionRequest, ActionRouter, BackendCall, BridgeCall, LegacyCall,
    OrderStateAggregator, RouterSettings,
};
use tpo_schemas::{ActionKind, ActionStatus, ContextKey, Decimal, PendingAction};
use tpo_snapshot::{BridgeSnapshotReader, LegacySnapshotReader, SnapshotReader};
use tpo_testkit::{PaperChain, TxPlan};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[derive(Default)]
struct Recorder {
    transitions: Mutex<Vec<(ActionKind, ActionStatus)>>,
    successes: Mutex<Vec<ActionKind>>,
}

impl ActionObserver for Recorder {
    fn on_transition(&self, action: &PendingAction) {
        self.transitions
            .lock()
            .unwrap()
            .push((action.kind, action.status));
    }

    fn on_success(&self, kind: ActionKind) {
        self.successes.lock().unwrap().push(kind);
    }
}

const WAD: u128 = 1_000_000_000_000_000_000;

#[tokio::test(start_paused = true)]
async fn legacy_invest_approves_then_supplies_requested_amount() {
    let chain = Arc::new(PaperChain::legacy());
    chain.set_currency_balance(dec("5000"));
    let key = ContextKey::new("0x4cA805cE8EcE2E63FfC1F9f8F2731D3F48DF89Df", "0xdrop", "0xinvestor");
    let reader = LegacySnapshotReader::new(chain.clone());
    let router = ActionRouter::new(key.clone(), chain.clone(), None, RouterSettings::default());
    let recorder = Arc::new(Recorder::default());
    router.add_observer(recorder.clone());

    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    assert_eq!(state.allowances.pool_currency, Some(Decimal::ZERO));

    router
        .dispatch(ActionRequest::Invest { amount: dec("1000") }, &state)
        .unwrap();
    let started = router.current().unwrap();
    assert_eq!(started.kind, ActionKind::ApprovePoolCurrency);
    assert_eq!(started.amount, Some(dec("1000")));
    assert_eq!(started.resume, Some(ActionKind::Invest));

    let done = router.wait_terminal().await.unwrap();
    assert_eq!(done.kind, ActionKind::Invest);
    assert_eq!(done.status, ActionStatus::Succeeded);
    assert_eq!(done.amount, Some(dec("1000")));

    assert_eq!(
        chain.submissions(),
        vec![
            BackendCall::Legacy(LegacyCall::ApproveCurrency {
                amount: 1000 * WAD
            }),
            BackendCall::Legacy(LegacyCall::SupplyOrder {
                amount: 1000 * WAD
            }),
        ]
    );

    let transitions = recorder.transitions.lock().unwrap().clone();
    let approval_done = transitions
        .iter()
        .position(|t| *t == (ActionKind::ApprovePoolCurrency, ActionStatus::Succeeded))
        .unwrap();
    let order_created = transitions
        .iter()
        .position(|t| *t == (ActionKind::Invest, ActionStatus::Creating))
        .unwrap();
    assert_eq!(order_created, approval_done + 1);
    assert_eq!(*recorder.successes.lock().unwrap(), vec![ActionKind::Invest]);

    let snap = reader.read(&key).await.unwrap();
    let pos = snap.position.as_ready().unwrap();
    assert_eq!(pos.pending_invest, dec("1000"));
}

#[tokio::test(start_paused = true)]
async fn bridge_redeem_approves_tranche_token() {
    let chain = Arc::new(PaperChain::bridge(6, 18, true));
    chain.set_token_balance(dec("40"));
    let key = ContextKey::new("1615768079", "0x6756e091ae798a8e51e12e27ee8facdf", "0xinvestor");
    let reader = BridgeSnapshotReader::new(chain.clone());
    let router = ActionRouter::new(key.clone(), chain.clone(), None, RouterSettings::default());

    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    router
        .dispatch(ActionRequest::Redeem { amount: dec("12.5") }, &state)
        .unwrap();
    assert_eq!(
        router.current().unwrap().kind,
        ActionKind::ApproveTrancheToken
    );

    let done = router.wait_terminal().await.unwrap();
    assert_eq!(done.kind, ActionKind::Redeem);
    assert_eq!(done.status, ActionStatus::Succeeded);
    assert_eq!(
        chain.submissions(),
        vec![
            BackendCall::Bridge(BridgeCall::ApproveTrancheToken {
                amount: 12_500_000_000_000_000_000
            }),
            BackendCall::Bridge(BridgeCall::RequestRedeem {
                amount: 12_500_000_000_000_000_000
            }),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unlimited_approval_setting_approves_max() {
    let chain = Arc::new(PaperChain::legacy());
    chain.set_currency_balance(dec("10"));
    let key = ContextKey::new("0x4cA805cE8EcE2E63FfC1F9f8F2731D3F48DF89Df", "0xdrop", "0xinvestor");
    let reader = LegacySnapshotReader::new(chain.clone());
    let settings = RouterSettings {
        approve_unlimited: true,
        ..RouterSettings::default()
    };
    let router = ActionRouter::new(key.clone(), chain.clone(), None, settings);

    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    router
        .dispatch(ActionRequest::Invest { amount: dec("3") }, &state)
        .unwrap();
    router.wait_terminal().await.unwrap();

    assert_eq!(
        chain.submissions()[0],
        BackendCall::Legacy(LegacyCall::ApproveCurrency { amount: u128::MAX })
    );

    // The next order needs no approval.
    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    router
        .dispatch(ActionRequest::Invest { amount: dec("5") }, &state)
        .unwrap();
    assert_eq!(router.current().unwrap().kind, ActionKind::Invest);
}

#[tokio::test(start_paused = true)]
async fn failed_approval_does_not_submit_order() {
    let chain = Arc::new(PaperChain::legacy());
    chain.set_currency_balance(dec("100"));
    chain.script_next(TxPlan::Revert("approve: paused".to_string()));
    let key = ContextKey::new("0x4cA805cE8EcE2E63FfC1F9f8F2731D3F48DF89Df", "0xdrop", "0xinvestor");
    let reader = LegacySnapshotReader::new(chain.clone());
    let router = ActionRouter::new(key.clone(), chain.clone(), None, RouterSettings::default());

    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    router
        .dispatch(ActionRequest::Invest { amount: dec("50") }, &state)
        .unwrap();

    let done = router.wait_terminal().await.unwrap();
    assert_eq!(done.kind, ActionKind::ApprovePoolCurrency);
    assert_eq!(done.status, ActionStatus::Failed);
    assert_eq!(chain.submissions().len(), 1);
}

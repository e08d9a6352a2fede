//! Scenario: single notification per transition.
//!
//! Observers and stream subscribers hear about each distinct
//! (status, bridging note) pair exactly once, however many redundant status
//! polls happen in between.

use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use tpo_execution::{
    ActionObserver, ActionRequest, ActionRouter, OrderStateAggregator, RouterSettings,
};
use tpo_schemas::{ActionStatus, ContextKey, Decimal, PendingAction};
use tpo_snapshot::{BridgeSnapshotReader, NativeSnapshotReader, SnapshotReader};
use tpo_testkit::{PaperChain, TxPlan};

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[derive(Default)]
struct Log(Mutex<Vec<(ActionStatus, bool)>>);

impl ActionObserver for Log {
    fn on_transition(&self, action: &PendingAction) {
        self.0
            .lock()
            .unwrap()
            .push((action.status, action.bridging.is_some()));
    }
}

#[tokio::test(start_paused = true)]
async fn bridging_polls_notify_once() {
    let chain = Arc::new(PaperChain::bridge(6, 18, false));
    chain.set_pending_redeem(dec("8"));
    let key = ContextKey::new("1615768079", "0x6756e091ae798a8e51e12e27ee8facdf", "0xinvestor");
    let reader = BridgeSnapshotReader::new(chain.clone());
    let router = ActionRouter::new(key.clone(), chain.clone(), None, RouterSettings::default());
    let log = Arc::new(Log::default());
    router.add_observer(log.clone());

    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    router.dispatch(ActionRequest::CancelRedeem, &state).unwrap();

    // Dozens of AwaitingCompanion polls.
    tokio::time::sleep(Duration::from_secs(300)).await;
    chain.relay_bridged();
    router.wait_terminal().await.unwrap();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec![
            (ActionStatus::Creating, false),
            (ActionStatus::Unconfirmed, false),
            (ActionStatus::Pending, false),
            (ActionStatus::Pending, true),
            (ActionStatus::Succeeded, false),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_polls_notify_once() {
    let chain = Arc::new(PaperChain::native(6));
    chain.set_currency_balance(dec("10"));
    chain.script_next(TxPlan::Stuck);
    let key = ContextKey::new("4139607887", "senior", "investor");
    let reader = NativeSnapshotReader::new(chain.clone());
    let router = ActionRouter::new(key.clone(), chain.clone(), None, RouterSettings::default());
    let log = Arc::new(Log::default());
    router.add_observer(log.clone());
    let mut stream = router.subscribe();

    let snap = reader.read(&key).await.unwrap();
    let state = OrderStateAggregator::new(router.backend()).aggregate(&snap, None, None);
    router
        .dispatch(ActionRequest::Invest { amount: dec("1") }, &state)
        .unwrap();
    router.wait_terminal().await.unwrap();

    let expected = vec![
        (ActionStatus::Creating, false),
        (ActionStatus::Unconfirmed, false),
        (ActionStatus::Failed, false),
    ];
    assert_eq!(*log.0.lock().unwrap(), expected);

    let mut streamed = Vec::new();
    for _ in 0..expected.len() {
        let a = stream.next().await.unwrap().unwrap();
        streamed.push((a.status, a.bridging.is_some()));
    }
    assert_eq!(streamed, expected);
}

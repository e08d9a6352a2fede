//! Scenario: cancellation on the EVM bridge.
//!
//! A cancel request is final on the EVM chain long before the native chain
//! processes it. In between, the action stays `pending` with an
//! informational bridging note and the old pending amount stays visible.
//! The bridging phase is never timed out. Once the cancellation arrives, the
//! pending amount reads zero even though the raw view still reports the old
//! request.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tpo_execution::{
    ActionRequest, ActionRouter, DispatchRejection, OrderState, OrderStateAggregator,
    RouterSettings,
};
use tpo_schemas::{ActionKind, ActionStatus, ContextKey, Decimal};
use tpo_snapshot::{BridgeDataSource, BridgeSnapshotReader, SnapshotReader};
use tpo_testkit::PaperChain;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn key() -> ContextKey {
    ContextKey::new("1615768079", "0x6756e091ae798a8e51e12e27ee8facdf", "0xinvestor")
}

async fn state(chain: &Arc<PaperChain>, router: &ActionRouter) -> OrderState {
    let reader = BridgeSnapshotReader::new(chain.clone());
    let snap = reader.read(router.key()).await.unwrap();
    OrderStateAggregator::new(router.backend()).aggregate(&snap, router.current().as_ref(), None)
}

#[tokio::test(start_paused = true)]
async fn cancel_invest_shows_bridging_until_relayed() {
    let chain = Arc::new(PaperChain::bridge(6, 18, true));
    chain.set_currency_balance(dec("50"));
    chain.set_pending_invest(dec("200"));
    let router = ActionRouter::new(key(), chain.clone(), None, RouterSettings::default());
    let mut events = router.subscribe();

    let s = state(&chain, &router).await;
    assert_eq!(s.pending_invest, dec("200"));
    assert!(s.can_cancel_order);
    router.dispatch(ActionRequest::CancelInvest, &s).unwrap();

    let bridging = loop {
        let a = events.next().await.unwrap().unwrap();
        if a.bridging.is_some() {
            break a;
        }
    };
    assert_eq!(bridging.kind, ActionKind::CancelInvest);
    assert_eq!(bridging.status, ActionStatus::Pending);

    // Well past the confirmation window: bridging never times out.
    tokio::time::sleep(Duration::from_secs(600)).await;
    let s = state(&chain, &router).await;
    assert_eq!(s.pending_invest, dec("200"));
    let note = s.bridging_note.expect("bridging note while awaiting relay");
    assert!(note.message.contains("pending investment stays visible"));
    assert_eq!(router.current().unwrap().status, ActionStatus::Pending);

    assert_eq!(chain.relay_bridged(), 1);
    let done = router.wait_terminal().await.unwrap();
    assert_eq!(done.status, ActionStatus::Succeeded);
    assert!(done.bridging.is_none());

    let s = state(&chain, &router).await;
    assert_eq!(s.pending_invest, Decimal::ZERO);
    assert!(s.bridging_note.is_none());
    assert_eq!(s.pool_currency_balance, dec("250"));

    // The raw view still reports the cancelled request.
    let raw = BridgeDataSource::query(chain.as_ref(), &key()).await.unwrap();
    assert_eq!(
        raw.order.as_ready().unwrap().pending_deposit_request,
        "200000000"
    );
}

#[tokio::test(start_paused = true)]
async fn bridge_refuses_in_place_order_change() {
    let chain = Arc::new(PaperChain::bridge(6, 18, true));
    chain.set_currency_balance(dec("500"));
    chain.set_currency_allowance(dec("500"));
    chain.set_pending_invest(dec("100"));
    let router = ActionRouter::new(key(), chain.clone(), None, RouterSettings::default());

    let s = state(&chain, &router).await;
    assert!(!s.can_change_order);
    assert_eq!(
        router
            .dispatch(ActionRequest::Invest { amount: dec("150") }, &s)
            .unwrap_err(),
        DispatchRejection::OrderChangeUnsupported
    );

    // After cancelling, a fresh order is accepted.
    router.dispatch(ActionRequest::CancelInvest, &s).unwrap();
    let mut events = router.subscribe();
    loop {
        let a = events.next().await.unwrap().unwrap();
        if a.bridging.is_some() {
            break;
        }
    }
    chain.relay_bridged();
    router.wait_terminal().await.unwrap();

    let s = state(&chain, &router).await;
    assert_eq!(s.pending_invest, Decimal::ZERO);
    router
        .dispatch(ActionRequest::Invest { amount: dec("150") }, &s)
        .unwrap();
    let done = router.wait_terminal().await.unwrap();
    assert_eq!(done.kind, ActionKind::Invest);
    assert_eq!(done.status, ActionStatus::Succeeded);
    assert_eq!(state(&chain, &router).await.pending_invest, dec("150"));
}

//! Scenario: decimal exactness.
//!
//! Amounts are exact decimals end to end. "Equals current order" holds for
//! any decimal-equal value, including trailing-zero variants, and raw units
//! are converted without rounding.

use std::str::FromStr;
use std::sync::Arc;

use tpo_config::OrdersConfig;
use tpo_execution::{BackendCall, DispatchRejection, NativeCall, ValidationError};
use tpo_runtime::{BackendSelector, OrderContext, OrderError};
use tpo_schemas::{ActionStatus, ContextKey, Decimal, WalletNetwork};
use tpo_snapshot::{NativeSnapshotReader, SnapshotReader};
use tpo_testkit::PaperChain;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

fn open(chain: &Arc<PaperChain>) -> OrderContext {
    BackendSelector::new(OrdersConfig::default())
        .register(Arc::new(NativeSnapshotReader::new(chain.clone())), chain.clone())
        .unwrap()
        .open(
            ContextKey::new("4139607887", "senior", "investor"),
            WalletNetwork::Native,
        )
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn trailing_zeros_still_equal_current_order() {
    let chain = Arc::new(PaperChain::native(6));
    chain.set_token_balance(dec("100"));
    chain.set_pending_redeem(dec("12.5"));
    let ctx = open(&chain);

    for amount in ["12.5", "12.50", "12.500000"] {
        assert!(matches!(
            ctx.redeem(dec(amount)).await.unwrap_err(),
            OrderError::Validation(ValidationError::EqualsCurrentOrder)
        ));
    }
    assert!(chain.submissions().is_empty());

    ctx.redeem(dec("12.000001")).await.unwrap();
    assert_eq!(
        ctx.wait_terminal().await.unwrap().status,
        ActionStatus::Succeeded
    );
    assert_eq!(
        chain.submissions(),
        vec![BackendCall::Native(NativeCall::UpdateRedeemOrder {
            amount: 12_000_001
        })]
    );
    let state = ctx.state(None).await.unwrap();
    assert_eq!(state.pending_redeem, dec("12.000001"));
    assert_eq!(state.combined_token_balance, dec("112.5"));
}

#[tokio::test(start_paused = true)]
async fn sub_unit_amount_is_refused_not_rounded() {
    let chain = Arc::new(PaperChain::native(6));
    chain.set_currency_balance(dec("10"));
    let ctx = open(&chain);

    match ctx.invest(dec("1.0000001")).await.unwrap_err() {
        OrderError::Rejected(DispatchRejection::AmountNotRepresentable { .. }) => {}
        other => panic!("unexpected error {other:?}"),
    }
    assert!(chain.submissions().is_empty());
    assert!(ctx.current_action().is_none());
}

#[tokio::test]
async fn repeated_reads_are_identical() {
    let chain = Arc::new(PaperChain::native(18));
    chain.set_currency_balance(dec("0.000000000000000001"));
    chain.set_pending_invest(dec("3.3"));
    chain.set_price(dec("1.018"));
    let reader = NativeSnapshotReader::new(chain.clone());
    let key = ContextKey::new("4139607887", "senior", "investor");

    let a = reader.read(&key).await.unwrap();
    let b = reader.read(&key).await.unwrap();
    assert_eq!(a, b);
    let balances = a.balances.as_ready().unwrap();
    assert_eq!(balances.pool_currency, dec("0.000000000000000001"));
}

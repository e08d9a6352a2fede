//! `tpo simulate`: one invest flow against a paper backend.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use tpo_config::OrdersConfig;
use tpo_execution::ActionObserver;
use tpo_runtime::{BackendSelector, OrderContext};
use tpo_schemas::{ActionKind, ActionStatus, ContextKey, Decimal, PendingAction, WalletNetwork};
use tpo_testkit::{PaperChain, PaperPermitSigner};

use super::SimBackend;

const NATIVE_POOL: &str = "2779829532";
const LEGACY_POOL: &str = "0x4cA805cE8EcE2E63FfC1F9f8F2731D3F48DF89Df";
const TRANCHE: &str = "0x6756e091ae798a8e51e12e27ee8facdf";
const PAPER_USER: &str = "0x9a1c3f0d6e2b4a5c7d8e9f00112233445566aabb";
const BRIDGE_CHAIN_ID: u64 = 1;

struct TransitionLog;

impl ActionObserver for TransitionLog {
    fn on_transition(&self, action: &PendingAction) {
        info!(
            id = %action.id,
            kind = %action.kind,
            status = %action.status,
            handle = ?action.handle.as_ref().map(ToString::to_string),
            bridging = ?action.bridging.as_ref().map(ToString::to_string),
            failure = ?action.failure.as_ref().map(ToString::to_string),
            "transition"
        );
    }

    fn on_success(&self, kind: ActionKind) {
        info!(kind = %kind, "order action succeeded");
    }
}

pub async fn run(backend: SimBackend, amount: Decimal, permit: bool, settle: bool) -> Result<()> {
    let chain = Arc::new(match backend {
        SimBackend::Native => PaperChain::native(6),
        SimBackend::Bridge => PaperChain::bridge(6, 18, permit),
        SimBackend::Legacy => PaperChain::legacy(),
    });
    chain.set_currency_balance(amount);
    chain.set_price(Decimal::ONE);

    // Paper confirmations land on the first poll.
    let config = OrdersConfig {
        poll_initial: Duration::from_millis(100),
        poll_max: Duration::from_millis(400),
        ..OrdersConfig::default()
    };

    let mut selector = BackendSelector::new(config).register(chain.clone(), chain.clone())?;
    if permit {
        selector = selector.with_permit_signer(Arc::new(PaperPermitSigner::new()));
    }

    let (pool, network) = match backend {
        SimBackend::Native => (NATIVE_POOL, WalletNetwork::Native),
        SimBackend::Bridge => (
            NATIVE_POOL,
            WalletNetwork::Evm {
                chain_id: BRIDGE_CHAIN_ID,
            },
        ),
        SimBackend::Legacy => (LEGACY_POOL, WalletNetwork::Native),
    };
    let ctx = selector.open(ContextKey::new(pool, TRANCHE, PAPER_USER), network)?;
    ctx.add_observer(Arc::new(TransitionLog));

    ctx.invest(amount).await.context("invest refused")?;
    let outcome = finish(&ctx).await?;
    println!("invest_status={}", outcome.status);

    if settle && outcome.status == ActionStatus::Succeeded {
        chain.settle_epoch();
        ctx.collect().await.context("collect refused")?;
        let outcome = finish(&ctx).await?;
        println!("collect_status={}", outcome.status);
    }

    let state = ctx.state(None).await?;
    println!("backend={}", state.backend);
    println!("pending_invest={}", state.pending_invest);
    println!("pool_currency_balance={}", state.pool_currency_balance);
    println!("tranche_token_balance={}", state.tranche_token_balance);
    Ok(())
}

async fn finish(ctx: &OrderContext) -> Result<PendingAction> {
    let action = ctx
        .wait_terminal()
        .await
        .context("router finished without an action")?;
    if let Some(failure) = &action.failure {
        println!("failure={failure}");
    }
    Ok(action)
}

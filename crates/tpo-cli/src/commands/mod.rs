//! Command handlers for the `tpo` binary.
//!
//! `route` and `config` live here. `simulate` drives the paper backends in
//! `paper`, which only exists with the `testkit` feature.

#[cfg(feature = "testkit")]
mod paper;

use anyhow::{Context, Result};
use clap::ValueEnum;
use tpo_config::{
    load_layered_yaml, report_unused_keys, LoadedConfig, OrdersConfig, UnusedKeyPolicy,
};
use tpo_runtime::select;
use tpo_schemas::{BackendKind, Decimal, PoolId, WalletNetwork};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum SimBackend {
    Native,
    Bridge,
    Legacy,
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

fn load(paths: &[String]) -> Result<LoadedConfig> {
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    load_layered_yaml(&refs).context("load layered config failed")
}

/// Built-in defaults when no config file is given.
pub fn load_orders_config(paths: &[String]) -> Result<OrdersConfig> {
    if paths.is_empty() {
        return Ok(OrdersConfig::default());
    }
    let loaded = load(paths)?;
    OrdersConfig::from_config_json(&loaded.config_json)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn route(pool_id: &str, evm_chain: Option<u64>, config_paths: &[String]) -> Result<()> {
    let cfg = load_orders_config(config_paths)?;
    let pool = PoolId::new(pool_id);
    let network = match evm_chain {
        Some(chain_id) => WalletNetwork::Evm { chain_id },
        None => WalletNetwork::Native,
    };

    let backend = select(&pool, network, &cfg.evm_chain_ids);
    println!("backend={backend}");

    if let (BackendKind::EvmBridge, WalletNetwork::Evm { chain_id }) = (backend, network) {
        println!(
            "bridge_deployed={}",
            cfg.bridge_deployed_on(pool.as_str(), chain_id)
        );
    }
    Ok(())
}

pub fn config(paths: &[String], fail_on_unused: bool) -> Result<()> {
    let loaded = load(paths)?;

    let policy = if fail_on_unused {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&loaded.config_json, policy)?;

    // Typed view must also parse; bounds errors surface here.
    OrdersConfig::from_config_json(&loaded.config_json)?;

    println!("config_hash={}", loaded.config_hash);
    println!(
        "unused_keys={}",
        serde_json::to_string(&report.unused_leaf_pointers)?
    );
    println!("{}", loaded.canonical_json);
    Ok(())
}

#[cfg(feature = "testkit")]
pub async fn simulate(
    backend: SimBackend,
    amount: Decimal,
    permit: bool,
    settle: bool,
) -> Result<()> {
    paper::run(backend, amount, permit, settle).await
}

#[cfg(not(feature = "testkit"))]
pub async fn simulate(
    _backend: SimBackend,
    _amount: Decimal,
    _permit: bool,
    _settle: bool,
) -> Result<()> {
    anyhow::bail!("simulate is unavailable: rebuild tpo with `--features testkit`")
}

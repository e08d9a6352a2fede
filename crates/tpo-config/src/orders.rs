//! Typed view of the order-core keys.
//!
//! Every key is optional; absent keys take the defaults below. Present keys
//! with the wrong type are rejected rather than silently defaulted.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde_json::Value;

/// Mainnet, Base, Arbitrum One, Celo.
pub const DEFAULT_EVM_CHAIN_IDS: &[u64] = &[1, 8453, 42161, 42220];

const DEFAULT_POLL_INITIAL_MS: u64 = 1_000;
const DEFAULT_POLL_MAX_MS: u64 = 8_000;
const DEFAULT_CONFIRMATION_TIMEOUT_SECS: u64 = 180;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrdersConfig {
    pub poll_initial: Duration,
    pub poll_max: Duration,
    /// Cap on waiting for a transaction to be observed at all.
    pub confirmation_timeout: Duration,
    /// Approve the maximum raw allowance instead of the requested amount.
    pub approve_unlimited: bool,
    /// Wallet chain ids that put a context on the EVM bridge.
    pub evm_chain_ids: Vec<u64>,
    /// Pool id -> chain ids with a liquidity-pool deployment. Pools without
    /// an entry are not restricted.
    pub bridge_deployments: BTreeMap<String, Vec<u64>>,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            poll_initial: Duration::from_millis(DEFAULT_POLL_INITIAL_MS),
            poll_max: Duration::from_millis(DEFAULT_POLL_MAX_MS),
            confirmation_timeout: Duration::from_secs(DEFAULT_CONFIRMATION_TIMEOUT_SECS),
            approve_unlimited: false,
            evm_chain_ids: DEFAULT_EVM_CHAIN_IDS.to_vec(),
            bridge_deployments: BTreeMap::new(),
        }
    }
}

impl OrdersConfig {
    /// Build from canonical config JSON (produced by `load_layered_yaml*`).
    pub fn from_config_json(cfg: &Value) -> Result<Self> {
        let initial_ms =
            read_u64(cfg, "/router/poll_initial_ms")?.unwrap_or(DEFAULT_POLL_INITIAL_MS);
        let max_ms = read_u64(cfg, "/router/poll_max_ms")?.unwrap_or(DEFAULT_POLL_MAX_MS);
        let timeout_secs = read_u64(cfg, "/router/confirmation_timeout_secs")?
            .unwrap_or(DEFAULT_CONFIRMATION_TIMEOUT_SECS);

        if initial_ms == 0 {
            bail!("router.poll_initial_ms must be positive");
        }
        if max_ms < initial_ms {
            bail!("router.poll_max_ms ({max_ms}) must be >= router.poll_initial_ms ({initial_ms})");
        }
        if timeout_secs == 0 {
            bail!("router.confirmation_timeout_secs must be positive");
        }

        let approve_unlimited = match cfg.pointer("/approval/unlimited") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => bail!("approval.unlimited must be a boolean (got {other})"),
        };

        let evm_chain_ids = match cfg.pointer("/selector/evm_chain_ids") {
            None | Some(Value::Null) => DEFAULT_EVM_CHAIN_IDS.to_vec(),
            Some(v) => chain_id_list(v, "selector.evm_chain_ids")?,
        };

        let mut bridge_deployments = BTreeMap::new();
        match cfg.pointer("/selector/bridge_deployments") {
            None | Some(Value::Null) => {}
            Some(Value::Object(map)) => {
                for (pool, chains) in map {
                    let what = format!("selector.bridge_deployments.{pool}");
                    bridge_deployments.insert(pool.clone(), chain_id_list(chains, &what)?);
                }
            }
            Some(other) => {
                bail!(
                    "selector.bridge_deployments must be a map of pool id -> chain ids (got {other})"
                )
            }
        }

        Ok(Self {
            poll_initial: Duration::from_millis(initial_ms),
            poll_max: Duration::from_millis(max_ms),
            confirmation_timeout: Duration::from_secs(timeout_secs),
            approve_unlimited,
            evm_chain_ids,
            bridge_deployments,
        })
    }

    pub fn is_evm_chain(&self, chain_id: u64) -> bool {
        self.evm_chain_ids.contains(&chain_id)
    }

    /// `true` when the pool may be opened as a bridge context on `chain_id`.
    pub fn bridge_deployed_on(&self, pool: &str, chain_id: u64) -> bool {
        self.bridge_deployments
            .get(pool)
            .map(|chains| chains.contains(&chain_id))
            .unwrap_or(true)
    }
}

fn read_u64(cfg: &Value, pointer: &str) -> Result<Option<u64>> {
    match cfg.pointer(pointer) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| anyhow!("{} must be a non-negative integer (got {v})", dotted(pointer))),
    }
}

fn chain_id_list(v: &Value, what: &str) -> Result<Vec<u64>> {
    let arr = v
        .as_array()
        .ok_or_else(|| anyhow!("{what} must be a list of chain ids (got {v})"))?;
    arr.iter()
        .map(|id| {
            id.as_u64()
                .ok_or_else(|| anyhow!("{what} contains a non-integer chain id: {id}"))
        })
        .collect()
}

fn dotted(pointer: &str) -> String {
    pointer.trim_start_matches('/').replace('/', ".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_takes_defaults() {
        let c = OrdersConfig::from_config_json(&json!({})).unwrap();
        assert_eq!(c, OrdersConfig::default());
        assert_eq!(c.poll_initial, Duration::from_secs(1));
        assert_eq!(c.confirmation_timeout, Duration::from_secs(180));
        assert!(c.is_evm_chain(8453));
        assert!(!c.is_evm_chain(5));
    }

    #[test]
    fn wrong_types_are_rejected() {
        let err = OrdersConfig::from_config_json(&json!({"router": {"poll_max_ms": "fast"}}))
            .unwrap_err();
        assert!(err.to_string().contains("router.poll_max_ms"));

        let cfg = json!({"approval": {"unlimited": "yes"}});
        assert!(OrdersConfig::from_config_json(&cfg).is_err());
        assert!(
            OrdersConfig::from_config_json(&json!({"selector": {"evm_chain_ids": [1, "two"]}}))
                .is_err()
        );
    }

    #[test]
    fn backoff_bounds_are_checked() {
        let cfg = json!({"router": {"poll_initial_ms": 5000, "poll_max_ms": 1000}});
        assert!(OrdersConfig::from_config_json(&cfg).is_err());
        let cfg = json!({"router": {"poll_initial_ms": 0}});
        assert!(OrdersConfig::from_config_json(&cfg).is_err());
    }

    #[test]
    fn unlisted_pools_are_unrestricted() {
        let cfg = json!({"selector": {"bridge_deployments": {"1615768079": [8453]}}});
        let c = OrdersConfig::from_config_json(&cfg).unwrap();
        assert!(c.bridge_deployed_on("1615768079", 8453));
        assert!(!c.bridge_deployed_on("1615768079", 1));
        assert!(c.bridge_deployed_on("4139607887", 1));
    }
}

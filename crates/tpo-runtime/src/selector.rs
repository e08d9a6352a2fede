//! Backend selection and context construction.
//!
//! Routing is a static, side-effect-free classification of the pool id and
//! the wallet's network:
//!
//! ```text
//!   pool id is 0x + 40 hex ─────────────────────────────► LegacyEvm
//!   wallet on a configured EVM chain ───────────────────► EvmBridge
//!   otherwise ──────────────────────────────────────────► Native
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use tpo_config::OrdersConfig;
use tpo_execution::{PermitSigner, RouterSettings, TransactionSubmitter};
use tpo_schemas::{BackendKind, ContextKey, PoolId, WalletNetwork};
use tpo_snapshot::{PoolMetadataProvider, SnapshotReader};

use crate::context::OrderContext;
use crate::error::SelectError;
use crate::router_settings;

pub fn select(pool: &PoolId, network: WalletNetwork, evm_chain_ids: &[u64]) -> BackendKind {
    if pool.is_hex_address() {
        return BackendKind::LegacyEvm;
    }
    match network {
        WalletNetwork::Evm { chain_id } if evm_chain_ids.contains(&chain_id) => {
            BackendKind::EvmBridge
        }
        _ => BackendKind::Native,
    }
}

/// Reader and submitter for one backend family.
#[derive(Clone)]
pub struct BackendServices {
    pub reader: Arc<dyn SnapshotReader>,
    pub submitter: Arc<dyn TransactionSubmitter>,
}

/// Everything a context needs besides its key; cloned into each context so
/// `switch_tranche` can rebuild without going back to the selector.
#[derive(Clone)]
pub(crate) struct Wiring {
    pub(crate) services: BackendServices,
    pub(crate) signer: Option<Arc<dyn PermitSigner>>,
    pub(crate) metadata: Option<Arc<dyn PoolMetadataProvider>>,
    pub(crate) settings: RouterSettings,
}

pub struct BackendSelector {
    config: OrdersConfig,
    backends: BTreeMap<BackendKind, BackendServices>,
    signer: Option<Arc<dyn PermitSigner>>,
    metadata: Option<Arc<dyn PoolMetadataProvider>>,
}

impl BackendSelector {
    pub fn new(config: OrdersConfig) -> Self {
        Self {
            config,
            backends: BTreeMap::new(),
            signer: None,
            metadata: None,
        }
    }

    /// Register a backend family. Replaces an earlier registration of the
    /// same kind.
    pub fn register(
        mut self,
        reader: Arc<dyn SnapshotReader>,
        submitter: Arc<dyn TransactionSubmitter>,
    ) -> Result<Self, SelectError> {
        let kind = reader.backend();
        if submitter.backend() != kind {
            return Err(SelectError::BackendMismatch {
                reader: kind,
                submitter: submitter.backend(),
            });
        }
        self.backends
            .insert(kind, BackendServices { reader, submitter });
        Ok(self)
    }

    /// Enables the permit shortcut where the pool currency supports it.
    pub fn with_permit_signer(mut self, signer: Arc<dyn PermitSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_metadata(mut self, provider: Arc<dyn PoolMetadataProvider>) -> Self {
        self.metadata = Some(provider);
        self
    }

    pub fn config(&self) -> &OrdersConfig {
        &self.config
    }

    pub fn route(&self, pool: &PoolId, network: WalletNetwork) -> BackendKind {
        select(pool, network, &self.config.evm_chain_ids)
    }

    /// Build a fresh context: its own router, no carried-over action.
    pub fn open(
        &self,
        key: ContextKey,
        network: WalletNetwork,
    ) -> Result<OrderContext, SelectError> {
        let backend = self.route(&key.pool, network);

        if let (BackendKind::EvmBridge, WalletNetwork::Evm { chain_id }) = (backend, network) {
            if !self.config.bridge_deployed_on(key.pool.as_str(), chain_id) {
                return Err(SelectError::NoBridgeDeployment {
                    pool: key.pool.clone(),
                    chain_id,
                });
            }
        }

        let services = self
            .backends
            .get(&backend)
            .cloned()
            .ok_or(SelectError::BackendUnavailable { backend })?;

        info!(context = %key, backend = %backend, "order context opened");
        Ok(OrderContext::new(
            key,
            network,
            Wiring {
                services,
                signer: self.signer.clone(),
                metadata: self.metadata.clone(),
                settings: router_settings(&self.config),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpo_config::DEFAULT_EVM_CHAIN_IDS;

    const LEGACY_POOL: &str = "0x4cA805cE8EcE2E63FfC1F9f8F2731D3F48DF89Df";

    #[test]
    fn hex_address_pools_are_legacy_on_any_network() {
        let pool = PoolId::new(LEGACY_POOL);
        for network in [
            WalletNetwork::Native,
            WalletNetwork::Evm { chain_id: 1 },
            WalletNetwork::Evm { chain_id: 8453 },
        ] {
            assert_eq!(
                select(&pool, network, DEFAULT_EVM_CHAIN_IDS),
                BackendKind::LegacyEvm
            );
        }
    }

    #[test]
    fn native_pools_follow_wallet_network() {
        let pool = PoolId::new("1615768079");
        assert_eq!(
            select(&pool, WalletNetwork::Native, DEFAULT_EVM_CHAIN_IDS),
            BackendKind::Native
        );
        assert_eq!(
            select(&pool, WalletNetwork::Evm { chain_id: 42220 }, DEFAULT_EVM_CHAIN_IDS),
            BackendKind::EvmBridge
        );
        // Unknown chain ids do not indicate an EVM context.
        assert_eq!(
            select(&pool, WalletNetwork::Evm { chain_id: 5 }, DEFAULT_EVM_CHAIN_IDS),
            BackendKind::Native
        );
    }

    #[test]
    fn short_hex_pool_id_is_not_legacy() {
        let pool = PoolId::new("0x4cA805cE");
        assert_eq!(
            select(&pool, WalletNetwork::Native, DEFAULT_EVM_CHAIN_IDS),
            BackendKind::Native
        );
    }
}

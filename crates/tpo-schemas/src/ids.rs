use std::fmt;

use serde::{Deserialize, Serialize};

/// Pool identifier exactly as the caller supplied it.
///
/// Native pools use decimal ids (e.g. `"4139607887"`); legacy pools use the
/// root contract address (`0x` + 40 hex digits).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(pub String);

impl PoolId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the id has the shape of an EVM contract address.
    pub fn is_hex_address(&self) -> bool {
        is_hex_address(&self.0)
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tranche identifier within a pool (senior / junior / ...).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrancheId(pub String);

impl TrancheId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrancheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Investor address on whichever chain the context lives on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The (pool, tranche, user) tuple that owns exactly one reader and one router.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContextKey {
    pub pool: PoolId,
    pub tranche: TrancheId,
    pub user: Address,
}

impl ContextKey {
    pub fn new(
        pool: impl Into<String>,
        tranche: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            pool: PoolId::new(pool),
            tranche: TrancheId::new(tranche),
            user: Address::new(user),
        }
    }

    /// Same pool and user, different tranche.
    pub fn with_tranche(&self, tranche: TrancheId) -> Self {
        Self {
            pool: self.pool.clone(),
            tranche,
            user: self.user.clone(),
        }
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.pool, self.tranche, self.user)
    }
}

/// Which backend governs a context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// The pool's own chain module.
    Native,
    /// Liquidity-pool contracts on an EVM chain, bridged to the native chain.
    EvmBridge,
    /// Transitional lending-pool contract family on Ethereum.
    LegacyEvm,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::EvmBridge => "evm_bridge",
            BackendKind::LegacyEvm => "legacy_evm",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Network the connected wallet reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletNetwork {
    /// Wallet connected to the native chain (or no wallet yet).
    Native,
    /// Wallet connected to an EVM chain with the given chain id.
    Evm { chain_id: u64 },
}

fn is_hex_address(s: &str) -> bool {
    let Some(body) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) else {
        return false;
    };
    body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit())
}

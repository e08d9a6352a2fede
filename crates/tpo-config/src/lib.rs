//! tpo-config
//!
//! Layered YAML configuration for the order core.
//!
//! - Documents are deep-merged in order; later layers override earlier ones.
//! - The merged tree is canonicalised to JSON and hashed (SHA-256), so two
//!   processes with the same effective config report the same hash.
//! - Literal secrets are refused (`CONFIG_SECRET_DETECTED`). Config stores
//!   env var names, never keys.
//! - `report_unused_keys` lists leaves nothing reads.
//! - `OrdersConfig` is the typed view consumed by the runtime.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

mod consumption;
mod orders;

pub use consumption::{consumed_pointers, report_unused_keys, UnusedKeyPolicy, UnusedKeyReport};
pub use orders::{OrdersConfig, DEFAULT_EVM_CHAIN_IDS};

/// Leaf strings starting with one of these abort loading: signing material
/// and provider credentials belong in the environment.
const SECRET_PREFIXES: &[&str] = &[
    "-----BEGIN", // PEM keys
    "xprv",       // BIP32 extended private keys
    "tprv",       // BIP32 testnet extended private keys
    "sk-",        // hosted RPC / API keys
    "AKIA",       // cloud access key ids (KMS signers)
    "ghp_",       // deploy tokens
];

/// Merged config plus its canonical form and hash.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

/// Reads each path in order (base first) and merges the layers.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("cannot read config layer {p}")))
        .collect::<Result<Vec<String>>>()?;
    let layers: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&layers)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let merged = yaml_docs
        .iter()
        .enumerate()
        .try_fold(Value::Object(Default::default()), |acc, (layer, raw)| {
            let doc: serde_yaml::Value = serde_yaml::from_str(raw)
                .with_context(|| format!("config layer {layer} is not valid yaml"))?;
            let doc = serde_json::to_value(doc)
                .with_context(|| format!("config layer {layer} has no json form"))?;
            Ok::<_, anyhow::Error>(deep_merge(acc, doc))
        })?;

    enforce_no_secret_literals(&merged)?;

    let canonical_json = canonicalize_json(&merged)?;
    Ok(LoadedConfig {
        config_hash: sha256_hex(canonical_json.as_bytes()),
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; anything else in `b` replaces `a` (arrays included).
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base), Value::Object(overlay)) => {
            for (key, top) in overlay {
                let below = base.remove(&key).unwrap_or(Value::Null);
                base.insert(key, deep_merge(below, top));
            }
            Value::Object(base)
        }
        (_, top) => top,
    }
}

/// serde_json's default map is ordered by key, so compact serialization is canonical.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// The error names the leaf pointer only; the value never reaches a log.
fn enforce_no_secret_literals(v: &Value) -> Result<()> {
    let mut leaves = Vec::new();
    consumption::collect_leaf_pointers(v, "", &mut leaves);

    let flagged = leaves.into_iter().find(|ptr| {
        v.pointer(ptr)
            .and_then(Value::as_str)
            .is_some_and(looks_like_secret)
    });
    match flagged {
        Some(ptr) => bail!("CONFIG_SECRET_DETECTED leaf={ptr} value=REDACTED"),
        None => Ok(()),
    }
}

fn looks_like_secret(s: &str) -> bool {
    let s = s.trim();
    if s.len() < 8 {
        return false;
    }
    is_raw_private_key(s) || SECRET_PREFIXES.iter().any(|prefix| s.starts_with(prefix))
}

/// `0x` followed by exactly 64 hex digits: a raw 32-byte EVM private key.
fn is_raw_private_key(s: &str) -> bool {
    let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"));
    matches!(body, Some(b) if b.len() == 64 && b.bytes().all(|c| c.is_ascii_hexdigit()))
}

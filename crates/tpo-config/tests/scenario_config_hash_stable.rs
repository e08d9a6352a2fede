//! Scenario: config hash stability.
//!
//! - The same layers always produce the same hash.
//! - Key order inside a document does not change the hash.
//! - Different values produce different hashes.
//! - Overlays override the base layer key by key.

use tpo_config::{load_layered_yaml, load_layered_yaml_from_strings, OrdersConfig};

const BASE_YAML: &str = r#"
router:
  poll_initial_ms: 1000
  poll_max_ms: 8000
  confirmation_timeout_secs: 180
approval:
  unlimited: false
selector:
  evm_chain_ids: [1, 8453, 42161, 42220]
"#;

const BASE_YAML_REORDERED: &str = r#"
selector:
  evm_chain_ids: [1, 8453, 42161, 42220]
approval:
  unlimited: false
router:
  confirmation_timeout_secs: 180
  poll_max_ms: 8000
  poll_initial_ms: 1000
"#;

const OVERLAY_YAML: &str = r#"
router:
  confirmation_timeout_secs: 300
approval:
  unlimited: true
selector:
  bridge_deployments:
    "1615768079": [8453, 42220]
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let original = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let reordered = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();
    assert_eq!(original.config_hash, reordered.config_hash);
    assert_eq!(original.canonical_json, reordered.canonical_json);
}

#[test]
fn different_values_produce_different_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_ne!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_takes_effect_in_typed_view() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let cfg = OrdersConfig::from_config_json(&loaded.config_json).unwrap();

    assert_eq!(cfg.confirmation_timeout.as_secs(), 300);
    // Untouched base keys survive the overlay.
    assert_eq!(cfg.poll_max.as_millis(), 8000);
    assert!(cfg.approve_unlimited);
    assert_eq!(cfg.evm_chain_ids, vec![1, 8453, 42161, 42220]);
    assert_eq!(
        cfg.bridge_deployments.get("1615768079"),
        Some(&vec![8453, 42220])
    );
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn files_load_like_strings() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.yaml");
    let overlay = dir.path().join("overlay.yaml");
    std::fs::write(&base, BASE_YAML).unwrap();
    std::fs::write(&overlay, OVERLAY_YAML).unwrap();

    let from_files = load_layered_yaml(&[
        base.to_str().unwrap(),
        overlay.to_str().unwrap(),
    ])
    .unwrap();
    let from_strings = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    assert_eq!(from_files.config_hash, from_strings.config_hash);

    let missing = dir.path().join("missing.yaml");
    let err = load_layered_yaml(&[missing.to_str().unwrap()]).unwrap_err();
    assert!(err.to_string().contains("failed to read yaml path"));
}

//! Scenario: `tpo route` classifies pools and wallet networks.
//!
//! A hex pool id is always LegacyEvm, a wallet on a configured EVM chain
//! goes through the bridge, and everything else is Native. A config file can
//! narrow which chains have a bridge deployment for a pool.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const LEGACY_POOL: &str = "0x4cA805cE8EcE2E63FfC1F9f8F2731D3F48DF89Df";

#[test]
fn hex_pool_routes_to_legacy_even_on_evm() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["route", LEGACY_POOL, "--evm-chain", "8453"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend=legacy_evm"));
}

#[test]
fn native_pool_on_known_evm_chain_routes_to_bridge() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["route", "2779829532", "--evm-chain", "42161"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend=evm_bridge"))
        .stdout(predicate::str::contains("bridge_deployed=true"));
}

#[test]
fn unknown_chain_and_no_wallet_route_native() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["route", "2779829532", "--evm-chain", "5"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend=native"));

    Command::cargo_bin("tpo")
        .unwrap()
        .args(["route", "2779829532"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend=native"));
}

#[test]
fn config_limits_bridge_deployments() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        "selector:\n  bridge_deployments:\n    \"2779829532\": [1]\n"
    )
    .unwrap();
    let path = f.path().to_str().unwrap().to_string();

    Command::cargo_bin("tpo")
        .unwrap()
        .args(["route", "2779829532", "--evm-chain", "8453", "--config", &path])
        .assert()
        .success()
        .stdout(predicate::str::contains("backend=evm_bridge"))
        .stdout(predicate::str::contains("bridge_deployed=false"));
}

//! Scenario: `tpo simulate` drives a paper invest flow to completion.
//!
//! The paper flows run only in a `testkit` build; other builds refuse the
//! command with a hint.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::process::Command;

#[cfg(feature = "testkit")]
#[test]
fn legacy_invest_approves_then_succeeds() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["simulate", "--backend", "legacy", "--amount", "250"])
        .assert()
        .success()
        .stdout(predicate::str::contains("invest_status=succeeded"))
        .stderr(predicate::str::contains("approvePoolCurrency"));
}

#[cfg(feature = "testkit")]
#[test]
fn native_invest_settles_and_collects() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["simulate", "--backend", "native", "--amount", "100", "--settle"])
        .assert()
        .success()
        .stdout(predicate::str::contains("invest_status=succeeded"))
        .stdout(predicate::str::contains("collect_status=succeeded"));
}

#[test]
fn unknown_backend_is_rejected() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["simulate", "--backend", "solana", "--amount", "1"])
        .assert()
        .failure();
}

#[cfg(not(feature = "testkit"))]
#[test]
fn simulate_needs_testkit_build() {
    Command::cargo_bin("tpo")
        .unwrap()
        .args(["simulate", "--backend", "native", "--amount", "10"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--features testkit"));
}

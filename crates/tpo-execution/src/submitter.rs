//! Narrow boundaries to the chain: transaction submission, status queries
//! and permit signing.
//!
//! Contract encoding, wallet prompts and RPC transport live behind these
//! traits; the router depends on nothing else.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tpo_schemas::{Address, BackendKind, TransactionHandle};

use crate::calls::BackendCall;

// ---------------------------------------------------------------------------
// TxStatus
// ---------------------------------------------------------------------------

/// What the chain currently says about a submitted transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    /// Broadcast but not seen in a block.
    Unconfirmed,
    /// In a block, not final yet.
    Mined,
    /// Final on the source chain; effect not yet visible on the companion chain.
    AwaitingCompanion,
    Succeeded,
    /// Mined and reverted.
    Reverted { reason: String },
}

// ---------------------------------------------------------------------------
// SubmitError
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitError {
    /// The wallet refused to sign.
    WalletRejected(String),
    /// The node refused the transaction (nonce, gas, simulation revert).
    NodeRejected(String),
    /// Could not reach the node.
    Transport(String),
    /// The call does not belong to this submitter's backend.
    WrongBackend {
        expected: BackendKind,
        got: BackendKind,
    },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::WalletRejected(msg) => write!(f, "wallet rejected the request: {msg}"),
            SubmitError::NodeRejected(msg) => write!(f, "node rejected the transaction: {msg}"),
            SubmitError::Transport(msg) => write!(f, "could not reach the node: {msg}"),
            SubmitError::WrongBackend { expected, got } => {
                write!(f, "call for {got} sent to a {expected} submitter")
            }
        }
    }
}

impl std::error::Error for SubmitError {}

// ---------------------------------------------------------------------------
// TransactionSubmitter
// ---------------------------------------------------------------------------

/// Per chain-family transaction boundary.
///
/// `submit` returns once the call is broadcast (after any wallet prompt);
/// `status` is polled by the router until the transaction is final.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
    fn backend(&self) -> BackendKind;

    async fn submit(&self, call: &BackendCall) -> Result<TransactionHandle, SubmitError>;

    async fn status(&self, handle: &TransactionHandle) -> Result<TxStatus, SubmitError>;
}

// ---------------------------------------------------------------------------
// Permits
// ---------------------------------------------------------------------------

/// Message the wallet is asked to sign.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermitRequest {
    pub owner: Address,
    /// Raw currency amount the permit authorises.
    pub value: u128,
}

/// Signed EIP-2612 style permit attached to a deposit request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Permit {
    pub value: u128,
    pub deadline: DateTime<Utc>,
    /// Hex-encoded signature.
    pub signature: String,
}

#[async_trait]
pub trait PermitSigner: Send + Sync {
    async fn sign(&self, req: &PermitRequest) -> Result<Permit, SubmitError>;
}

use std::fmt;

use tpo_execution::{DispatchRejection, ValidationError};
use tpo_schemas::{BackendKind, PoolId};
use tpo_snapshot::SnapshotError;

// ---------------------------------------------------------------------------
// SelectError
// ---------------------------------------------------------------------------

/// A context could not be opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectError {
    /// Nothing is registered for the backend the pool routes to.
    BackendUnavailable { backend: BackendKind },
    /// The pool has no liquidity-pool deployment on the wallet's chain.
    NoBridgeDeployment { pool: PoolId, chain_id: u64 },
    /// Reader and submitter registered together disagree on their backend.
    BackendMismatch {
        reader: BackendKind,
        submitter: BackendKind,
    },
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectError::BackendUnavailable { backend } => {
                write!(f, "No connection is available for {backend} pools")
            }
            SelectError::NoBridgeDeployment { pool, chain_id } => write!(
                f,
                "Pool {pool} cannot be invested in from chain {chain_id}; switch networks"
            ),
            SelectError::BackendMismatch { reader, submitter } => write!(
                f,
                "reader for {reader} registered with a {submitter} submitter"
            ),
        }
    }
}

impl std::error::Error for SelectError {}

// ---------------------------------------------------------------------------
// OrderError
// ---------------------------------------------------------------------------

/// Why an order operation on a context did not start an action.
#[derive(Debug)]
pub enum OrderError {
    /// Amount check failed; nothing was dispatched.
    Validation(ValidationError),
    /// Router refused the dispatch.
    Rejected(DispatchRejection),
    /// Fresh state could not be read.
    Snapshot(SnapshotError),
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderError::Validation(e) => write!(f, "{e}"),
            OrderError::Rejected(e) => write!(f, "{e}"),
            OrderError::Snapshot(e) => write!(f, "Could not load your position: {e}"),
        }
    }
}

impl std::error::Error for OrderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrderError::Validation(e) => Some(e),
            OrderError::Rejected(e) => Some(e),
            OrderError::Snapshot(e) => Some(e),
        }
    }
}

impl From<ValidationError> for OrderError {
    fn from(e: ValidationError) -> Self {
        OrderError::Validation(e)
    }
}

impl From<DispatchRejection> for OrderError {
    fn from(e: DispatchRejection) -> Self {
        OrderError::Rejected(e)
    }
}

impl From<SnapshotError> for OrderError {
    fn from(e: SnapshotError) -> Self {
        OrderError::Snapshot(e)
    }
}

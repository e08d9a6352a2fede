use std::fmt;

// ---------------------------------------------------------------------------
// SourceError
// ---------------------------------------------------------------------------

/// Errors a backend data source may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Network or transport failure talking to the node / indexer.
    Transport(String),
    /// The node answered with an RPC-level error.
    Rpc { code: Option<i64>, message: String },
    /// A response payload could not be decoded.
    Decode(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Transport(msg) => write!(f, "transport error: {msg}"),
            SourceError::Rpc {
                code: Some(c),
                message,
            } => write!(f, "rpc error code={c}: {message}"),
            SourceError::Rpc {
                code: None,
                message,
            } => write!(f, "rpc error: {message}"),
            SourceError::Decode(msg) => write!(f, "decode error: {msg}"),
        }
    }
}

impl std::error::Error for SourceError {}

// ---------------------------------------------------------------------------
// SnapshotError
// ---------------------------------------------------------------------------

/// All errors that can occur while reading and normalizing a snapshot.
///
/// A section that has not loaded yet is *not* an error; it is reported as
/// `Loadable::Loading` inside the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    /// A raw amount could not be parsed or converted at the backend's decimals.
    InvalidAmount {
        field: &'static str,
        raw: String,
        reason: String,
    },
    /// The underlying data source failed.
    Source(SourceError),
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotError::InvalidAmount { field, raw, reason } => {
                write!(f, "field '{field}' has invalid amount '{raw}': {reason}")
            }
            SnapshotError::Source(e) => write!(f, "data source failed: {e}"),
        }
    }
}

impl std::error::Error for SnapshotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SnapshotError::Source(e) => Some(e),
            SnapshotError::InvalidAmount { .. } => None,
        }
    }
}

impl From<SourceError> for SnapshotError {
    fn from(e: SourceError) -> Self {
        SnapshotError::Source(e)
    }
}

//! tpo-testkit
//!
//! Deterministic "paper" backends for all three chain families: a ledger
//! that is both data source and transaction submitter, a permit signer and a
//! pool metadata provider. Used by scenario tests and `tpo simulate`.

mod chain;
mod metadata;
mod signer;

pub use chain::{PaperChain, TxPlan};
pub use metadata::PaperMetadata;
pub use signer::PaperPermitSigner;

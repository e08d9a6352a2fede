//! tpo-runtime
//!
//! Wires readers, submitters and the router into one `OrderContext` per
//! (pool, tranche, investor).
//!
//! - `select`: static routing of a pool id (plus wallet network) to a backend
//! - `BackendSelector`: holds the registered collaborators and opens contexts
//! - `OrderContext`: fresh state on demand, validated dispatch, teardown
//!
//! There is no process-wide registry: every context owns its reader handle
//! and its own router. Dropping a context stops its tracking task.

mod context;
mod error;
mod selector;

pub use context::OrderContext;
pub use error::{OrderError, SelectError};
pub use selector::{select, BackendSelector, BackendServices};

use std::time::Duration;

use tpo_config::OrdersConfig;
use tpo_execution::{PollSettings, RouterSettings};

/// Router settings from the typed config view.
pub fn router_settings(cfg: &OrdersConfig) -> RouterSettings {
    RouterSettings {
        poll: PollSettings {
            initial: cfg.poll_initial,
            max: cfg.poll_max.max(cfg.poll_initial),
            confirmation_timeout: cfg.confirmation_timeout.max(Duration::from_secs(1)),
        },
        approve_unlimited: cfg.approve_unlimited,
    }
}

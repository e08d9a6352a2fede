use std::sync::Mutex;

use async_trait::async_trait;

use tpo_schemas::{Address, Decimal, Loadable, PoolId, PoolMetadata, TrancheId};
use tpo_snapshot::{PoolMetadataProvider, SourceError};

/// Fixed pool metadata, replaceable between reads.
pub struct PaperMetadata {
    current: Mutex<Loadable<PoolMetadata>>,
}

impl PaperMetadata {
    pub fn new(min_initial_investment: Option<Decimal>) -> Self {
        Self {
            current: Mutex::new(Loadable::Ready(PoolMetadata {
                min_initial_investment,
                investor_eligible: true,
            })),
        }
    }

    pub fn set(&self, metadata: Loadable<PoolMetadata>) {
        *self.current.lock().unwrap_or_else(|p| p.into_inner()) = metadata;
    }
}

impl Default for PaperMetadata {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl PoolMetadataProvider for PaperMetadata {
    async fn metadata(
        &self,
        _pool: &PoolId,
        _tranche: &TrancheId,
        _investor: &Address,
    ) -> Result<Loadable<PoolMetadata>, SourceError> {
        Ok(self
            .current
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone())
    }
}

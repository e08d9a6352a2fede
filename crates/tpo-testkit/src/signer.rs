use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use tpo_execution::{Permit, PermitRequest, PermitSigner, SubmitError};

/// Signs every permit with a deterministic fake signature unless told to
/// refuse.
#[derive(Default)]
pub struct PaperPermitSigner {
    refuse: AtomicBool,
    signed: AtomicU32,
}

impl PaperPermitSigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the investor declining the signature prompt.
    pub fn refuse_signatures(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn signed_count(&self) -> u32 {
        self.signed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PermitSigner for PaperPermitSigner {
    async fn sign(&self, req: &PermitRequest) -> Result<Permit, SubmitError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(SubmitError::WalletRejected(
                "user denied message signature".to_string(),
            ));
        }
        let n = self.signed.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Permit {
            value: req.value,
            deadline: Utc::now() + Duration::hours(1),
            signature: format!("0x{n:0130x}"),
        })
    }
}

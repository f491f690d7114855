use std::collections::HashSet;
use std::sync::Mutex;

use crate::model::{store::StoreError, token::VotingToken};

/// The set of spent tokens: the sole authority on whether a token has voted.
#[rocket::async_trait]
pub trait Ledger: Send + Sync {
    /// Atomically mark `token` as spent. Returns true iff it was not already spent.
    async fn insert_if_absent(&self, token: VotingToken) -> Result<bool, StoreError>;

    async fn contains(&self, token: VotingToken) -> Result<bool, StoreError>;
}

/// A process-local ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    spent: Mutex<HashSet<VotingToken>>,
}

impl MemoryLedger {
    fn spent(&self) -> std::sync::MutexGuard<'_, HashSet<VotingToken>> {
        // A panic while holding the lock cannot leave the set half-updated.
        self.spent.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[rocket::async_trait]
impl Ledger for MemoryLedger {
    async fn insert_if_absent(&self, token: VotingToken) -> Result<bool, StoreError> {
        Ok(self.spent().insert(token))
    }

    async fn contains(&self, token: VotingToken) -> Result<bool, StoreError> {
        Ok(self.spent().contains(&token))
    }
}

use crate::{
    account::AccountId,
    error::TapError,
    store::BalanceStore,
};
use std::sync::Arc;
use tracing::{
    debug,
    warn,
};

/// Sends one absolute balance update per call. Retrying is the caller's job.
pub struct SyncFlusher<S> {
    store: Arc<S>,
}

impl<S> Clone for SyncFlusher<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: BalanceStore> SyncFlusher<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn flush(&self, account_id: &AccountId, target_balance: u64) -> Result<u64, TapError> {
        match self.store.update_balance(account_id, target_balance).await {
            Ok(confirmed) => {
                if confirmed != target_balance {
                    warn!(%account_id, target_balance, confirmed, "balance diverged from requested value");
                } else {
                    debug!(%account_id, confirmed, "balance flushed");
                }
                Ok(confirmed)
            }
            Err(source) => {
                warn!(%account_id, target_balance, error = %source, "balance flush failed");
                Err(TapError::FlushFailed {
                    account_id: account_id.clone(),
                    target_balance,
                    source,
                })
            }
        }
    }
}

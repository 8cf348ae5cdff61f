use crate::account::AccountId;
use thiserror::Error;

/// Failures reported by a [`crate::store::BalanceStore`] backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("account '{display_name}' already exists")]
    AlreadyExists { display_name: String },

    #[error("unknown account id {0}")]
    InvalidAccount(AccountId),

    #[error("backend rejected request: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed backend payload: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum TapError {
    #[error("no usable display name supplied by the host")]
    IdentityUnavailable,

    #[error("could not resolve account for '{display_name}': {source}")]
    AccountResolutionFailed {
        display_name: String,
        #[source]
        source: StoreError,
    },

    #[error("flush of balance {target_balance} for {account_id} failed: {source}")]
    FlushFailed {
        account_id: AccountId,
        target_balance: u64,
        #[source]
        source: StoreError,
    },

    #[error("flush #{seq} was superseded by a newer flush")]
    FlushSuperseded { seq: u64 },

    #[error("account not ready: identity resolution has not completed")]
    AccountNotReady,
}

impl TapError {
    /// Errors that leave the session unable to accept taps.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            TapError::IdentityUnavailable | TapError::AccountResolutionFailed { .. }
        )
    }
}

pub type TapResult<T> = Result<T, TapError>;

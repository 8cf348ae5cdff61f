use crate::{
    account::{
        Account,
        AccountId,
    },
    error::StoreError,
};
use std::future::Future;

pub mod graphql;
pub mod in_memory;

pub use graphql::GraphQlBalanceStore;
pub use in_memory::InMemoryBalanceStore;

/// Remote key-value account store holding the authoritative balances.
pub trait BalanceStore: Send + Sync + 'static {
    /// look up the account registered under `display_name`
    fn resolve_account(
        &self,
        display_name: &str,
    ) -> impl Future<Output = Result<Option<Account>, StoreError>> + Send;

    /// register a new account; fails with [`StoreError::AlreadyExists`] if the name is taken
    fn create_account(
        &self,
        display_name: &str,
    ) -> impl Future<Output = Result<Account, StoreError>> + Send;

    /// overwrite the account balance with an absolute value, returning the stored value
    fn update_balance(
        &self,
        account_id: &AccountId,
        new_balance: u64,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

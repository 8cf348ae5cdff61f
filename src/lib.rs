pub mod account;
pub mod accumulator;
pub mod config;
pub mod error;
pub mod flusher;
pub mod identity;
pub mod progress;
pub mod session;
pub mod store;

pub mod test_helpers;

pub use account::{
    Account,
    AccountId,
};
pub use config::{
    ConfigError,
    RetryPolicy,
    SessionConfig,
};
pub use error::{
    StoreError,
    TapError,
};
pub use identity::{
    HostUser,
    IdentitySource,
    InitData,
};
pub use session::{
    LoadingState,
    Session,
    SessionExit,
    SessionHandle,
    SessionView,
};
pub use store::{
    BalanceStore,
    GraphQlBalanceStore,
    InMemoryBalanceStore,
};

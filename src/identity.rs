use crate::{
    account::Account,
    config::RetryPolicy,
    error::{
        StoreError,
        TapError,
    },
    store::BalanceStore,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{
    debug,
    error,
    info,
    warn,
};

/// User record handed over by the hosting chat platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostUser {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub language_code: Option<String>,
}

impl HostUser {
    pub fn named(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }

    pub fn with_id(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }
}

/// Launch payload of the host web view. Only `user` matters to the game.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InitData {
    #[serde(default)]
    pub query_id: Option<String>,
    #[serde(default)]
    pub user: Option<HostUser>,
    #[serde(default)]
    pub auth_date: Option<u64>,
    #[serde(default)]
    pub hash: Option<String>,
}

impl InitData {
    pub fn for_user(user: HostUser) -> Self {
        Self {
            user: Some(user),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

pub trait IdentitySource: Send + 'static {
    fn host_user(&self) -> Option<HostUser>;
}

impl IdentitySource for InitData {
    fn host_user(&self) -> Option<HostUser> {
        self.user.clone()
    }
}

/// Picks the session display name: username, then `User{id}`, then `fallback`.
pub fn display_name(source: &impl IdentitySource, fallback: &str) -> Result<String, TapError> {
    let user = source.host_user();
    let from_username = user
        .as_ref()
        .and_then(|u| u.username.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let from_id = user.as_ref().and_then(|u| u.id).map(|id| format!("User{id}"));
    let name = from_username
        .or(from_id)
        .unwrap_or_else(|| fallback.trim().to_string());
    if name.is_empty() {
        return Err(TapError::IdentityUnavailable);
    }
    Ok(name)
}

/// Resolve-or-create bootstrap of the remote account for a display name.
pub struct IdentityResolver<S> {
    store: Arc<S>,
    retry: RetryPolicy,
}

impl<S> Clone for IdentityResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            retry: self.retry.clone(),
        }
    }
}

impl<S: BalanceStore> IdentityResolver<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub async fn resolve(&self, display_name: &str) -> Result<Account, TapError> {
        let mut attempt = 1;
        loop {
            match self.resolve_or_create(display_name).await {
                Ok(account) => {
                    info!(%display_name, account_id = %account.id, balance = account.balance, "account resolved");
                    return Ok(account);
                }
                Err(source) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(%display_name, attempt, ?delay, error = %source, "account resolution failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    error!(%display_name, attempt, error = %source, "account resolution failed");
                    return Err(TapError::AccountResolutionFailed {
                        display_name: display_name.to_string(),
                        source,
                    });
                }
            }
        }
    }

    async fn resolve_or_create(&self, display_name: &str) -> Result<Account, StoreError> {
        if let Some(account) = self.store.resolve_account(display_name).await? {
            return Ok(account);
        }
        debug!(%display_name, "no account found, creating one");
        match self.store.create_account(display_name).await {
            Ok(account) => Ok(account),
            Err(StoreError::AlreadyExists { .. }) => {
                // someone registered the name between our lookup and create
                info!(%display_name, "account created concurrently, re-resolving");
                self.store
                    .resolve_account(display_name)
                    .await?
                    .ok_or_else(|| StoreError::AlreadyExists {
                        display_name: display_name.to_string(),
                    })
            }
            Err(err) => Err(err),
        }
    }
}

use crate::{
    config::{
        RetryPolicy,
        SessionConfig,
    },
    identity::{
        HostUser,
        InitData,
    },
    session::{
        Session,
        SessionHandle,
        SessionView,
    },
    store::InMemoryBalanceStore,
};
use std::{
    sync::Arc,
    time::Duration,
};

pub const TEST_DEBOUNCE: Duration = Duration::from_secs(5);

pub fn test_config() -> SessionConfig {
    SessionConfig {
        debounce_ms: TEST_DEBOUNCE.as_millis() as u64,
        resolve_retry: RetryPolicy::no_retry(),
        ..SessionConfig::default()
    }
}

/// A running session over an in-memory store, for driving end-to-end flows.
pub struct TestContext {
    pub store: InMemoryBalanceStore,
    pub session: SessionHandle,
}

impl TestContext {
    pub fn start(username: &str) -> Self {
        Self::start_with(
            InMemoryBalanceStore::new(),
            InitData::for_user(HostUser::named(username)),
            test_config(),
        )
    }

    pub fn start_with(
        store: InMemoryBalanceStore,
        identity: InitData,
        config: SessionConfig,
    ) -> Self {
        let session = Session::start(identity, Arc::new(store.clone()), config)
            .unwrap_or_else(|err| panic!("invalid test config: {err}"));
        Self { store, session }
    }

    /// Waits until the published view satisfies `predicate`.
    pub async fn wait_for(&self, predicate: impl FnMut(&SessionView) -> bool) -> SessionView {
        let mut view = self.session.subscribe();
        let waited = tokio::time::timeout(Duration::from_secs(600), view.wait_for(predicate)).await;
        match waited {
            Ok(Ok(view)) => view.clone(),
            Ok(Err(_)) => panic!("session closed while waiting"),
            Err(_) => panic!("timed out waiting for session view, last: {:?}", self.session.view()),
        }
    }

    pub async fn ready(&self) -> SessionView {
        self.wait_for(|v| v.is_ready()).await
    }

    pub async fn tap_times(&self, taps: u64) -> SessionView {
        let target = self.session.view().displayed_balance + taps;
        for _ in 0..taps {
            self.session.tap();
        }
        self.wait_for(|v| v.displayed_balance >= target).await
    }

    /// Sleeps past one full debounce window so an armed flush fires.
    pub async fn idle_past_debounce(&self) {
        tokio::time::sleep(TEST_DEBOUNCE + Duration::from_millis(1)).await;
    }
}

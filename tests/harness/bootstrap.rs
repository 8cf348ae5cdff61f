use std::{
    sync::Arc,
    time::Duration,
};
use tapme::{
    AccountId,
    ConfigError,
    HostUser,
    InMemoryBalanceStore,
    InitData,
    LoadingState,
    RetryPolicy,
    Session,
    SessionConfig,
    test_helpers::{
        TestContext,
        test_config,
    },
};

#[tokio::test(start_paused = true)]
async fn bootstrap__creates_missing_account() {
    // given
    let ctx = TestContext::start("alice");

    // when
    let view = ctx.ready().await;

    // then
    assert_eq!(view.display_name, "alice");
    assert_eq!(view.displayed_balance, 0);
    assert_eq!(ctx.store.create_calls(), vec!["alice".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn bootstrap__adopts_existing_balance() {
    // given
    let store = InMemoryBalanceStore::new().with_account("alice", 50);
    let ctx = TestContext::start_with(
        store,
        InitData::for_user(HostUser::named("alice")),
        test_config(),
    );

    // when
    let view = ctx.ready().await;

    // then
    assert_eq!(view.displayed_balance, 50);
    assert_eq!(view.confirmed_balance, 50);
    assert!(ctx.store.create_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bootstrap__lost_create_race_re_resolves() {
    // given
    let store = InMemoryBalanceStore::new();
    store.lose_next_create_race();
    let ctx = TestContext::start_with(
        store,
        InitData::for_user(HostUser::named("alice")),
        test_config(),
    );

    // when
    ctx.ready().await;
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.pending_delta == 0).await;

    // then
    assert_eq!(ctx.store.create_calls().len(), 1);
    assert_eq!(ctx.store.update_calls(), vec![(AccountId::new("u1"), 1)]);
}

#[tokio::test(start_paused = true)]
async fn bootstrap__numeric_id_names_anonymous_user() {
    let ctx = TestContext::start_with(
        InMemoryBalanceStore::new(),
        InitData::for_user(HostUser::with_id(42)),
        test_config(),
    );

    let view = ctx.ready().await;

    assert_eq!(view.display_name, "User42");
    assert_eq!(ctx.store.balance_of("User42"), Some(0));
}

#[tokio::test(start_paused = true)]
async fn bootstrap__missing_host_user_uses_fallback_label() {
    let ctx = TestContext::start_with(
        InMemoryBalanceStore::new(),
        InitData::default(),
        test_config(),
    );

    let view = ctx.ready().await;

    assert_eq!(view.display_name, "Guest");
}

#[tokio::test(start_paused = true)]
async fn bootstrap__identity_unavailable_blocks_tapping() {
    // given
    let config = SessionConfig {
        fallback_display_name: String::new(),
        ..test_config()
    };
    let ctx = TestContext::start_with(InMemoryBalanceStore::new(), InitData::default(), config);

    // when
    let view = ctx
        .wait_for(|v| matches!(v.loading, LoadingState::Error(_)))
        .await;
    ctx.session.tap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // then
    assert!(!view.is_ready());
    assert_eq!(ctx.session.view().displayed_balance, 0);
    assert!(ctx.store.create_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn bootstrap__resolution_failure_is_blocking_until_retry() {
    // given
    let store = InMemoryBalanceStore::new();
    store.fail_next_resolves(1);
    let ctx = TestContext::start_with(
        store,
        InitData::for_user(HostUser::named("alice")),
        test_config(),
    );
    let failed = ctx
        .wait_for(|v| matches!(v.loading, LoadingState::Error(_)))
        .await;
    ctx.session.tap();

    // when
    ctx.session.retry();
    let view = ctx.ready().await;

    // then
    match failed.loading {
        LoadingState::Error(message) => assert!(message.contains("alice")),
        other => panic!("unexpected state {other:?}"),
    }
    assert_eq!(view.displayed_balance, 0);
}

#[tokio::test(start_paused = true)]
async fn bootstrap__transient_failures_retry_with_backoff() {
    // given
    let store = InMemoryBalanceStore::new();
    store.fail_next_resolves(2);
    let config = SessionConfig {
        resolve_retry: RetryPolicy::default(),
        ..test_config()
    };

    // when
    let ctx = TestContext::start_with(store, InitData::for_user(HostUser::named("bob")), config);
    let view = ctx.ready().await;

    // then
    assert_eq!(view.display_name, "bob");
}

#[tokio::test(start_paused = true)]
async fn bootstrap__taps_before_ready_are_ignored() {
    // given
    let store = InMemoryBalanceStore::new();
    store.set_latency(Duration::from_secs(2));
    let ctx = TestContext::start_with(
        store,
        InitData::for_user(HostUser::named("alice")),
        test_config(),
    );

    // when
    ctx.session.tap();
    ctx.session.tap();
    let view = ctx.ready().await;

    // then
    assert_eq!(view.displayed_balance, 0);
    assert_eq!(view.pending_delta, 0);
}

#[tokio::test(start_paused = true)]
async fn start__rejects_out_of_range_progress_step() {
    // given
    let store = InMemoryBalanceStore::new();
    let config = SessionConfig {
        progress_step: u32::MAX,
        ..test_config()
    };

    // when
    let started = Session::start(
        InitData::for_user(HostUser::named("alice")),
        Arc::new(store.clone()),
        config,
    );
    tokio::time::sleep(Duration::from_millis(10)).await;

    // then
    assert!(matches!(started, Err(ConfigError::Invalid(_))));
    assert!(store.create_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn start__rejects_zero_debounce() {
    let config = SessionConfig {
        debounce_ms: 0,
        ..test_config()
    };

    let started = Session::start(
        InitData::for_user(HostUser::named("alice")),
        Arc::new(InMemoryBalanceStore::new()),
        config,
    );

    assert!(matches!(started, Err(ConfigError::Invalid(_))));
}

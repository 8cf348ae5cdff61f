use std::time::Duration;
use tapme::{
    AccountId,
    HostUser,
    InMemoryBalanceStore,
    InitData,
    test_helpers::{
        TEST_DEBOUNCE,
        TestContext,
        test_config,
    },
};

fn u1() -> AccountId {
    AccountId::new("u1")
}

#[tokio::test(start_paused = true)]
async fn sync__three_taps_flush_once_after_quiet_period() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;

    // when
    let tapped = ctx.tap_times(3).await;

    // then
    assert_eq!(tapped.pending_delta, 3);
    assert_eq!(tapped.displayed_balance, 3);
    assert!(ctx.store.update_calls().is_empty());

    // when
    ctx.idle_past_debounce().await;
    let flushed = ctx.wait_for(|v| v.pending_delta == 0 && !v.syncing).await;

    // then
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 3)]);
    assert_eq!(flushed.confirmed_balance, 3);
    assert_eq!(flushed.displayed_balance, 3);
    assert!(flushed.last_synced_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn sync__debounce_is_measured_from_the_last_tap() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    let gap = TEST_DEBOUNCE - Duration::from_secs(1);

    // when
    for _ in 0..4 {
        ctx.tap_times(1).await;
        tokio::time::sleep(gap).await;
    }

    // then
    assert!(ctx.store.update_calls().is_empty());

    // when
    tokio::time::sleep(Duration::from_secs(2)).await;
    ctx.wait_for(|v| v.pending_delta == 0).await;

    // then
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 4)]);
}

#[tokio::test(start_paused = true)]
async fn sync__flushes_absolute_balance_on_top_of_existing() {
    // given
    let store = InMemoryBalanceStore::new().with_account("alice", 10);
    let ctx = TestContext::start_with(
        store,
        InitData::for_user(HostUser::named("alice")),
        test_config(),
    );
    ctx.ready().await;

    // when
    ctx.tap_times(25).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.pending_delta == 0).await;

    // then
    assert_eq!(ctx.store.balance_of("alice"), Some(35));
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 35)]);
}

#[tokio::test(start_paused = true)]
async fn sync__separate_bursts_send_increasing_absolute_balances() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;

    // when
    ctx.tap_times(2).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.confirmed_balance == 2).await;
    ctx.tap_times(3).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.confirmed_balance == 5).await;

    // then
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 2), (u1(), 5)]);
}

#[tokio::test(start_paused = true)]
async fn sync__failed_flush_and_new_tap_combine() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.store.fail_next_updates(1);
    ctx.tap_times(2).await;
    ctx.idle_past_debounce().await;
    let failed = ctx.wait_for(|v| v.last_error.is_some() && !v.syncing).await;
    assert_eq!(failed.pending_delta, 2);
    assert_eq!(failed.displayed_balance, 2);

    // when
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    let view = ctx.wait_for(|v| v.pending_delta == 0).await;

    // then
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 2), (u1(), 3)]);
    assert_eq!(ctx.store.balance_of("alice"), Some(3));
    assert_eq!(view.last_error, None);
}

#[tokio::test(start_paused = true)]
async fn sync__failed_flush_is_retried_without_new_taps() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.store.fail_next_updates(1);

    // when
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.last_error.is_some()).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.pending_delta == 0).await;

    // then
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 1), (u1(), 1)]);
}

#[tokio::test(start_paused = true)]
async fn sync__slow_flush_is_never_overlapped() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.store.set_latency(Duration::from_secs(10));
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.syncing).await;

    // when
    ctx.tap_times(2).await;
    ctx.idle_past_debounce().await;
    let view = ctx.wait_for(|v| v.pending_delta == 0 && !v.syncing).await;

    // then
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 1), (u1(), 3)]);
    assert_eq!(ctx.store.peak_concurrent_updates(), 1);
    assert_eq!(view.confirmed_balance, 3);
}

#[tokio::test(start_paused = true)]
async fn sync__absolute_flush_overwrites_external_write() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.store.set_balance(&u1(), 500);

    // when
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.pending_delta == 0).await;

    // then
    assert_eq!(ctx.store.balance_of("alice"), Some(1));
}

#[tokio::test(start_paused = true)]
async fn sync__progress_and_level_track_taps() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;

    // when
    let view = ctx.tap_times(23).await;

    // then
    assert_eq!(view.level, 3);
    assert_eq!(view.progress, 30);
}

use std::time::Duration;
use tapme::{
    AccountId,
    test_helpers::TestContext,
};

fn u1() -> AccountId {
    AccountId::new("u1")
}

#[tokio::test(start_paused = true)]
async fn teardown__flushes_outstanding_taps_once() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.tap_times(2).await;

    // when
    let exit = ctx.session.shutdown().await;
    let confirmed = exit
        .final_flush
        .expect("outstanding taps should be flushed")
        .await
        .unwrap()
        .unwrap();

    // then
    assert_eq!(confirmed, 2);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 2)]);
}

#[tokio::test(start_paused = true)]
async fn teardown__idle_session_sends_nothing() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.pending_delta == 0).await;

    // when
    let exit = ctx.session.shutdown().await;

    // then
    assert!(exit.final_flush.is_none());
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 1)]);
}

#[tokio::test(start_paused = true)]
async fn teardown__dropping_the_handle_flushes_in_background() {
    // given
    let TestContext { store, session } = TestContext::start("alice");
    let mut view = session.subscribe();
    view.wait_for(|v| v.is_ready()).await.unwrap();
    session.tap();
    session.tap();
    session.tap();
    view.wait_for(|v| v.pending_delta == 3).await.unwrap();

    // when
    drop(view);
    drop(session);
    tokio::time::sleep(Duration::from_secs(30)).await;

    // then
    assert_eq!(store.update_calls(), vec![(u1(), 3)]);
    assert_eq!(store.balance_of("alice"), Some(3));
}

#[tokio::test(start_paused = true)]
async fn teardown__waits_for_in_flight_flush_before_final_one() {
    // given
    let ctx = TestContext::start("alice");
    ctx.ready().await;
    ctx.store.set_latency(Duration::from_secs(3));
    ctx.tap_times(1).await;
    ctx.idle_past_debounce().await;
    ctx.wait_for(|v| v.syncing).await;
    ctx.tap_times(1).await;

    // when
    let exit = ctx.session.shutdown().await;
    let confirmed = exit.final_flush.unwrap().await.unwrap().unwrap();

    // then
    assert_eq!(confirmed, 2);
    assert_eq!(ctx.store.update_calls(), vec![(u1(), 1), (u1(), 2)]);
    assert_eq!(ctx.store.peak_concurrent_updates(), 1);
    assert_eq!(ctx.store.balance_of("alice"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn teardown__unresolved_session_sends_nothing() {
    // given
    let ctx = TestContext::start("alice");
    ctx.store.fail_next_resolves(1);

    // when
    let exit = ctx.session.shutdown().await;

    // then
    assert!(exit.final_flush.is_none());
    assert!(ctx.store.update_calls().is_empty());
}

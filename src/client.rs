use crate::ui;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use std::{
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tapme::{
    BalanceStore,
    GraphQlBalanceStore,
    InMemoryBalanceStore,
    InitData,
    Session,
    SessionConfig,
    SessionHandle,
};
use tokio::time;
use tracing::{
    info,
    warn,
};

/// How long the process lingers on exit so the last flush can land.
const FINAL_FLUSH_GRACE: Duration = Duration::from_secs(3);
const BUBBLE_TICK: Duration = Duration::from_millis(100);

pub enum StoreTarget {
    Remote { url: String },
    Offline,
}

pub struct AppConfig {
    pub store: StoreTarget,
    pub identity: InitData,
    pub session: SessionConfig,
    pub log_dir: PathBuf,
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let AppConfig {
        store,
        identity,
        session,
        ..
    } = config;
    match store {
        StoreTarget::Remote { url } => {
            info!("Connecting to backend at URL: {url}");
            let store = GraphQlBalanceStore::new(url)
                .wrap_err("failed to build HTTP client for backend")?;
            run_with_store(Arc::new(store), identity, session).await
        }
        StoreTarget::Offline => {
            info!("Running offline with an in-memory balance store");
            run_with_store(Arc::new(InMemoryBalanceStore::new()), identity, session).await
        }
    }
}

async fn run_with_store<S: BalanceStore>(
    store: Arc<S>,
    identity: InitData,
    config: SessionConfig,
) -> Result<()> {
    let session =
        Session::start(identity, store, config).wrap_err("invalid session configuration")?;
    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&session, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;

    let exit = session.shutdown().await;
    if let Some(final_flush) = exit.final_flush {
        match time::timeout(FINAL_FLUSH_GRACE, final_flush).await {
            Ok(Ok(Ok(balance))) => info!(balance, "final balance flushed"),
            Ok(Ok(Err(err))) => warn!(error = %err, "final flush failed"),
            Ok(Err(err)) => warn!(?err, "final flush task failed"),
            Err(_) => warn!("final flush still pending at exit"),
        }
    }
    res
}

async fn run_loop(
    session: &SessionHandle,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()> {
    info!("Running app loop");
    let mut views = session.subscribe();
    let mut view = views.borrow_and_update().clone();
    let mut ticker = time::interval(BUBBLE_TICK);
    ui::draw(ui_state, &view)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = views.changed() => {
                if changed.is_err() {
                    warn!("session closed underneath the UI");
                    break;
                }
                view = views.borrow_and_update().clone();
                ui::draw(ui_state, &view).wrap_err("draw after session update failed")?;
            }
            _ = ticker.tick() => {
                if ui_state.expire_bubbles() {
                    ui::draw(ui_state, &view)?;
                }
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(event) else {
                    continue;
                };
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Tap { at } => {
                        if view.is_ready() {
                            ui_state.push_bubble(at);
                        }
                        session.tap();
                    }
                    ui::UserEvent::Retry => session.retry(),
                    ui::UserEvent::Redraw => ui::draw(ui_state, &view)?,
                }
            }
        }
    }
    Ok(())
}

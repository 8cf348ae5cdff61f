//! The tapping session event loop.
//!
//! One tokio task owns all local state and reacts to one event at a time:
//! commands from the presentation layer, completion of the account
//! bootstrap, expiry of the debounce timer and completion of a flush.
//! The presentation layer talks to it through a [`SessionHandle`] and reads
//! state from a `watch` channel of [`SessionView`]s.

use crate::{
    accumulator::{
        FlushRequest,
        TapAccumulator,
        TimerHandle,
    },
    account::Account,
    config::{
        ConfigError,
        SessionConfig,
    },
    error::TapError,
    flusher::SyncFlusher,
    identity::{
        self,
        IdentityResolver,
        IdentitySource,
    },
    progress::ProgressTracker,
    store::BalanceStore,
};
use chrono::{
    DateTime,
    Utc,
};
use futures::{
    FutureExt,
    future::BoxFuture,
};
use std::{
    future::pending,
    pin::Pin,
    sync::Arc,
};
use tokio::{
    sync::{
        mpsc,
        watch,
    },
    task::JoinHandle,
    time::{
        self,
        Sleep,
    },
};
use tracing::{
    debug,
    error,
    info,
    warn,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoadingState {
    #[default]
    Loading,
    Ready,
    Error(String),
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    pub display_name: String,
    pub displayed_balance: u64,
    pub confirmed_balance: u64,
    pub pending_delta: u64,
    pub progress: u32,
    pub level: u32,
    pub loading: LoadingState,
    pub syncing: bool,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl SessionView {
    fn initial(progress: &ProgressTracker) -> Self {
        Self {
            display_name: String::new(),
            displayed_balance: 0,
            confirmed_balance: 0,
            pending_delta: 0,
            progress: progress.progress(),
            level: progress.level(),
            loading: LoadingState::Loading,
            syncing: false,
            last_error: None,
            last_synced_at: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.loading == LoadingState::Ready
    }
}

#[derive(Debug)]
enum SessionCommand {
    Tap,
    Retry,
    Shutdown,
}

/// Returned when the session loop ends.
#[derive(Debug, Default)]
pub struct SessionExit {
    /// Last best-effort flush, already running detached. Callers may give it
    /// a grace period, the session itself never waits for it.
    pub final_flush: Option<JoinHandle<Result<u64, TapError>>>,
}

pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    view: watch::Receiver<SessionView>,
    task: JoinHandle<SessionExit>,
}

impl SessionHandle {
    pub fn tap(&self) {
        self.send(SessionCommand::Tap);
    }

    /// Re-runs account bootstrap after a blocking error.
    pub fn retry(&self) {
        self.send(SessionCommand::Retry);
    }

    pub fn view(&self) -> SessionView {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionView> {
        self.view.clone()
    }

    /// Tears the session down and waits for the loop to exit.
    pub async fn shutdown(self) -> SessionExit {
        self.send(SessionCommand::Shutdown);
        match self.task.await {
            Ok(exit) => exit,
            Err(err) => {
                error!(?err, "session task ended abnormally");
                SessionExit::default()
            }
        }
    }

    fn send(&self, command: SessionCommand) {
        if self.commands.send(command).is_err() {
            debug!("session already closed");
        }
    }
}

struct ArmedTimer {
    handle: TimerHandle,
    sleep: Pin<Box<Sleep>>,
}

struct FlushOutcome {
    seq: u64,
    result: Result<u64, TapError>,
}

pub struct Session<S, I> {
    config: SessionConfig,
    identity: I,
    resolver: IdentityResolver<S>,
    flusher: SyncFlusher<S>,
    accumulator: TapAccumulator,
    progress: ProgressTracker,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    view: watch::Sender<SessionView>,
    display_name: String,
    loading: LoadingState,
    last_error: Option<String>,
    last_synced_at: Option<DateTime<Utc>>,
    bootstrap: Option<BoxFuture<'static, Result<Account, TapError>>>,
    timer: Option<ArmedTimer>,
    in_flight: Option<BoxFuture<'static, FlushOutcome>>,
}

impl<S: BalanceStore, I: IdentitySource> Session<S, I> {
    /// Spawns the session loop on the current tokio runtime.
    ///
    /// The config is validated first, nothing is spawned when it is invalid.
    pub fn start(
        identity: I,
        store: Arc<S>,
        config: SessionConfig,
    ) -> Result<SessionHandle, ConfigError> {
        config.validate()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let progress = ProgressTracker::new(config.progress_step);
        let (view_tx, view_rx) = watch::channel(SessionView::initial(&progress));
        let session = Session {
            resolver: IdentityResolver::new(store.clone(), config.resolve_retry.clone()),
            flusher: SyncFlusher::new(store),
            config,
            identity,
            accumulator: TapAccumulator::new(),
            progress,
            commands: commands_rx,
            view: view_tx,
            display_name: String::new(),
            loading: LoadingState::Loading,
            last_error: None,
            last_synced_at: None,
            bootstrap: None,
            timer: None,
            in_flight: None,
        };
        let task = tokio::spawn(session.run());
        Ok(SessionHandle {
            commands: commands_tx,
            view: view_rx,
            task,
        })
    }

    async fn run(mut self) -> SessionExit {
        info!(debounce = ?self.config.debounce(), "session started");
        self.begin_bootstrap();
        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(SessionCommand::Tap) => self.on_tap(),
                    Some(SessionCommand::Retry) => self.on_retry(),
                    Some(SessionCommand::Shutdown) | None => break,
                },
                result = poll_slot(&mut self.bootstrap) => self.on_bootstrap(result),
                handle = expire(&mut self.timer) => self.on_timer(handle),
                outcome = poll_slot(&mut self.in_flight) => self.on_flush(outcome),
            }
        }
        self.teardown()
    }

    fn begin_bootstrap(&mut self) {
        self.loading = LoadingState::Loading;
        match identity::display_name(&self.identity, &self.config.fallback_display_name) {
            Ok(name) => {
                info!(display_name = %name, "resolving account");
                self.display_name = name.clone();
                let resolver = self.resolver.clone();
                self.bootstrap = Some(async move { resolver.resolve(&name).await }.boxed());
            }
            Err(err) => {
                error!(error = %err, "cannot start session");
                self.loading = LoadingState::Error(err.to_string());
            }
        }
        self.publish();
    }

    fn on_bootstrap(&mut self, result: Result<Account, TapError>) {
        match result {
            Ok(account) => {
                self.accumulator.resolve(&account);
                self.display_name = account.display_name;
                self.loading = LoadingState::Ready;
            }
            Err(err) => {
                self.loading = LoadingState::Error(err.to_string());
            }
        }
        self.publish();
    }

    fn on_retry(&mut self) {
        if matches!(self.loading, LoadingState::Error(_)) {
            self.begin_bootstrap();
        } else {
            debug!(state = ?self.loading, "retry ignored");
        }
    }

    fn on_tap(&mut self) {
        if self.loading != LoadingState::Ready {
            debug!(state = ?self.loading, "tap ignored until account is ready");
            return;
        }
        let handle = self.accumulator.tap();
        self.arm(handle);
        if self.progress.tap() {
            info!(level = self.progress.level(), "level up");
        }
        debug!(pending = self.accumulator.pending_delta(), "tap");
        self.publish();
    }

    fn on_timer(&mut self, handle: TimerHandle) {
        match self.accumulator.timer_fired(handle) {
            Ok(Some(request)) => self.dispatch(request),
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "flush withheld");
                self.last_error = Some(err.to_string());
            }
        }
        self.publish();
    }

    fn on_flush(&mut self, outcome: FlushOutcome) {
        let FlushOutcome { seq, result } = outcome;
        match result {
            Ok(confirmed) => match self.accumulator.flush_succeeded(seq, confirmed) {
                Ok(next) => {
                    self.last_error = None;
                    self.last_synced_at = Some(Utc::now());
                    if let Some(next) = next {
                        self.dispatch(next);
                    }
                }
                Err(err) => debug!(error = %err, "flush result dropped"),
            },
            Err(err) => {
                self.last_error = Some(err.to_string());
                match self.accumulator.flush_failed(seq) {
                    Ok(Some(handle)) => self.arm(handle),
                    Ok(None) => {}
                    Err(err) => debug!(error = %err, "flush failure dropped"),
                }
            }
        }
        self.publish();
    }

    fn arm(&mut self, handle: TimerHandle) {
        self.timer = Some(ArmedTimer {
            handle,
            sleep: Box::pin(time::sleep(self.config.debounce())),
        });
    }

    fn dispatch(&mut self, request: FlushRequest) {
        debug!(
            seq = request.seq,
            delta = request.delta,
            target = request.target_balance,
            "flushing balance"
        );
        let flusher = self.flusher.clone();
        self.in_flight = Some(
            async move {
                let result = flusher
                    .flush(&request.account_id, request.target_balance)
                    .await;
                FlushOutcome {
                    seq: request.seq,
                    result,
                }
            }
            .boxed(),
        );
    }

    fn teardown(&mut self) -> SessionExit {
        self.timer = None;
        self.bootstrap = None;
        let in_flight = self.in_flight.take();
        let final_flush = self.accumulator.teardown().map(|request| {
            info!(
                delta = request.delta,
                target = request.target_balance,
                "flushing outstanding taps on teardown"
            );
            let flusher = self.flusher.clone();
            tokio::spawn(async move {
                // keep flushes ordered: an older, smaller balance must not land last
                if let Some(previous) = in_flight {
                    previous.await;
                }
                flusher
                    .flush(&request.account_id, request.target_balance)
                    .await
            })
        });
        info!(
            displayed = self.accumulator.displayed_balance(),
            level = self.progress.level(),
            "session closed"
        );
        SessionExit { final_flush }
    }

    fn publish(&self) {
        self.view.send_replace(SessionView {
            display_name: self.display_name.clone(),
            displayed_balance: self.accumulator.displayed_balance(),
            confirmed_balance: self.accumulator.confirmed_balance(),
            pending_delta: self.accumulator.pending_delta(),
            progress: self.progress.progress(),
            level: self.progress.level(),
            loading: self.loading.clone(),
            syncing: self.in_flight.is_some(),
            last_error: self.last_error.clone(),
            last_synced_at: self.last_synced_at,
        });
    }
}

async fn poll_slot<T>(slot: &mut Option<BoxFuture<'static, T>>) -> T {
    match slot {
        Some(fut) => {
            let out = fut.await;
            *slot = None;
            out
        }
        None => pending().await,
    }
}

async fn expire(timer: &mut Option<ArmedTimer>) -> TimerHandle {
    match timer {
        Some(armed) => {
            armed.sleep.as_mut().await;
            let handle = armed.handle;
            *timer = None;
            handle
        }
        None => pending().await,
    }
}

//! Sync scheduler task
//!
//! Drives [`SchedulerState`] with a one-second tick and starts rounds on the
//! [`SyncClient`]. Rounds run as their own tasks so the tick never waits on
//! the network; the client's in-flight latch keeps them from overlapping.
//! A forced round turned away by the latch waits in a single pending slot
//! and goes out once the round in flight is done.
//!
//! ## Usage
//!
//! ```ignore
//! let mut scheduler = SyncScheduler::new(client, config.scheduler_settings());
//! scheduler.start();
//! let commands = scheduler.commands();
//! commands.send(SchedulerCommand::SyncNow { force: true, notify_new_workspaces: true }).await?;
//! scheduler.shutdown(true).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::client::{RoundOptions, RoundOutcome, SkipReason, SyncClient};
use super::error::SyncResult;
use super::state::{SchedulerSettings, SchedulerState, TickDecision};
use super::transport::Transport;

const TICK: Duration = Duration::from_secs(1);

type RoundDone = (RoundOptions, SyncResult<RoundOutcome>);

/// Commands sent to the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerCommand {
    /// Run a round right away
    SyncNow {
        force: bool,
        notify_new_workspaces: bool,
    },
    /// Stop the task, optionally flushing through the beacon first
    Shutdown { beacon: bool },
}

/// Progress display state, published every tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncIndicator {
    pub seconds_till_next_update: i64,
    pub last_round_failed: bool,
}

/// Lifecycle of the scheduler task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    /// Not started
    Idle,
    /// Counting down
    Waiting,
    /// A round is running
    Syncing,
    Stopped,
}

/// Performance data sink flushed once per tick
///
/// Failures stay inside the implementation and never affect sync state.
pub trait Telemetry: Send + Sync + 'static {
    fn flush(&self);
}

/// Telemetry that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTelemetry;

impl Telemetry for NoTelemetry {
    fn flush(&self) {}
}

struct RunningTask {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodic driver for sync rounds
pub struct SyncScheduler<T: Transport> {
    client: Arc<SyncClient<T>>,
    settings: SchedulerSettings,
    telemetry: Arc<dyn Telemetry>,
    command_tx: mpsc::Sender<SchedulerCommand>,
    command_rx: Arc<Mutex<mpsc::Receiver<SchedulerCommand>>>,
    indicator: Arc<watch::Sender<SyncIndicator>>,
    phase: Arc<watch::Sender<SchedulerPhase>>,
    task: Option<RunningTask>,
}

impl<T: Transport> SyncScheduler<T> {
    pub fn new(client: Arc<SyncClient<T>>, settings: SchedulerSettings) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (indicator, _) = watch::channel(SyncIndicator {
            seconds_till_next_update: i64::from(settings.update_frequency_secs),
            last_round_failed: false,
        });
        let (phase, _) = watch::channel(SchedulerPhase::Idle);

        Self {
            client,
            settings,
            telemetry: Arc::new(NoTelemetry),
            command_tx,
            command_rx: Arc::new(Mutex::new(command_rx)),
            indicator: Arc::new(indicator),
            phase: Arc::new(phase),
            task: None,
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Telemetry>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn client(&self) -> &Arc<SyncClient<T>> {
        &self.client
    }

    /// Sender for commands to the running task
    ///
    /// Stays valid across `stop`/`start`.
    pub fn commands(&self) -> mpsc::Sender<SchedulerCommand> {
        self.command_tx.clone()
    }

    pub fn subscribe_indicator(&self) -> watch::Receiver<SyncIndicator> {
        self.indicator.subscribe()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<SchedulerPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SchedulerPhase {
        *self.phase.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.handle.is_finished())
    }

    /// Start ticking; a running task is replaced
    pub fn start(&mut self) {
        self.stop();

        let (stop_tx, stop_rx) = oneshot::channel();
        let context = LoopContext {
            client: Arc::clone(&self.client),
            settings: self.settings,
            telemetry: Arc::clone(&self.telemetry),
            commands: Arc::clone(&self.command_rx),
            indicator: Arc::clone(&self.indicator),
            phase: Arc::clone(&self.phase),
        };

        let handle = tokio::spawn(run_loop(context, stop_rx));
        self.task = Some(RunningTask { stop_tx, handle });
    }

    /// Stop ticking
    ///
    /// Responses of rounds still in flight are discarded.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.stop_tx.send(());
            self.client.invalidate_in_flight();
            info!("Sync scheduler stopped");
        }
    }

    /// Stop the task, wait for it, and optionally flush pending changes
    /// through the beacon
    pub async fn shutdown(&mut self, beacon: bool) -> SyncResult<Option<RoundOutcome>> {
        if let Some(task) = self.task.take() {
            let _ = task.stop_tx.send(());
            if let Err(e) = task.handle.await {
                warn!("Sync scheduler task ended abnormally: {}", e);
            }
        }
        self.client.invalidate_in_flight();
        self.phase.send_replace(SchedulerPhase::Stopped);

        if beacon {
            return self.client.run_round(RoundOptions::beacon()).await.map(Some);
        }
        Ok(None)
    }
}

impl<T: Transport> Drop for SyncScheduler<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext<T: Transport> {
    client: Arc<SyncClient<T>>,
    settings: SchedulerSettings,
    telemetry: Arc<dyn Telemetry>,
    commands: Arc<Mutex<mpsc::Receiver<SchedulerCommand>>>,
    indicator: Arc<watch::Sender<SyncIndicator>>,
    phase: Arc<watch::Sender<SchedulerPhase>>,
}

impl<T: Transport> LoopContext<T> {
    fn publish(&self, state: &SchedulerState) {
        self.indicator.send_replace(SyncIndicator {
            seconds_till_next_update: state.seconds_till_next_update(),
            last_round_failed: self.client.last_round_failed(),
        });
    }

    fn spawn_round(&self, options: RoundOptions, done: &mpsc::UnboundedSender<RoundDone>) {
        let client = Arc::clone(&self.client);
        let done = done.clone();
        self.phase.send_replace(SchedulerPhase::Syncing);
        tokio::spawn(async move {
            let result = client.run_round(options).await;
            let _ = done.send((options, result));
        });
    }

    /// The parked round, once no round holds the latch
    fn take_pending(&self, pending: &mut Option<RoundOptions>) -> Option<RoundOptions> {
        if self.client.is_round_in_flight() {
            None
        } else {
            pending.take()
        }
    }
}

/// Whether a round must reach the server even if nothing is dirty
fn needs_server(options: &RoundOptions) -> bool {
    options.force_even_if_clean || options.notify_new_workspaces
}

/// One round doing the work of both
fn merge(a: RoundOptions, b: RoundOptions) -> RoundOptions {
    RoundOptions {
        force_even_if_clean: a.force_even_if_clean || b.force_even_if_clean,
        notify_new_workspaces: a.notify_new_workspaces || b.notify_new_workspaces,
        use_beacon: false,
    }
}

/// Fold `options` into the pending slot
fn park(pending: &mut Option<RoundOptions>, options: RoundOptions) {
    *pending = Some(match pending.take() {
        Some(parked) => merge(parked, options),
        None => options,
    });
}

async fn run_loop<T: Transport>(ctx: LoopContext<T>, mut stop_rx: oneshot::Receiver<()>) {
    // A replaced task still holds the receiver until it has exited
    let mut commands = ctx.commands.lock().await;

    let mut state = SchedulerState::for_session(&ctx.settings, &ctx.client.session());
    let (done_tx, mut done_rx) = mpsc::unbounded_channel();
    let mut rounds_running = 0usize;
    let mut pending: Option<RoundOptions> = None;

    let mut ticker = tokio::time::interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    ctx.phase.send_replace(SchedulerPhase::Waiting);
    info!("Sync scheduler started (period {}s)", state.period());

    loop {
        tokio::select! {
            _ = &mut stop_rx => break,

            _ = ticker.tick() => {
                let session = ctx.client.session();
                let period = ctx.settings.period_for(&session);
                if period != state.period() {
                    debug!("Sync period changed to {}s", period);
                    state.set_period(period);
                }

                let decision = state.tick(session.is_active());
                if let TickDecision::Sync { forced } = decision {
                    debug!("Tick starts a round (forced={})", forced);
                    let mut options = RoundOptions {
                        force_even_if_clean: forced,
                        ..RoundOptions::default()
                    };
                    if let Some(parked) = pending.take() {
                        options = merge(parked, options);
                    }
                    rounds_running += 1;
                    ctx.spawn_round(options, &done_tx);
                } else if let Some(options) = ctx.take_pending(&mut pending) {
                    rounds_running += 1;
                    ctx.spawn_round(options, &done_tx);
                }
                if decision != TickDecision::Idle {
                    ctx.publish(&state);
                    ctx.telemetry.flush();
                }
            }

            Some((options, result)) = done_rx.recv() => {
                rounds_running = rounds_running.saturating_sub(1);
                match result {
                    Ok(RoundOutcome::Skipped(SkipReason::RoundInFlight)) if needs_server(&options) => {
                        debug!("Forced round parked behind the round in flight");
                        park(&mut pending, options);
                    }
                    Ok(outcome) if outcome.sent_real_change() => state.record_real_change(),
                    Ok(_) => {}
                    Err(e) => debug!("Round failed, retrying next period: {}", e),
                }
                if let Some(options) = ctx.take_pending(&mut pending) {
                    rounds_running += 1;
                    ctx.spawn_round(options, &done_tx);
                }
                if rounds_running == 0 {
                    ctx.phase.send_replace(SchedulerPhase::Waiting);
                }
                ctx.publish(&state);
            }

            command = commands.recv() => match command {
                Some(SchedulerCommand::SyncNow { force, notify_new_workspaces }) => {
                    rounds_running += 1;
                    let options = RoundOptions {
                        force_even_if_clean: force,
                        notify_new_workspaces,
                        use_beacon: false,
                    };
                    ctx.spawn_round(options, &done_tx);
                }
                Some(SchedulerCommand::Shutdown { beacon }) => {
                    ctx.client.invalidate_in_flight();
                    if beacon {
                        if let Err(e) = ctx.client.run_round(RoundOptions::beacon()).await {
                            warn!("Final beacon failed: {}", e);
                        }
                    }
                    break;
                }
                None => break,
            },
        }
    }

    ctx.phase.send_replace(SchedulerPhase::Stopped);
    info!("Sync scheduler task exited");
}

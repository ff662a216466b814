use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, error, info, warn};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::Instant,
};
use tokio_util::sync::CancellationToken;

use crate::{
    alarm::AlarmPlanner,
    config::SchedulerConfig,
    error::ErrorKind,
    interaction::{InteractionHub, SamplingStatus},
    sensing::{DriverRegistry, SensorDriver},
};

use super::state::{
    stop_applies, Command, Event, SamplingMachine, SamplingState, SchedulerSnapshot, TimerKind,
};

enum Message {
    Event(Event),
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
}

#[derive(Default, Clone, Copy)]
struct TimerSlot {
    deadline: Option<Instant>,
    epoch: u64,
}

/// One slot per timer. Every arm or cancel bumps the slot's epoch, so a wakeup that
/// was computed for an older epoch is dropped.
#[derive(Default)]
struct Timers {
    slots: [TimerSlot; 3],
}

impl Timers {
    fn slot(&mut self, timer: TimerKind) -> &mut TimerSlot {
        &mut self.slots[timer.index()]
    }

    fn arm(&mut self, timer: TimerKind, after: Duration) {
        let slot = self.slot(timer);
        slot.epoch += 1;
        slot.deadline = Some(Instant::now() + after);
    }

    fn cancel(&mut self, timer: TimerKind) {
        let slot = self.slot(timer);
        slot.epoch += 1;
        slot.deadline = None;
    }

    fn next_due(&self) -> Option<(TimerKind, Instant, u64)> {
        TimerKind::ALL
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(timer, slot)| slot.deadline.map(|at| (*timer, at, slot.epoch)))
            .min_by_key(|(_, at, _)| *at)
    }

    /// Consumes the wakeup if the slot still holds the epoch it was computed for.
    fn claim(&mut self, timer: TimerKind, epoch: u64) -> bool {
        let slot = self.slot(timer);
        if slot.epoch != epoch || slot.deadline.is_none() {
            return false;
        }
        slot.epoch += 1;
        slot.deadline = None;
        true
    }
}

struct SchedulerDeps {
    registry: DriverRegistry,
    planner: AlarmPlanner,
    interaction: InteractionHub,
    config: SchedulerConfig,
}

struct LoopHandle {
    sender: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

/// Handle to the scheduler loop. All state changes run on that one task; callers
/// only post events.
#[derive(Clone)]
pub struct Scheduler {
    deps: Arc<SchedulerDeps>,
    current: Arc<Mutex<LoopHandle>>,
}

impl Scheduler {
    /// Starts the loop on the current tokio runtime, in IDLE with no mode.
    pub fn spawn(
        registry: DriverRegistry,
        planner: AlarmPlanner,
        interaction: InteractionHub,
        config: SchedulerConfig,
    ) -> Self {
        let deps = Arc::new(SchedulerDeps {
            registry,
            planner,
            interaction,
            config,
        });
        let handle = start_loop(Arc::clone(&deps));
        Self {
            deps,
            current: Arc::new(Mutex::new(handle)),
        }
    }

    fn current(&self) -> MutexGuard<'_, LoopHandle> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues `event`. Returns false when the loop is gone.
    pub fn post(&self, event: Event) -> bool {
        let delivered = self.current().sender.send(Message::Event(event)).is_ok();
        if !delivered {
            warn!("scheduler loop is not running; dropped {event:?}");
        }
        delivered
    }

    pub async fn snapshot(&self) -> Option<SchedulerSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.current()
            .sender
            .send(Message::Snapshot(reply_tx))
            .ok()?;
        reply_rx.await.ok()
    }

    pub async fn state(&self) -> Option<SamplingState> {
        self.snapshot().await.map(|s| s.state)
    }

    pub fn is_alive(&self) -> bool {
        let current = self.current();
        !current.task.is_finished() && !current.sender.is_closed()
    }

    /// Replaces a dead loop with a fresh one. Returns whether a new loop was started.
    pub fn respawn_if_dead(&self) -> bool {
        let mut current = self.current();
        if !current.task.is_finished() && !current.sender.is_closed() {
            return false;
        }
        warn!("scheduler loop died; starting a new one");
        *current = start_loop(Arc::clone(&self.deps));
        true
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.deps.registry
    }

    /// Stops the loop; running drivers are stopped on the way out.
    pub fn shutdown(&self) {
        self.current().cancel.cancel();
    }
}

fn start_loop(deps: Arc<SchedulerDeps>) -> LoopHandle {
    let (sender, receiver) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(run_loop(deps, receiver, cancel.clone()));
    LoopHandle {
        sender,
        task,
        cancel,
    }
}

async fn run_loop(
    deps: Arc<SchedulerDeps>,
    mut receiver: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    let mut worker = LoopState {
        machine: SamplingMachine::new(deps.config.clone()),
        timers: Timers::default(),
        deps,
    };

    loop {
        let due = worker.timers.next_due();
        let wake_at = due.map(|(_, at, _)| at).unwrap_or_else(Instant::now);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(wake_at), if due.is_some() => {
                if let Some((timer, _, epoch)) = due {
                    if worker.timers.claim(timer, epoch) {
                        worker.dispatch(timer.event());
                    }
                }
            }
            message = receiver.recv() => match message {
                Some(Message::Event(event)) => worker.dispatch(event),
                Some(Message::Snapshot(reply)) => {
                    let _ = reply.send(worker.machine.snapshot());
                }
                None => break,
            }
        }
    }

    worker.apply(Command::StopDrivers {
        include_continuous: true,
    });
    info!("scheduler loop shutting down");
}

struct LoopState {
    deps: Arc<SchedulerDeps>,
    machine: SamplingMachine,
    timers: Timers,
}

impl LoopState {
    fn dispatch(&mut self, event: Event) {
        // A tick posted from outside still consumes the pending timer of its kind.
        if let Some(timer) = event.timer() {
            self.timers.cancel(timer);
        }
        for command in self.machine.handle(event) {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::StartDrivers(selection) => {
                self.start_where(|d| selection.admits(&d.descriptor()))
            }
            Command::StartContinuous => self.start_where(|d| {
                d.is_enabled() && d.can_continuous_sample() && d.is_available()
            }),
            Command::StopDrivers { include_continuous } => {
                for driver in self.deps.registry.list() {
                    if stop_applies(&driver.descriptor(), include_continuous) {
                        stop_driver(driver.as_ref());
                    }
                }
            }
            Command::Arm { timer, after_ms } => {
                self.timers.arm(timer, Duration::from_millis(after_ms));
            }
            Command::Cancel(timer) => self.timers.cancel(timer),
            Command::ScheduleResume { at_ms } => self.deps.planner.schedule_resume(at_ms),
            Command::CancelResume => self.deps.planner.cancel_resume(),
            Command::ShowOverlay => self.deps.interaction.show_overlay(),
            Command::HideOverlay => self.deps.interaction.hide_overlay(),
            Command::Paused(paused) => self.deps.interaction.set_status(if paused {
                SamplingStatus::Paused
            } else {
                SamplingStatus::Active
            }),
        }
    }

    fn start_where(&self, predicate: impl Fn(&dyn SensorDriver) -> bool) {
        for driver in self.deps.registry.list() {
            if predicate(driver.as_ref()) {
                start_driver(driver.as_ref());
            }
        }
    }
}

fn start_driver(driver: &dyn SensorDriver) {
    if driver.is_running() {
        return;
    }
    match catch_unwind(AssertUnwindSafe(|| driver.start())) {
        Ok(Ok(())) => debug!("started {}", driver.name()),
        Ok(Err(err)) if err.kind() == ErrorKind::Permission => {
            info!("{} skipped: {err}", driver.name());
        }
        Ok(Err(err)) => warn!("{} failed to start: {err}", driver.name()),
        Err(_) => error!("{} panicked during start", driver.name()),
    }
}

fn stop_driver(driver: &dyn SensorDriver) {
    if catch_unwind(AssertUnwindSafe(|| driver.stop())).is_err() {
        error!("{} panicked during stop", driver.name());
    } else {
        debug!("stopped {}", driver.name());
    }
}

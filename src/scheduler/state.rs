//! Sampling state machine.
//!
//! `SamplingMachine` is pure: it takes one event, updates its state and returns the
//! side effects as a list of [`Command`]s. The controller owns the timers, the drivers
//! and the alarms, and applies the commands in order.

use std::fmt;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{config::SchedulerConfig, sensing::DriverDescriptor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SamplingState {
    Idle,
    Sleep,
    SamplingAfterUnlock,
    SamplingPeriodic,
}

impl fmt::Display for SamplingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SamplingState::Idle => "IDLE",
            SamplingState::Sleep => "SLEEP",
            SamplingState::SamplingAfterUnlock => "SAU",
            SamplingState::SamplingPeriodic => "SP",
        };
        f.write_str(label)
    }
}

/// Sampling policy a strategy runs the machine in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingMode {
    Continuous,
    Periodic,
    Unlock,
    UnlockAndPeriodic,
}

impl SamplingMode {
    pub fn is_periodic(&self) -> bool {
        matches!(self, SamplingMode::Periodic | SamplingMode::UnlockAndPeriodic)
    }

    pub fn listens_for_unlock(&self) -> bool {
        matches!(self, SamplingMode::Unlock | SamplingMode::UnlockAndPeriodic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    PeriodicOn,
    PeriodicOff,
    UnlockGuard,
}

impl TimerKind {
    pub const ALL: [TimerKind; 3] = [
        TimerKind::PeriodicOn,
        TimerKind::PeriodicOff,
        TimerKind::UnlockGuard,
    ];

    pub(crate) fn index(&self) -> usize {
        match self {
            TimerKind::PeriodicOn => 0,
            TimerKind::PeriodicOff => 1,
            TimerKind::UnlockGuard => 2,
        }
    }

    /// Event delivered when this timer fires.
    pub fn event(&self) -> Event {
        match self {
            TimerKind::PeriodicOn => Event::PeriodicOnTick,
            TimerKind::PeriodicOff => Event::PeriodicOffTick,
            TimerKind::UnlockGuard => Event::UnlockGuardExpired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// (Re)enter `mode` from scratch.
    Start(SamplingMode),
    /// Record `mode` but go straight to SLEEP until `until_ms`. Used on cold start
    /// while a pause is still in effect.
    StartPaused { mode: SamplingMode, until_ms: i64 },
    DeviceUnlocked,
    DeviceLocked,
    PeriodicOnTick,
    PeriodicOffTick,
    UnlockGuardExpired,
    EnterSleep { until_ms: i64 },
    ExitSleep,
    StopAll,
    /// Start continuous drivers that are not running, without leaving the current
    /// state or touching the timers.
    ReviveContinuous,
}

impl Event {
    /// Timer whose firing produces this event.
    pub fn timer(&self) -> Option<TimerKind> {
        match self {
            Event::PeriodicOnTick => Some(TimerKind::PeriodicOn),
            Event::PeriodicOffTick => Some(TimerKind::PeriodicOff),
            Event::UnlockGuardExpired => Some(TimerKind::UnlockGuard),
            _ => None,
        }
    }
}

/// Driver-selection predicate for a start: a driver is picked iff it is enabled,
/// available, and `can_periodic ∨ ¬only_periodic ∨ (can_continuous ∧ include_continuous)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub only_periodic: bool,
    pub include_continuous: bool,
}

impl Selection {
    pub const PERIODIC: Selection = Selection {
        only_periodic: true,
        include_continuous: false,
    };
    pub const UNLOCK: Selection = Selection {
        only_periodic: false,
        include_continuous: false,
    };
    pub const EVERYTHING: Selection = Selection {
        only_periodic: false,
        include_continuous: true,
    };

    pub fn admits(&self, driver: &DriverDescriptor) -> bool {
        driver.enabled
            && driver.available_on_this_device
            && (driver.can_periodic_sample
                || !self.only_periodic
                || (driver.can_continuous_sample && self.include_continuous))
    }
}

/// Stop predicate: continuous drivers only stop when `include_continuous` is set.
pub fn stop_applies(driver: &DriverDescriptor, include_continuous: bool) -> bool {
    driver.is_running() && (!driver.can_continuous_sample || include_continuous)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartDrivers(Selection),
    /// Start enabled, available, continuous-capable drivers.
    StartContinuous,
    StopDrivers { include_continuous: bool },
    Arm { timer: TimerKind, after_ms: u64 },
    Cancel(TimerKind),
    ScheduleResume { at_ms: i64 },
    CancelResume,
    ShowOverlay,
    HideOverlay,
    /// Status shown by the interaction surface changed (`true` = paused).
    Paused(bool),
}

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerSnapshot {
    pub state: SamplingState,
    pub mode: Option<SamplingMode>,
    pub periodic_enabled: bool,
    pub periodic_on_armed: bool,
    pub periodic_off_armed: bool,
    pub unlock_guard_armed: bool,
}

#[derive(Debug, Clone)]
pub struct SamplingMachine {
    state: SamplingState,
    mode: Option<SamplingMode>,
    periodic_enabled: bool,
    armed: [bool; 3],
    config: SchedulerConfig,
}

impl SamplingMachine {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            state: SamplingState::Idle,
            mode: None,
            periodic_enabled: false,
            armed: [false; 3],
            config,
        }
    }

    pub fn state(&self) -> SamplingState {
        self.state
    }

    pub fn mode(&self) -> Option<SamplingMode> {
        self.mode
    }

    pub fn periodic_enabled(&self) -> bool {
        self.periodic_enabled
    }

    pub fn is_armed(&self, timer: TimerKind) -> bool {
        self.armed[timer.index()]
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            state: self.state,
            mode: self.mode,
            periodic_enabled: self.periodic_enabled,
            periodic_on_armed: self.is_armed(TimerKind::PeriodicOn),
            periodic_off_armed: self.is_armed(TimerKind::PeriodicOff),
            unlock_guard_armed: self.is_armed(TimerKind::UnlockGuard),
        }
    }

    /// Applies `event` and returns the side effects to run, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        // A timer that delivered its event is no longer pending.
        if let Some(timer) = event.timer() {
            self.armed[timer.index()] = false;
        }

        let from = self.state;
        let mut commands = Vec::new();

        match (self.state, event) {
            (_, Event::StopAll) => {
                self.stop_everything(&mut commands);
                if from == SamplingState::Sleep {
                    commands.push(Command::CancelResume);
                    commands.push(Command::Paused(false));
                }
                self.mode = None;
                self.periodic_enabled = false;
                self.state = SamplingState::Idle;
            }
            (_, Event::EnterSleep { until_ms }) => {
                self.stop_everything(&mut commands);
                commands.push(Command::ScheduleResume { at_ms: until_ms });
                if from != SamplingState::Sleep {
                    commands.push(Command::Paused(true));
                }
                self.state = SamplingState::Sleep;
            }
            (_, Event::Start(mode)) => {
                if self.mode.is_some() || from == SamplingState::Sleep {
                    self.stop_everything(&mut commands);
                }
                if from == SamplingState::Sleep {
                    commands.push(Command::CancelResume);
                    commands.push(Command::Paused(false));
                }
                self.state = SamplingState::Idle;
                self.enter(mode, &mut commands);
            }
            (_, Event::StartPaused { mode, until_ms }) => {
                self.stop_everything(&mut commands);
                self.mode = Some(mode);
                self.periodic_enabled = mode.is_periodic();
                commands.push(Command::ScheduleResume { at_ms: until_ms });
                if from != SamplingState::Sleep {
                    commands.push(Command::Paused(true));
                }
                self.state = SamplingState::Sleep;
            }
            (SamplingState::Sleep, Event::ExitSleep) => {
                commands.push(Command::CancelResume);
                commands.push(Command::Paused(false));
                self.state = SamplingState::Idle;
                match self.mode {
                    Some(mode) => self.enter(mode, &mut commands),
                    None => warn!("left SLEEP with no sampling mode configured"),
                }
            }
            (SamplingState::Sleep, other) => {
                debug!("ignoring {other:?} while in SLEEP");
            }
            (_, Event::ExitSleep) => {
                debug!("exit_sleep while {from}; nothing to resume");
            }
            (_, Event::DeviceLocked) => {
                commands.push(Command::HideOverlay);
            }
            (_, Event::ReviveContinuous) => match self.mode {
                Some(_) => commands.push(Command::StartContinuous),
                None => debug!("no sampling mode; nothing to revive"),
            },
            (_, Event::DeviceUnlocked) if !self.listens_for_unlock() => {
                debug!("unlock ignored; current mode does not sample on unlock");
            }
            (SamplingState::Idle, Event::DeviceUnlocked) => {
                self.cancel(TimerKind::PeriodicOn, &mut commands);
                commands.push(Command::StartDrivers(Selection::UNLOCK));
                self.arm(TimerKind::UnlockGuard, self.config.unlock_sample_ms, &mut commands);
                commands.push(Command::ShowOverlay);
                self.state = SamplingState::SamplingAfterUnlock;
            }
            (SamplingState::SamplingPeriodic, Event::DeviceUnlocked) => {
                // The periodic off tick stays armed; the duty cycle keeps advancing.
                commands.push(Command::StopDrivers {
                    include_continuous: false,
                });
                commands.push(Command::StartDrivers(Selection::UNLOCK));
                self.arm(TimerKind::UnlockGuard, self.config.unlock_sample_ms, &mut commands);
                commands.push(Command::ShowOverlay);
                self.state = SamplingState::SamplingAfterUnlock;
            }
            (SamplingState::SamplingAfterUnlock, Event::DeviceUnlocked) => {
                self.arm(TimerKind::UnlockGuard, self.config.unlock_sample_ms, &mut commands);
                commands.push(Command::ShowOverlay);
            }
            (SamplingState::Idle, Event::PeriodicOnTick) if self.periodic_enabled => {
                commands.push(Command::StartDrivers(Selection::PERIODIC));
                self.arm(TimerKind::PeriodicOff, self.config.periodic_on_ms, &mut commands);
                self.state = SamplingState::SamplingPeriodic;
            }
            (SamplingState::SamplingPeriodic, Event::PeriodicOffTick) => {
                commands.push(Command::StopDrivers {
                    include_continuous: false,
                });
                if self.periodic_enabled {
                    self.arm(TimerKind::PeriodicOn, self.config.periodic_cycle_ms, &mut commands);
                }
                self.state = SamplingState::Idle;
            }
            (SamplingState::SamplingAfterUnlock | SamplingState::Idle, Event::PeriodicOffTick) => {
                // The window this tick closes was already ended by an unlock; only
                // keep the duty cycle going.
                if self.periodic_enabled && !self.is_armed(TimerKind::PeriodicOn) {
                    self.arm(TimerKind::PeriodicOn, self.config.periodic_cycle_ms, &mut commands);
                }
            }
            (SamplingState::SamplingAfterUnlock, Event::UnlockGuardExpired) => {
                commands.push(Command::StopDrivers {
                    include_continuous: false,
                });
                if self.periodic_enabled
                    && !self.is_armed(TimerKind::PeriodicOn)
                    && !self.is_armed(TimerKind::PeriodicOff)
                {
                    self.arm(TimerKind::PeriodicOn, self.config.periodic_cycle_ms, &mut commands);
                }
                self.state = SamplingState::Idle;
            }
            (SamplingState::SamplingAfterUnlock, Event::PeriodicOnTick) => {
                debug!("periodic window skipped; unlock sampling in progress");
            }
            (state, event) => {
                warn!("invalid transition: {event:?} in {state}; state unchanged");
            }
        }

        if self.state != from {
            info!(
                "state transition: {from} -> {} (periodic_enabled={})",
                self.state, self.periodic_enabled
            );
        }

        commands
    }

    fn listens_for_unlock(&self) -> bool {
        self.mode.is_some_and(|mode| mode.listens_for_unlock())
    }

    fn enter(&mut self, mode: SamplingMode, commands: &mut Vec<Command>) {
        self.mode = Some(mode);
        self.periodic_enabled = mode.is_periodic();

        match mode {
            SamplingMode::Continuous => commands.push(Command::StartDrivers(Selection::EVERYTHING)),
            _ => commands.push(Command::StartContinuous),
        }
        if self.periodic_enabled {
            self.arm(
                TimerKind::PeriodicOn,
                self.config.periodic_start_delay_ms,
                commands,
            );
        }
    }

    fn stop_everything(&mut self, commands: &mut Vec<Command>) {
        commands.push(Command::StopDrivers {
            include_continuous: true,
        });
        for timer in TimerKind::ALL {
            self.cancel(timer, commands);
        }
        commands.push(Command::HideOverlay);
    }

    fn arm(&mut self, timer: TimerKind, after_ms: u64, commands: &mut Vec<Command>) {
        self.armed[timer.index()] = true;
        commands.push(Command::Arm { timer, after_ms });
    }

    fn cancel(&mut self, timer: TimerKind, commands: &mut Vec<Command>) {
        self.armed[timer.index()] = false;
        commands.push(Command::Cancel(timer));
    }
}

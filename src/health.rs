use log::{debug, warn};

use crate::{
    config::HealthConfig,
    scheduler::{Event, SamplingState},
    strategy::SamplingManager,
};

/// Outcome of one healthcheck.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HealthReport {
    /// The running bit was set, so sampling should be live.
    pub expected_running: bool,
    pub scheduler_alive: bool,
    /// Continuous drivers that should be running but are not.
    pub missing_drivers: Vec<String>,
    /// Sampling was re-entered from scratch.
    pub restarted: bool,
    /// Missing continuous drivers were started in place.
    pub revived: bool,
}

/// Heals sampling that the OS killed underneath us. Runs on every unlock and on the
/// periodic healthcheck alarm.
#[derive(Clone)]
pub struct HealthSupervisor {
    manager: SamplingManager,
    config: HealthConfig,
}

impl HealthSupervisor {
    pub fn new(manager: SamplingManager, config: HealthConfig) -> Self {
        Self { manager, config }
    }

    pub async fn check(&self) -> HealthReport {
        let report = self.inspect().await;
        self.schedule_next();
        report
    }

    /// Arms the next periodic healthcheck.
    pub fn schedule_next(&self) {
        self.manager
            .context()
            .planner
            .schedule_healthcheck(self.config.interval_ms);
    }

    async fn inspect(&self) -> HealthReport {
        let ctx = self.manager.context();
        let mut report = HealthReport {
            expected_running: ctx.prefs.sampling_running(),
            ..HealthReport::default()
        };

        if !report.expected_running {
            report.scheduler_alive = ctx.scheduler.is_alive();
            debug!("healthcheck: sampling not expected to run");
            return report;
        }

        let respawned = ctx.scheduler.respawn_if_dead();
        let snapshot = ctx.scheduler.snapshot().await;
        report.scheduler_alive = !respawned && snapshot.is_some();

        let asleep = snapshot.is_some_and(|s| s.state == SamplingState::Sleep);
        if !asleep {
            report.missing_drivers = ctx
                .scheduler
                .registry()
                .list()
                .iter()
                .filter(|d| {
                    d.is_enabled() && d.can_continuous_sample() && d.is_available() && !d.is_running()
                })
                .map(|d| d.name().to_string())
                .collect();
        }

        let lost_mode = snapshot.is_some_and(|s| s.mode.is_none());
        if respawned || lost_mode {
            warn!(
                "healthcheck failed (scheduler_alive={}, mode_lost={lost_mode}); restarting {}",
                report.scheduler_alive,
                self.manager.strategy().name()
            );
            match self.manager.restart() {
                Ok(()) => report.restarted = true,
                Err(err) => warn!("restart after failed healthcheck did not go through: {err}"),
            }
        } else if !report.missing_drivers.is_empty() {
            warn!(
                "healthcheck: continuous drivers not running {:?}; starting them",
                report.missing_drivers
            );
            // State and timers are left as they are.
            report.revived = ctx.scheduler.post(Event::ReviveContinuous)
                && ctx.scheduler.snapshot().await.is_some();
        } else {
            debug!("healthcheck passed");
        }

        report
    }
}

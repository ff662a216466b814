mod controller;
mod state;

pub use controller::Scheduler;
pub use state::{
    stop_applies, Command, Event, SamplingMachine, SamplingMode, SamplingState,
    SchedulerSnapshot, Selection, TimerKind,
};

#[cfg(test)]
pub(crate) mod testing {
    use std::{sync::Arc, time::Duration};

    use crate::{
        alarm::{AlarmPlanner, TokioAlarmScheduler},
        clock::ManualClock,
        config::SchedulerConfig,
        interaction::InteractionHub,
        preferences::{JsonPreferences, Preferences},
        sensing::{DriverRegistry, SensorDriver},
    };

    use super::{SamplingState, Scheduler};

    pub fn spawn(drivers: Vec<Arc<dyn SensorDriver>>, config: SchedulerConfig) -> Scheduler {
        let clock = Arc::new(ManualClock::new(0));
        let (alarms, _fired) = TokioAlarmScheduler::new(clock.clone()).unwrap();
        let planner = AlarmPlanner::new(Arc::new(alarms), clock, config.resume_hour);
        let prefs = Preferences::new(Arc::new(JsonPreferences::in_memory()));
        Scheduler::spawn(
            DriverRegistry::new(drivers),
            planner,
            InteractionHub::new(None, prefs),
            config,
        )
    }

    /// Polls the loop until it reports `expected`, giving up after a second.
    pub async fn wait_for_state(scheduler: &Scheduler, expected: SamplingState) -> SamplingState {
        let mut last = SamplingState::Idle;
        for _ in 0..1_000 {
            if let Some(state) = scheduler.state().await {
                last = state;
                if state == expected {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        last
    }
}

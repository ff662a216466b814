//! Public facade over the scheduler: start, stop, pause and resume sampling under
//! one of the sampling policies, with a persisted running bit for cold starts.

mod manager;
mod strategies;

use std::sync::Arc;

use crate::{
    alarm::AlarmPlanner, clock::Clock, db::Database, preferences::Preferences,
    scheduler::Scheduler,
};

pub use manager::SamplingManager;
pub use strategies::{
    strategy_for, ContinuousStrategy, PeriodicStrategy, SamplingStrategy, UnlockAndPeriodicStrategy,
    UnlockStrategy,
};

/// Services a strategy acts on.
#[derive(Clone)]
pub struct SensingContext {
    pub scheduler: Scheduler,
    pub db: Database,
    pub prefs: Preferences,
    pub planner: AlarmPlanner,
    pub clock: Arc<dyn Clock>,
}

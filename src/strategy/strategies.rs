use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::{
    error::{Result, SensingError},
    scheduler::{Event, SamplingMode},
};

use super::SensingContext;

/// A sampling policy. Variants only choose the mode; the lifecycle is shared.
#[async_trait]
pub trait SamplingStrategy: Send + Sync {
    fn mode(&self) -> SamplingMode;

    fn name(&self) -> &'static str;

    /// Checks the reading store, sets the running bit and starts the scheduler in
    /// this strategy's mode. A store failure leaves the strategy stopped.
    async fn start(&self, ctx: &SensingContext) -> Result<()> {
        if let Err(err) = ctx.db.last_reading().await {
            remember_running(ctx, false);
            return Err(SensingError::store(err));
        }

        clear_pause(ctx);
        remember_running(ctx, true);
        post(ctx, Event::Start(self.mode()))?;
        info!("{} strategy started", self.name());
        Ok(())
    }

    async fn stop(&self, ctx: &SensingContext) -> Result<()> {
        remember_running(ctx, false);
        clear_pause(ctx);
        post(ctx, Event::StopAll)?;
        info!("{} strategy stopped", self.name());
        Ok(())
    }

    /// Sleeps until `until_ms`, or the next resume hour when `None`. Returns the
    /// resume instant, or `None` when sampling is not running.
    async fn pause(&self, ctx: &SensingContext, until_ms: Option<i64>) -> Result<Option<i64>> {
        if !self.is_running(ctx) {
            debug!("pause requested while {} strategy is stopped", self.name());
            return Ok(None);
        }

        let until_ms = until_ms.unwrap_or_else(|| ctx.planner.next_resume_at());
        if let Err(err) = ctx.prefs.set_study_paused(true, Some(until_ms)) {
            warn!("failed to persist study pause: {err:#}");
        }
        post(ctx, Event::EnterSleep { until_ms })?;
        info!("sampling paused until {until_ms}");
        Ok(Some(until_ms))
    }

    async fn resume(&self, ctx: &SensingContext) -> Result<()> {
        clear_pause(ctx);
        post(ctx, Event::ExitSleep)
    }

    fn is_running(&self, ctx: &SensingContext) -> bool {
        ctx.prefs.sampling_running() && ctx.scheduler.is_alive()
    }
}

fn post(ctx: &SensingContext, event: Event) -> Result<()> {
    if ctx.scheduler.post(event) {
        Ok(())
    } else {
        Err(SensingError::Transient("scheduler loop is not running".into()))
    }
}

fn remember_running(ctx: &SensingContext, running: bool) {
    if let Err(err) = ctx.prefs.set_sampling_running(running) {
        warn!("failed to persist running={running}: {err:#}");
    }
}

fn clear_pause(ctx: &SensingContext) {
    if ctx.prefs.study_paused() {
        if let Err(err) = ctx.prefs.set_study_paused(false, None) {
            warn!("failed to clear study pause: {err:#}");
        }
    }
}

/// Everything on, all the time.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinuousStrategy;

/// Duty-cycled windows only.
#[derive(Debug, Default, Clone, Copy)]
pub struct PeriodicStrategy;

/// A window after every unlock.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnlockStrategy;

#[derive(Debug, Default, Clone, Copy)]
pub struct UnlockAndPeriodicStrategy;

impl SamplingStrategy for ContinuousStrategy {
    fn mode(&self) -> SamplingMode {
        SamplingMode::Continuous
    }

    fn name(&self) -> &'static str {
        "continuous"
    }
}

impl SamplingStrategy for PeriodicStrategy {
    fn mode(&self) -> SamplingMode {
        SamplingMode::Periodic
    }

    fn name(&self) -> &'static str {
        "periodic"
    }
}

impl SamplingStrategy for UnlockStrategy {
    fn mode(&self) -> SamplingMode {
        SamplingMode::Unlock
    }

    fn name(&self) -> &'static str {
        "unlock"
    }
}

impl SamplingStrategy for UnlockAndPeriodicStrategy {
    fn mode(&self) -> SamplingMode {
        SamplingMode::UnlockAndPeriodic
    }

    fn name(&self) -> &'static str {
        "unlock+periodic"
    }
}

pub fn strategy_for(mode: SamplingMode) -> Arc<dyn SamplingStrategy> {
    match mode {
        SamplingMode::Continuous => Arc::new(ContinuousStrategy),
        SamplingMode::Periodic => Arc::new(PeriodicStrategy),
        SamplingMode::Unlock => Arc::new(UnlockStrategy),
        SamplingMode::UnlockAndPeriodic => Arc::new(UnlockAndPeriodicStrategy),
    }
}

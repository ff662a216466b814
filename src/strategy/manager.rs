use std::sync::{Arc, RwLock};

use log::{debug, info};

use crate::{
    error::{Result, SensingError},
    scheduler::{Event, SamplingMode, SamplingState},
};

use super::{strategies::strategy_for, SamplingStrategy, SensingContext};

/// Holds the selected strategy and routes the facade calls to it.
#[derive(Clone)]
pub struct SamplingManager {
    ctx: SensingContext,
    strategy: Arc<RwLock<Arc<dyn SamplingStrategy>>>,
}

impl SamplingManager {
    pub fn new(ctx: SensingContext, mode: SamplingMode) -> Self {
        Self {
            ctx,
            strategy: Arc::new(RwLock::new(strategy_for(mode))),
        }
    }

    pub fn context(&self) -> &SensingContext {
        &self.ctx
    }

    pub fn strategy(&self) -> Arc<dyn SamplingStrategy> {
        let current = self
            .strategy
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }

    pub fn mode(&self) -> SamplingMode {
        self.strategy().mode()
    }

    pub async fn start(&self) -> Result<()> {
        self.strategy().start(&self.ctx).await
    }

    pub async fn stop(&self) -> Result<()> {
        self.strategy().stop(&self.ctx).await
    }

    pub async fn pause(&self, until_ms: Option<i64>) -> Result<Option<i64>> {
        self.strategy().pause(&self.ctx, until_ms).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.strategy().resume(&self.ctx).await
    }

    pub fn is_running(&self) -> bool {
        self.strategy().is_running(&self.ctx)
    }

    /// Switches policy. A running scheduler is moved to the new mode right away,
    /// keeping an active pause in place.
    pub async fn set_strategy(&self, mode: SamplingMode) -> Result<()> {
        let previous = {
            let mut current = self
                .strategy
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *current, strategy_for(mode))
        };
        info!("sampling strategy {} -> {}", previous.name(), self.strategy().name());

        if self.ctx.prefs.sampling_running() {
            self.restart()?;
        }
        Ok(())
    }

    /// Reattaches after a process start. Returns whether sampling was resumed.
    pub async fn restore(&self) -> Result<bool> {
        if !self.ctx.prefs.sampling_running() {
            debug!("sampling was not running before this start");
            return Ok(false);
        }

        if self.active_pause().is_some() {
            self.restart()?;
        } else {
            self.start().await?;
        }
        Ok(true)
    }

    /// Re-posts the current mode to the scheduler, into SLEEP when a pause is still
    /// active.
    pub fn restart(&self) -> Result<()> {
        let mode = self.mode();
        let event = match self.active_pause() {
            Some(until_ms) => Event::StartPaused { mode, until_ms },
            None => Event::Start(mode),
        };

        info!("restarting sampling with {event:?}");
        if self.ctx.scheduler.post(event) {
            Ok(())
        } else {
            Err(SensingError::Transient("scheduler loop is not running".into()))
        }
    }

    /// Handler for the resume alarm. Deliveries may repeat, so it only acts while the
    /// scheduler is actually asleep.
    pub async fn on_resume_alarm(&self) -> Result<()> {
        match self.ctx.scheduler.state().await {
            Some(SamplingState::Sleep) => {
                info!("pause window over; resuming sampling");
                self.resume().await
            }
            state => {
                debug!("resume alarm ignored in {state:?}");
                Ok(())
            }
        }
    }

    fn active_pause(&self) -> Option<i64> {
        let prefs = &self.ctx.prefs;
        let until_ms = prefs.study_paused_until();
        (prefs.study_paused() && until_ms > self.ctx.clock.now_ms()).then_some(until_ms)
    }
}

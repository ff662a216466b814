//! Exact wall-clock alarms.
//!
//! Deliveries are at-least-once: a handler may see the same tag twice, and must look
//! at current state before acting.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Context;
use log::{debug, info, warn};
use tokio::{runtime::Handle, sync::mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{next_local_hour_ms, Clock},
    error::Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlarmTag {
    /// End of a study pause.
    ResumeSampling,
    /// Next attempt after a failed upload pass.
    UploadRetry,
    Healthcheck,
}

/// Platform exact-alarm primitive. Scheduling a tag that is already pending replaces
/// the earlier alarm.
pub trait AlarmScheduler: Send + Sync {
    fn schedule_exact(&self, at_ms: i64, tag: AlarmTag) -> Result<()>;
    fn cancel(&self, tag: AlarmTag);
}

/// In-process alarms on the tokio timer. Fired tags are delivered on the channel
/// returned by [`TokioAlarmScheduler::new`].
pub struct TokioAlarmScheduler {
    clock: Arc<dyn Clock>,
    runtime: Handle,
    fired: mpsc::UnboundedSender<AlarmTag>,
    pending: Mutex<HashMap<AlarmTag, CancellationToken>>,
}

impl TokioAlarmScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> anyhow::Result<(Self, mpsc::UnboundedReceiver<AlarmTag>)> {
        let runtime = Handle::try_current().context("alarm scheduler needs a tokio runtime")?;
        let (fired, receiver) = mpsc::unbounded_channel();
        Ok((
            Self {
                clock,
                runtime,
                fired,
                pending: Mutex::new(HashMap::new()),
            },
            receiver,
        ))
    }

    fn pending(&self) -> std::sync::MutexGuard<'_, HashMap<AlarmTag, CancellationToken>> {
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AlarmScheduler for TokioAlarmScheduler {
    fn schedule_exact(&self, at_ms: i64, tag: AlarmTag) -> Result<()> {
        let delay_ms = (at_ms - self.clock.now_ms()).max(0) as u64;
        let token = CancellationToken::new();
        if let Some(previous) = self.pending().insert(tag, token.clone()) {
            previous.cancel();
        }

        let fired = self.fired.clone();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                    if fired.send(tag).is_err() {
                        debug!("alarm {tag:?} fired after its receiver closed");
                    }
                }
            }
        });

        debug!("alarm {tag:?} scheduled in {delay_ms}ms");
        Ok(())
    }

    fn cancel(&self, tag: AlarmTag) {
        if let Some(token) = self.pending().remove(&tag) {
            token.cancel();
        }
    }
}

/// Thin policy layer over the alarm primitive: knows which tag serves which purpose
/// and when the nightly resume falls.
#[derive(Clone)]
pub struct AlarmPlanner {
    alarms: Arc<dyn AlarmScheduler>,
    clock: Arc<dyn Clock>,
    resume_hour: u32,
}

impl AlarmPlanner {
    pub fn new(alarms: Arc<dyn AlarmScheduler>, clock: Arc<dyn Clock>, resume_hour: u32) -> Self {
        Self {
            alarms,
            clock,
            resume_hour,
        }
    }

    /// Next local `resume_hour:00` strictly after now.
    pub fn next_resume_at(&self) -> i64 {
        next_local_hour_ms(self.clock.now_ms(), self.resume_hour)
    }

    pub fn schedule_resume(&self, at_ms: i64) {
        info!("sampling resume scheduled at {at_ms}");
        self.schedule(at_ms, AlarmTag::ResumeSampling);
    }

    pub fn cancel_resume(&self) {
        self.alarms.cancel(AlarmTag::ResumeSampling);
    }

    pub fn schedule_upload_retry(&self, delay: Duration) {
        let at_ms = self.clock.now_ms() + delay.as_millis() as i64;
        info!("upload retry in {}s", delay.as_secs());
        self.schedule(at_ms, AlarmTag::UploadRetry);
    }

    pub fn cancel_upload_retry(&self) {
        self.alarms.cancel(AlarmTag::UploadRetry);
    }

    pub fn schedule_healthcheck(&self, interval_ms: u64) {
        self.schedule(
            self.clock.now_ms() + interval_ms as i64,
            AlarmTag::Healthcheck,
        );
    }

    pub fn cancel_healthcheck(&self) {
        self.alarms.cancel(AlarmTag::Healthcheck);
    }

    fn schedule(&self, at_ms: i64, tag: AlarmTag) {
        if let Err(err) = self.alarms.schedule_exact(at_ms, tag) {
            warn!("failed to schedule {tag:?} alarm: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn fires_at_deadline() {
        let clock = Arc::new(ManualClock::new(10_000));
        let (alarms, mut fired) = TokioAlarmScheduler::new(clock).unwrap();

        alarms.schedule_exact(15_000, AlarmTag::ResumeSampling).unwrap();
        let start = tokio::time::Instant::now();
        assert_eq!(fired.recv().await, Some(AlarmTag::ResumeSampling));
        assert!(start.elapsed() >= Duration::from_millis(5_000));
        assert!(start.elapsed() < Duration::from_millis(5_100));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_replace() {
        let clock = Arc::new(ManualClock::new(0));
        let (alarms, mut fired) = TokioAlarmScheduler::new(clock).unwrap();

        alarms.schedule_exact(1_000, AlarmTag::UploadRetry).unwrap();
        alarms.cancel(AlarmTag::UploadRetry);
        alarms.schedule_exact(2_000, AlarmTag::Healthcheck).unwrap();
        alarms.schedule_exact(3_000, AlarmTag::Healthcheck).unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(fired.recv().await, Some(AlarmTag::Healthcheck));
        assert!(start.elapsed() >= Duration::from_millis(3_000));
        assert!(start.elapsed() < Duration::from_millis(3_100));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(fired.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn past_deadline_fires_immediately() {
        let clock = Arc::new(ManualClock::new(50_000));
        let (alarms, mut fired) = TokioAlarmScheduler::new(clock.clone()).unwrap();
        let planner = AlarmPlanner::new(Arc::new(alarms), clock, 6);

        planner.schedule_resume(1_000);
        assert_eq!(fired.recv().await, Some(AlarmTag::ResumeSampling));
        assert!(planner.next_resume_at() > 50_000);
    }
}

use std::{sync::Arc, time::Duration};

use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{alarm::AlarmPlanner, config::UploadConfig};

use super::uploader::BatchUploader;

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Background owner of the uploader: one pass at startup, then every `interval_ms`,
/// and whenever [`UploadWorker::trigger`] is called. Failed passes schedule a retry
/// alarm with exponential backoff.
pub struct UploadWorker {
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl UploadWorker {
    pub fn spawn(uploader: Arc<BatchUploader>, planner: AlarmPlanner) -> Self {
        let trigger = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(upload_loop(
            uploader,
            planner,
            Arc::clone(&trigger),
            cancel.clone(),
        ));

        Self {
            trigger,
            cancel,
            task,
        }
    }

    /// Requests a pass as soon as the current one (if any) ends.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

fn retry_backoff(config: &UploadConfig) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(config.retry_initial_ms))
        .with_max_interval(Duration::from_millis(config.retry_max_ms))
        .with_max_elapsed_time(None)
        .build()
}

async fn upload_loop(
    uploader: Arc<BatchUploader>,
    planner: AlarmPlanner,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
) {
    let config = uploader.config().clone();
    let mut backoff = retry_backoff(&config);
    let mut ticker = tokio::time::interval(Duration::from_millis(config.interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log_info!("upload worker shutting down");
                break;
            }
            _ = ticker.tick() => {}
            _ = trigger.notified() => {}
        }

        match uploader.run().await {
            Ok(_) => {
                backoff.reset();
                planner.cancel_upload_retry();
                report_stale(&uploader, &config).await;
            }
            Err(err) if err.is_retryable() => {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or_else(|| Duration::from_millis(config.retry_max_ms));
                log_warn!("upload pass failed: {err}");
                planner.schedule_upload_retry(delay);
            }
            Err(err) => log_error!("upload pass aborted: {err}"),
        }
    }
}

async fn report_stale(uploader: &BatchUploader, config: &UploadConfig) {
    match uploader.stale_count().await {
        Ok(0) => {}
        Ok(count) => log_warn!(
            "{count} readings older than {}h are still unsynced",
            config.stale_after_ms / 3_600_000
        ),
        Err(err) => log_error!("stale reading check failed: {err}"),
    }
}

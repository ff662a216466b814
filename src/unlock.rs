use log::{debug, info};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    error::Result,
    health::HealthSupervisor,
    scheduler::{Event, Scheduler},
    sensing::{
        platform::{ScreenEventSource, ScreenSignal},
        Subscription,
    },
};

/// Forwards lock and unlock signals to the scheduler. Signals arrive on platform
/// threads and are handed to a tokio task through a channel.
pub struct ScreenWatcher {
    subscription: Option<Subscription>,
    task: JoinHandle<()>,
}

impl ScreenWatcher {
    /// Subscribes to `source`. With a supervisor attached, every unlock also runs a
    /// healthcheck.
    pub fn spawn(
        source: &dyn ScreenEventSource,
        scheduler: Scheduler,
        health: Option<HealthSupervisor>,
    ) -> Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<ScreenSignal>();
        let subscription = source.subscribe(Box::new(move |signal| {
            let _ = sender.send(signal);
        }))?;

        let task = tokio::spawn(async move {
            while let Some(signal) = receiver.recv().await {
                match signal {
                    ScreenSignal::UserPresent => {
                        scheduler.post(Event::DeviceUnlocked);
                        if let Some(health) = &health {
                            health.check().await;
                        }
                    }
                    ScreenSignal::ScreenOff => {
                        scheduler.post(Event::DeviceLocked);
                    }
                    // the keyguard may still be up
                    ScreenSignal::ScreenOn => debug!("screen on"),
                }
            }
            info!("screen watcher stopped");
        });

        Ok(Self {
            subscription: Some(subscription),
            task,
        })
    }

    pub fn stop(mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.cancel();
        }
        self.task.abort();
    }
}

pub mod alarm;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod hashing;
pub mod health;
pub mod interaction;
pub mod preferences;
pub mod scheduler;
pub mod sensing;
pub mod strategy;
pub mod unlock;
pub mod upload;
mod utils;

use std::{fs, sync::Arc};

use anyhow::Context;
use log::{debug, info, warn};
use tokio::{sync::mpsc, task::JoinHandle};

use alarm::{AlarmPlanner, AlarmScheduler, AlarmTag, TokioAlarmScheduler};
use clock::{Clock, SystemClock};
use config::CoreConfig;
use db::Database;
use health::{HealthReport, HealthSupervisor};
use interaction::{InteractionHub, InteractionSurface};
use preferences::{JsonPreferences, PreferenceStore, Preferences};
use scheduler::Scheduler;
use sensing::{
    platform::ScreenEventSource, standard_drivers, DriverContext, DriverKind, DriverRegistry,
    PlatformAdapters,
};
use strategy::SamplingManager;
use unlock::ScreenWatcher;
use upload::{
    AuthTokenSource, BatchUploader, HttpBackend, ReadingBackend, UploadReport, UploadWorker,
};

pub use error::{ErrorKind, SensingError};
pub use strategy::SensingContext;
pub use utils::logging::init_logging;

/// What the host brings: platform sources, the auth layer and optional overrides for
/// the backend, the preference store, the alarm primitive and the clock.
pub struct HostAdapters {
    pub platform: PlatformAdapters,
    pub screen: Option<Arc<dyn ScreenEventSource>>,
    pub auth: Arc<dyn AuthTokenSource>,
    pub interaction: Option<Arc<dyn InteractionSurface>>,
    /// Defaults to the HTTP backend at `upload.base_url`.
    pub backend: Option<Arc<dyn ReadingBackend>>,
    /// Defaults to a JSON file at `preferences_path`.
    pub preferences: Option<Arc<dyn PreferenceStore>>,
    /// OS exact alarms. The host hands fired tags back through
    /// [`SensingCore::on_alarm`]. Defaults to in-process tokio timers.
    pub alarms: Option<Arc<dyn AlarmScheduler>>,
    pub clock: Arc<dyn Clock>,
}

impl HostAdapters {
    pub fn new(auth: Arc<dyn AuthTokenSource>) -> Self {
        Self {
            platform: PlatformAdapters::default(),
            screen: None,
            auth,
            interaction: None,
            backend: None,
            preferences: None,
            alarms: None,
            clock: Arc::new(SystemClock),
        }
    }
}

/// The running core: scheduler loop, upload worker, screen watcher and alarm routing.
pub struct SensingCore {
    config: CoreConfig,
    db: Database,
    manager: SamplingManager,
    health: HealthSupervisor,
    uploader: Arc<BatchUploader>,
    worker: Arc<UploadWorker>,
    watcher: Option<ScreenWatcher>,
    router: AlarmRouter,
    alarm_pump: Option<JoinHandle<()>>,
}

impl SensingCore {
    /// Builds every component on the current tokio runtime and reattaches sampling
    /// if it was running before this process started.
    pub async fn start(config: CoreConfig, host: HostAdapters) -> anyhow::Result<Self> {
        fs::create_dir_all(&config.recordings_dir).with_context(|| {
            format!(
                "failed to create recordings dir {}",
                config.recordings_dir.display()
            )
        })?;
        if let Some(parent) = config.database_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let clock = host.clock;
        let db = Database::new(config.database_path.clone())?;
        let store: Arc<dyn PreferenceStore> = match host.preferences {
            Some(store) => store,
            None => Arc::new(JsonPreferences::new(config.preferences_path.clone())?),
        };
        let prefs = Preferences::new(store);

        let driver_ctx = DriverContext {
            sink: Arc::new(db.clone()),
            clock: Arc::clone(&clock),
            salt: Arc::from(prefs.sensitive_data_salt()?),
        };
        let drivers = standard_drivers(&host.platform, &driver_ctx, config.recordings_dir.clone());
        let registry = DriverRegistry::load(db.clone(), drivers).await?;

        let (alarms, fired): (Arc<dyn AlarmScheduler>, _) = match host.alarms {
            Some(alarms) => (alarms, None),
            None => {
                let (alarms, fired) = TokioAlarmScheduler::new(Arc::clone(&clock))?;
                (Arc::new(alarms), Some(fired))
            }
        };
        let planner = AlarmPlanner::new(alarms, Arc::clone(&clock), config.scheduler.resume_hour);

        let scheduler = Scheduler::spawn(
            registry,
            planner.clone(),
            InteractionHub::new(host.interaction, prefs.clone()),
            config.scheduler.clone(),
        );

        let manager = SamplingManager::new(
            SensingContext {
                scheduler: scheduler.clone(),
                db: db.clone(),
                prefs,
                planner: planner.clone(),
                clock: Arc::clone(&clock),
            },
            config.strategy,
        );
        let health = HealthSupervisor::new(manager.clone(), config.health.clone());

        let backend: Arc<dyn ReadingBackend> = match host.backend {
            Some(backend) => backend,
            None => Arc::new(HttpBackend::new(&config.upload)?),
        };
        let uploader = Arc::new(BatchUploader::new(
            db.clone(),
            backend,
            host.auth,
            Arc::clone(&clock),
            config.upload.clone(),
        ));
        let worker = Arc::new(UploadWorker::spawn(Arc::clone(&uploader), planner));

        let watcher = match &host.screen {
            Some(screen) => Some(ScreenWatcher::spawn(
                screen.as_ref(),
                scheduler,
                Some(health.clone()),
            )?),
            None => None,
        };

        let router = AlarmRouter {
            manager: manager.clone(),
            worker: Arc::clone(&worker),
            health: health.clone(),
        };
        let alarm_pump = fired.map(|fired| tokio::spawn(router.clone().pump(fired)));

        match manager.restore().await {
            Ok(true) => info!("sampling reattached with the {} strategy", manager.strategy().name()),
            Ok(false) => {}
            Err(err) => warn!("failed to reattach sampling: {err}"),
        }
        health.schedule_next();

        info!(
            "sensing core started (db={}, strategy={:?})",
            db.path().display(),
            config.strategy
        );

        Ok(Self {
            config,
            db,
            manager,
            health,
            uploader,
            worker,
            watcher,
            router,
            alarm_pump,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn manager(&self) -> &SamplingManager {
        &self.manager
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.manager.context().scheduler
    }

    pub fn registry(&self) -> &DriverRegistry {
        self.scheduler().registry()
    }

    /// Feeds a host-side event (accessibility, notification, UI tree) to its driver.
    pub fn push_host_event(&self, kind: DriverKind, payload: &str) -> bool {
        self.registry()
            .by_kind(kind)
            .is_some_and(|driver| driver.push_event(payload))
    }

    /// Host listener service for `kind` was bound or revoked. Returns `false` when
    /// `kind` is not a host-fed driver. A newly available driver is started by the
    /// next healthcheck.
    pub fn set_host_stream_available(&self, kind: DriverKind, available: bool) -> bool {
        let Some(driver) = self.registry().by_kind(kind) else {
            return false;
        };
        let applied = driver.set_available(available);
        if applied {
            info!("{} available={available}", driver.name());
        }
        applied
    }

    /// Delivers an alarm fired by the host's alarm service.
    pub async fn on_alarm(&self, tag: AlarmTag) {
        self.router.dispatch(tag).await;
    }

    /// Runs one upload pass on the caller's task.
    pub async fn upload_now(&self) -> error::Result<UploadReport> {
        self.uploader.run().await
    }

    /// Wakes the background upload worker.
    pub fn request_upload(&self) {
        self.worker.trigger();
    }

    pub async fn check_health(&self) -> HealthReport {
        self.health.check().await
    }

    /// Stops sampling tasks and background work. The running bit is left as is so
    /// the next start reattaches.
    pub fn shutdown(mut self) {
        if let Some(watcher) = self.watcher.take() {
            watcher.stop();
        }
        if let Some(pump) = self.alarm_pump.take() {
            pump.abort();
        }
        self.worker.shutdown();
        self.scheduler().shutdown();
        info!("sensing core shut down");
    }
}

/// Sends each fired tag to its handler. Handlers check state first, so duplicate
/// deliveries are harmless.
#[derive(Clone)]
struct AlarmRouter {
    manager: SamplingManager,
    worker: Arc<UploadWorker>,
    health: HealthSupervisor,
}

impl AlarmRouter {
    async fn dispatch(&self, tag: AlarmTag) {
        debug!("alarm {tag:?} fired");
        match tag {
            AlarmTag::ResumeSampling => {
                if let Err(err) = self.manager.on_resume_alarm().await {
                    warn!("resume alarm failed: {err}");
                }
            }
            AlarmTag::UploadRetry => self.worker.trigger(),
            AlarmTag::Healthcheck => {
                self.health.check().await;
            }
        }
    }

    async fn pump(self, mut fired: mpsc::UnboundedReceiver<AlarmTag>) {
        while let Some(tag) = fired.recv().await {
            self.dispatch(tag).await;
        }
    }
}

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use log::{error, warn};
use serde::{Deserialize, Serialize};

use crate::{
    clock::Clock,
    db::{NewReading, ReadingSink},
    error::Result,
    hashing::salted_hash,
};

/// Every signal source the core knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    Accelerometer,
    Gyroscope,
    Light,
    Proximity,
    Orientation,
    Charging,
    AirplaneMode,
    RingtoneVolume,
    ConnectedWifi,
    Bluetooth,
    ScreenState,
    ScreenOrientation,
    Accessibility,
    Notifications,
    UiTree,
    AudioSample,
}

impl DriverKind {
    pub const ALL: [DriverKind; 16] = [
        DriverKind::Accelerometer,
        DriverKind::Gyroscope,
        DriverKind::Light,
        DriverKind::Proximity,
        DriverKind::Orientation,
        DriverKind::Charging,
        DriverKind::AirplaneMode,
        DriverKind::RingtoneVolume,
        DriverKind::ConnectedWifi,
        DriverKind::Bluetooth,
        DriverKind::ScreenState,
        DriverKind::ScreenOrientation,
        DriverKind::Accessibility,
        DriverKind::Notifications,
        DriverKind::UiTree,
        DriverKind::AudioSample,
    ];

    /// Stable label written as `sensor_name` on every reading.
    pub fn label(&self) -> &'static str {
        match self {
            DriverKind::Accelerometer => "Accelerometer",
            DriverKind::Gyroscope => "Gyroscope",
            DriverKind::Light => "Light Sensor",
            DriverKind::Proximity => "Proximity",
            DriverKind::Orientation => "Orientation Sensor",
            DriverKind::Charging => "Charging",
            DriverKind::AirplaneMode => "Airplane Mode",
            DriverKind::RingtoneVolume => "Ringtone Volume",
            DriverKind::ConnectedWifi => "Wi-Fi SSID",
            DriverKind::Bluetooth => "Nearby Bluetooth",
            DriverKind::ScreenState => "Screen On/Off",
            DriverKind::ScreenOrientation => "Screen Orientation",
            DriverKind::Accessibility => "Accessibility",
            DriverKind::Notifications => "Notification",
            DriverKind::UiTree => "UITree",
            DriverKind::AudioSample => "Audio Sample",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeState {
    Idle,
    Running,
}

/// Point-in-time view of a driver, used for selection and inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DriverDescriptor {
    pub kind: DriverKind,
    pub name: &'static str,
    pub enabled: bool,
    pub runtime_state: RuntimeState,
    pub available_on_this_device: bool,
    pub can_periodic_sample: bool,
    pub can_continuous_sample: bool,
}

impl DriverDescriptor {
    pub fn is_running(&self) -> bool {
        self.runtime_state == RuntimeState::Running
    }
}

/// What every driver is constructed with.
#[derive(Clone)]
pub struct DriverContext {
    pub sink: Arc<dyn ReadingSink>,
    pub clock: Arc<dyn Clock>,
    pub salt: Arc<str>,
}

/// Plumbing shared by all drivers: the label, the enabled and running flags, and the
/// path into the reading sink. Drivers hold it behind an `Arc` so platform callbacks
/// can emit after `start` returns.
pub struct DriverCore {
    kind: DriverKind,
    enabled: AtomicBool,
    running: AtomicBool,
    ctx: DriverContext,
}

impl DriverCore {
    pub fn new(kind: DriverKind, ctx: DriverContext) -> Self {
        Self {
            kind,
            enabled: AtomicBool::new(true),
            running: AtomicBool::new(false),
            ctx,
        }
    }

    pub fn kind(&self) -> DriverKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.label()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flips idle to running. Returns false when the driver was already running, in
    /// which case the caller must not acquire anything.
    pub fn begin(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Flips running to idle. Returns whether the driver was running.
    pub fn finish(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }

    pub fn now_ms(&self) -> i64 {
        self.ctx.clock.now_ms()
    }

    pub fn emit(&self, payload: impl Into<String>) {
        self.submit(NewReading::new(self.now_ms(), self.name(), payload));
    }

    pub fn emit_at(&self, timestamp: i64, payload: impl Into<String>) {
        self.submit(NewReading::new(timestamp, self.name(), payload));
    }

    pub fn emit_file(&self, timestamp: i64, payload: impl Into<String>, path: &str, mime: &str) {
        self.submit(NewReading::new(timestamp, self.name(), payload).with_file(path, mime));
    }

    /// Salted hash for identifiers that must not leave the device in clear.
    pub fn pseudonymize(&self, raw: &str) -> String {
        salted_hash(raw, &self.ctx.salt)
    }

    fn submit(&self, reading: NewReading) {
        if let Err(err) = self.ctx.sink.insert(reading) {
            error!("{}: failed to queue reading: {err:#}", self.name());
        }
    }
}

/// Capability contract every driver implements.
///
/// `start` is idempotent and must not acquire anything twice. `stop` releases every
/// subscription the driver holds and never fails when nothing is held.
pub trait SensorDriver: Send + Sync {
    fn core(&self) -> &DriverCore;

    fn is_available(&self) -> bool;

    fn can_periodic_sample(&self) -> bool;

    fn can_continuous_sample(&self) -> bool {
        false
    }

    fn start(&self) -> Result<()>;

    fn stop(&self);

    /// Host-fed drivers accept events pushed from outside. Returns whether the event
    /// was recorded.
    fn push_event(&self, _payload: &str) -> bool {
        false
    }

    /// Host-fed drivers follow the host's listener service. Returns `false` for
    /// drivers whose availability is fixed by the platform.
    fn set_available(&self, _available: bool) -> bool {
        false
    }

    fn kind(&self) -> DriverKind {
        self.core().kind()
    }

    fn name(&self) -> &'static str {
        self.core().name()
    }

    fn is_enabled(&self) -> bool {
        self.core().is_enabled()
    }

    fn set_enabled(&self, enabled: bool) {
        self.core().set_enabled(enabled);
    }

    fn is_running(&self) -> bool {
        self.core().is_running()
    }

    fn descriptor(&self) -> DriverDescriptor {
        DriverDescriptor {
            kind: self.kind(),
            name: self.name(),
            enabled: self.is_enabled(),
            runtime_state: if self.is_running() {
                RuntimeState::Running
            } else {
                RuntimeState::Idle
            },
            available_on_this_device: self.is_available(),
            can_periodic_sample: self.can_periodic_sample(),
            can_continuous_sample: self.can_continuous_sample(),
        }
    }
}

/// Scoped registration with a platform source. Dropping it (or calling `cancel`)
/// unregisters exactly once.
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { release: None }
    }

    pub fn cancel(mut self) {
        self.release_now();
    }

    fn release_now(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_now();
    }
}

/// Runs a platform callback, logging and swallowing any panic so it never reaches
/// the thread that delivered the event.
pub fn guarded<F: FnOnce()>(name: &str, callback: F) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!("{name}: callback panicked; event dropped");
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn subscription_releases_once() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let subscription = Subscription::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        subscription.cancel();
        assert_eq!(released.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&released);
        {
            let _scoped = Subscription::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(released.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn guarded_swallows_panics() {
        guarded("test", || panic!("boom"));
    }

    #[test]
    fn labels_are_unique() {
        let mut labels: Vec<&str> = DriverKind::ALL.iter().map(|k| k.label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), DriverKind::ALL.len());
    }
}

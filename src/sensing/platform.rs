//! Narrow adapters over the platform signal sources. The host implements these; the
//! drivers only ever see the traits.

use std::path::Path;

use crate::error::Result;

use super::driver::Subscription;

/// Callback invoked on a platform-owned thread.
pub type Callback<T> = Box<dyn Fn(T) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionKind {
    Accelerometer,
    Gyroscope,
    Light,
    Proximity,
    Orientation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MotionSample {
    pub values: Vec<f64>,
}

/// Push-based hardware sensors.
pub trait MotionSource: Send + Sync {
    fn has_sensor(&self, kind: MotionKind) -> bool;
    fn subscribe(&self, kind: MotionKind, on_sample: Callback<MotionSample>) -> Result<Subscription>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKind {
    Charging,
    AirplaneMode,
    RingtoneVolume,
    ConnectedWifi,
}

/// One-shot device state reads.
pub trait DeviceProbe: Send + Sync {
    fn supports(&self, probe: ProbeKind) -> bool;
    /// Current value rendered as text. Wi-Fi returns the raw SSID; the driver hashes it.
    fn read(&self, probe: ProbeKind) -> Result<String>;
}

pub trait BluetoothScanner: Send + Sync {
    fn is_available(&self) -> bool;
    /// Starts discovery; `on_found` receives the MAC address of every device seen until
    /// the subscription is dropped.
    fn start_discovery(&self, on_found: Callback<String>) -> Result<Subscription>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenOrientation {
    Portrait,
    Landscape,
    Undefined,
}

impl ScreenOrientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScreenOrientation::Portrait => "PORTRAIT",
            ScreenOrientation::Landscape => "LANDSCAPE",
            ScreenOrientation::Undefined => "UNDEFINED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayEvent {
    ScreenOn,
    ScreenOff,
    OrientationChanged(ScreenOrientation),
}

/// Display broadcasts plus the current display state.
pub trait DisplayEvents: Send + Sync {
    fn screen_on(&self) -> bool;
    fn orientation(&self) -> ScreenOrientation;
    fn subscribe(&self, on_event: Callback<DisplayEvent>) -> Result<Subscription>;
}

/// An open recording sink; `finish` flushes and closes the file.
pub trait Recording: Send {
    fn finish(self: Box<Self>) -> Result<()>;
}

pub trait AudioRecorder: Send + Sync {
    fn is_available(&self) -> bool;
    fn mime_type(&self) -> &str;
    fn file_extension(&self) -> &str;
    fn open(&self, path: &Path) -> Result<Box<dyn Recording>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScreenSignal {
    ScreenOn,
    /// The keyguard was dismissed.
    UserPresent,
    ScreenOff,
}

/// Lock-state signals consumed by the unlock watcher.
pub trait ScreenEventSource: Send + Sync {
    fn subscribe(&self, on_signal: Callback<ScreenSignal>) -> Result<Subscription>;
}

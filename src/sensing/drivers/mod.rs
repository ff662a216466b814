mod audio;
mod bluetooth;
mod broadcast;
mod host_stream;
mod motion;
mod probe;

use std::{path::PathBuf, sync::Arc};

pub use audio::AudioDriver;
pub use bluetooth::BluetoothDriver;
pub use broadcast::{BroadcastDriver, DisplayChannel};
pub use host_stream::HostStreamDriver;
pub use motion::MotionDriver;
pub use probe::ProbeDriver;

use super::{
    driver::{DriverContext, DriverKind, SensorDriver},
    platform::{
        AudioRecorder, BluetoothScanner, DeviceProbe, DisplayEvents, MotionKind, MotionSource,
        ProbeKind,
    },
};

/// Platform sources the host can offer. Missing sources mean the matching drivers
/// are not built.
#[derive(Clone, Default)]
pub struct PlatformAdapters {
    pub motion: Option<Arc<dyn MotionSource>>,
    pub probe: Option<Arc<dyn DeviceProbe>>,
    pub bluetooth: Option<Arc<dyn BluetoothScanner>>,
    pub display: Option<Arc<dyn DisplayEvents>>,
    pub audio: Option<Arc<dyn AudioRecorder>>,
    /// Host-fed drivers (accessibility, notifications, UI tree) are always built; this
    /// says whether the host's listener services are bound right now.
    pub host_streams: bool,
}

/// Builds the process's driver set from whatever the platform provides.
pub fn standard_drivers(
    adapters: &PlatformAdapters,
    ctx: &DriverContext,
    recordings_dir: PathBuf,
) -> Vec<Arc<dyn SensorDriver>> {
    let mut drivers: Vec<Arc<dyn SensorDriver>> = Vec::new();

    if let Some(motion) = &adapters.motion {
        for kind in [
            MotionKind::Accelerometer,
            MotionKind::Gyroscope,
            MotionKind::Light,
            MotionKind::Proximity,
            MotionKind::Orientation,
        ] {
            drivers.push(Arc::new(MotionDriver::new(kind, Arc::clone(motion), ctx.clone())));
        }
    }

    if let Some(probe) = &adapters.probe {
        for kind in [
            ProbeKind::Charging,
            ProbeKind::AirplaneMode,
            ProbeKind::RingtoneVolume,
            ProbeKind::ConnectedWifi,
        ] {
            drivers.push(Arc::new(ProbeDriver::new(kind, Arc::clone(probe), ctx.clone())));
        }
    }

    if let Some(scanner) = &adapters.bluetooth {
        drivers.push(Arc::new(BluetoothDriver::new(Arc::clone(scanner), ctx.clone())));
    }

    if let Some(display) = &adapters.display {
        for channel in [DisplayChannel::ScreenState, DisplayChannel::Orientation] {
            drivers.push(Arc::new(BroadcastDriver::new(
                channel,
                Arc::clone(display),
                ctx.clone(),
            )));
        }
    }

    for kind in [
        DriverKind::Accessibility,
        DriverKind::Notifications,
        DriverKind::UiTree,
    ] {
        drivers.push(Arc::new(HostStreamDriver::new(
            kind,
            adapters.host_streams,
            ctx.clone(),
        )));
    }

    if let Some(recorder) = &adapters.audio {
        drivers.push(Arc::new(AudioDriver::new(
            Arc::clone(recorder),
            recordings_dir,
            ctx.clone(),
        )));
    }

    drivers
}

use std::sync::{Arc, Mutex};

use crate::{
    error::Result,
    sensing::{
        driver::{guarded, lock, DriverContext, DriverCore, DriverKind, SensorDriver, Subscription},
        platform::{MotionKind, MotionSample, MotionSource},
    },
};

/// Hardware sensor that pushes samples while subscribed.
pub struct MotionDriver {
    core: Arc<DriverCore>,
    motion: MotionKind,
    source: Arc<dyn MotionSource>,
    subscription: Mutex<Option<Subscription>>,
}

impl MotionDriver {
    pub fn new(motion: MotionKind, source: Arc<dyn MotionSource>, ctx: DriverContext) -> Self {
        let kind = match motion {
            MotionKind::Accelerometer => DriverKind::Accelerometer,
            MotionKind::Gyroscope => DriverKind::Gyroscope,
            MotionKind::Light => DriverKind::Light,
            MotionKind::Proximity => DriverKind::Proximity,
            MotionKind::Orientation => DriverKind::Orientation,
        };
        Self {
            core: Arc::new(DriverCore::new(kind, ctx)),
            motion,
            source,
            subscription: Mutex::new(None),
        }
    }
}

fn format_sample(sample: &MotionSample) -> String {
    sample
        .values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl SensorDriver for MotionDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        self.source.has_sensor(self.motion)
    }

    fn can_periodic_sample(&self) -> bool {
        true
    }

    fn start(&self) -> Result<()> {
        if !self.core.begin() {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let on_sample = Box::new(move |sample: MotionSample| {
            guarded(core.name(), || {
                if core.is_running() {
                    core.emit(format_sample(&sample));
                }
            })
        });

        match self.source.subscribe(self.motion, on_sample) {
            Ok(subscription) => {
                *lock(&self.subscription) = Some(subscription);
                Ok(())
            }
            Err(err) => {
                self.core.finish();
                Err(err)
            }
        }
    }

    fn stop(&self) {
        self.core.finish();
        lock(&self.subscription).take();
    }
}

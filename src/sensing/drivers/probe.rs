use std::sync::Arc;

use log::debug;

use crate::{
    error::Result,
    sensing::{
        driver::{DriverContext, DriverCore, DriverKind, SensorDriver},
        platform::{DeviceProbe, ProbeKind},
    },
};

/// Reads one value per activation and stays "running" until stopped.
pub struct ProbeDriver {
    core: DriverCore,
    probe: ProbeKind,
    source: Arc<dyn DeviceProbe>,
}

impl ProbeDriver {
    pub fn new(probe: ProbeKind, source: Arc<dyn DeviceProbe>, ctx: DriverContext) -> Self {
        let kind = match probe {
            ProbeKind::Charging => DriverKind::Charging,
            ProbeKind::AirplaneMode => DriverKind::AirplaneMode,
            ProbeKind::RingtoneVolume => DriverKind::RingtoneVolume,
            ProbeKind::ConnectedWifi => DriverKind::ConnectedWifi,
        };
        Self {
            core: DriverCore::new(kind, ctx),
            probe,
            source,
        }
    }
}

impl SensorDriver for ProbeDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        self.source.supports(self.probe)
    }

    fn can_periodic_sample(&self) -> bool {
        true
    }

    fn start(&self) -> Result<()> {
        if !self.core.begin() {
            return Ok(());
        }

        let value = match self.source.read(self.probe) {
            Ok(value) => value,
            Err(err) => {
                self.core.finish();
                return Err(err);
            }
        };

        let payload = match self.probe {
            ProbeKind::ConnectedWifi => self.core.pseudonymize(&value),
            _ => value,
        };
        debug!("{} probed", self.core.name());
        self.core.emit(payload);
        Ok(())
    }

    fn stop(&self) {
        self.core.finish();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{error::SensingError, hashing::salted_hash, sensing::testing};

    #[derive(Default)]
    struct FakeProbe {
        reads: AtomicUsize,
    }

    impl DeviceProbe for FakeProbe {
        fn supports(&self, probe: ProbeKind) -> bool {
            probe != ProbeKind::RingtoneVolume
        }

        fn read(&self, probe: ProbeKind) -> Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            match probe {
                ProbeKind::Charging => Ok("true".into()),
                ProbeKind::ConnectedWifi => Ok("HomeNetwork".into()),
                ProbeKind::AirplaneMode => Err(SensingError::Permission("settings".into())),
                ProbeKind::RingtoneVolume => Ok("3".into()),
            }
        }
    }

    #[test]
    fn one_reading_per_activation() {
        let (ctx, sink, _clock) = testing::context(42);
        let source = Arc::new(FakeProbe::default());
        let driver = ProbeDriver::new(ProbeKind::Charging, source.clone(), ctx);

        driver.start().unwrap();
        driver.start().unwrap();
        assert_eq!(source.reads.load(Ordering::SeqCst), 1);
        driver.stop();
        driver.start().unwrap();

        assert_eq!(sink.payloads(), vec!["true".to_string(), "true".to_string()]);
    }

    #[test]
    fn ssid_is_hashed() {
        let (ctx, sink, _clock) = testing::context(0);
        let driver = ProbeDriver::new(ProbeKind::ConnectedWifi, Arc::new(FakeProbe::default()), ctx);

        driver.start().unwrap();
        let payloads = sink.payloads();
        assert_eq!(payloads, vec![salted_hash("HomeNetwork", "test-salt")]);
        assert!(!payloads[0].contains("Home"));
    }

    #[test]
    fn denied_read_is_reported_and_idle() {
        let (ctx, sink, _clock) = testing::context(0);
        let driver = ProbeDriver::new(ProbeKind::AirplaneMode, Arc::new(FakeProbe::default()), ctx);

        let err = driver.start().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Permission);
        assert!(!driver.is_running());
        assert!(sink.readings().is_empty());
    }
}

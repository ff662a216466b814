use std::sync::atomic::{AtomicBool, Ordering};

use crate::{
    error::Result,
    sensing::driver::{DriverContext, DriverCore, DriverKind, SensorDriver},
};

/// Driver fed by a host service (accessibility events, notifications, UI tree
/// snapshots). The host pushes events in; they are recorded only while running.
pub struct HostStreamDriver {
    core: DriverCore,
    available: AtomicBool,
}

impl HostStreamDriver {
    pub fn new(kind: DriverKind, available: bool, ctx: DriverContext) -> Self {
        Self {
            core: DriverCore::new(kind, ctx),
            available: AtomicBool::new(available),
        }
    }
}

impl SensorDriver for HostStreamDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn can_periodic_sample(&self) -> bool {
        false
    }

    fn can_continuous_sample(&self) -> bool {
        true
    }

    fn start(&self) -> Result<()> {
        self.core.begin();
        Ok(())
    }

    fn stop(&self) {
        self.core.finish();
    }

    /// Flipped when the host's listener service is bound or revoked. A revoked
    /// listener delivers nothing more, so the driver stops with it.
    fn set_available(&self, available: bool) -> bool {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.core.finish();
        }
        true
    }

    fn push_event(&self, payload: &str) -> bool {
        if !self.core.is_running() {
            return false;
        }
        self.core.emit(payload);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::testing;

    #[test]
    fn events_only_recorded_while_running() {
        let (ctx, sink, clock) = testing::context(100);
        let driver = HostStreamDriver::new(DriverKind::Notifications, false, ctx);
        assert!(!driver.is_available());
        assert!(driver.set_available(true));
        assert!(driver.is_available());

        assert!(!driver.push_event("before"));
        driver.start().unwrap();
        assert!(driver.push_event("com.example.chat"));
        clock.advance(5);
        assert!(driver.push_event("com.example.mail"));
        driver.stop();
        assert!(!driver.push_event("after"));

        let readings = sink.readings();
        assert_eq!(sink.payloads(), vec!["com.example.chat", "com.example.mail"]);
        assert_eq!(readings[1].timestamp, 105);
        assert!(driver.descriptor().can_continuous_sample);
    }

    #[test]
    fn revoked_listener_stops_the_driver() {
        let (ctx, sink, _clock) = testing::context(0);
        let driver = HostStreamDriver::new(DriverKind::Accessibility, true, ctx);
        driver.start().unwrap();
        assert!(driver.push_event("button:ok"));

        assert!(driver.set_available(false));
        assert!(!driver.is_running());
        assert!(!driver.push_event("button:cancel"));
        assert_eq!(sink.payloads(), vec!["button:ok"]);
    }
}

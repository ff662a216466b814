use std::sync::{Arc, Mutex};

use crate::{
    error::Result,
    sensing::{
        driver::{guarded, lock, DriverContext, DriverCore, DriverKind, SensorDriver, Subscription},
        platform::BluetoothScanner,
    },
};

/// Runs a discovery session while started; every device found is recorded by its
/// hashed MAC address.
pub struct BluetoothDriver {
    core: Arc<DriverCore>,
    scanner: Arc<dyn BluetoothScanner>,
    discovery: Mutex<Option<Subscription>>,
}

impl BluetoothDriver {
    pub fn new(scanner: Arc<dyn BluetoothScanner>, ctx: DriverContext) -> Self {
        Self {
            core: Arc::new(DriverCore::new(DriverKind::Bluetooth, ctx)),
            scanner,
            discovery: Mutex::new(None),
        }
    }
}

impl SensorDriver for BluetoothDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        self.scanner.is_available()
    }

    fn can_periodic_sample(&self) -> bool {
        true
    }

    fn start(&self) -> Result<()> {
        if !self.core.begin() {
            return Ok(());
        }

        let core = Arc::clone(&self.core);
        let on_found = Box::new(move |address: String| {
            guarded(core.name(), || {
                if core.is_running() {
                    core.emit(core.pseudonymize(&address));
                }
            })
        });

        match self.scanner.start_discovery(on_found) {
            Ok(session) => {
                *lock(&self.discovery) = Some(session);
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
        lock(&self.discovery).take();
    }
}

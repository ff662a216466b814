use std::sync::Arc;

use anyhow::{bail, Result};
use log::info;

use crate::db::Database;

use super::driver::{DriverDescriptor, DriverKind, SensorDriver};

/// The process's driver set. Built once at startup and read without locking after
/// that; each driver guards its own state.
#[derive(Clone)]
pub struct DriverRegistry {
    drivers: Arc<Vec<Arc<dyn SensorDriver>>>,
    settings: Option<Database>,
}

impl DriverRegistry {
    /// Registry without persisted settings; every driver starts enabled.
    pub fn new(drivers: Vec<Arc<dyn SensorDriver>>) -> Self {
        Self {
            drivers: Arc::new(drivers),
            settings: None,
        }
    }

    /// Seeds a settings row for each new driver and applies the stored enabled flags.
    pub async fn load(db: Database, drivers: Vec<Arc<dyn SensorDriver>>) -> Result<Self> {
        let names = drivers.iter().map(|d| d.name().to_string()).collect();
        let settings = db.ensure_driver_settings(names).await?;

        for setting in settings {
            if let Some(driver) = drivers.iter().find(|d| d.name() == setting.name) {
                driver.set_enabled(setting.enabled);
            }
        }

        info!("driver registry loaded with {} drivers", drivers.len());
        Ok(Self {
            drivers: Arc::new(drivers),
            settings: Some(db),
        })
    }

    pub fn list(&self) -> &[Arc<dyn SensorDriver>] {
        &self.drivers
    }

    pub fn by_kind(&self, kind: DriverKind) -> Option<Arc<dyn SensorDriver>> {
        self.drivers.iter().find(|d| d.kind() == kind).cloned()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn SensorDriver>> {
        self.drivers.iter().find(|d| d.name() == name).cloned()
    }

    pub fn descriptors(&self) -> Vec<DriverDescriptor> {
        self.drivers.iter().map(|d| d.descriptor()).collect()
    }

    /// Flips a driver's user toggle and persists it. Takes effect at the driver's next
    /// start; a running driver is left alone.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let Some(driver) = self.by_name(name) else {
            bail!("unknown driver '{name}'");
        };

        if let Some(db) = &self.settings {
            db.set_driver_enabled(name, enabled).await?;
        }
        driver.set_enabled(enabled);
        Ok(())
    }
}

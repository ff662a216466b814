use serde::{Deserialize, Serialize};

/// Persisted user toggle for one driver, keyed by its stable name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSetting {
    pub name: String,
    pub enabled: bool,
}

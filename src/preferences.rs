use std::{
    fs,
    path::PathBuf,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use crate::hashing::generate_salt;

pub const KEY_SAMPLING_RUNNING: &str = "log_everything_running";
pub const KEY_STUDY_PAUSED: &str = "study_paused";
pub const KEY_STUDY_PAUSED_UNTIL: &str = "study_paused_until";
pub const KEY_IN_INTERACTION: &str = "in_interaction";
pub const KEY_SENSITIVE_DATA_SALT: &str = "sensitive_data_salt";

/// Tiny persistent key/value store provided by the host.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;
    fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// JSON object on disk, rewritten on every `set`.
pub struct JsonPreferences {
    path: Option<PathBuf>,
    data: RwLock<Map<String, Value>>,
}

impl JsonPreferences {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read preferences from {}", path.display()))?;
            // An empty map here would mint a new salt.
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse preferences at {}", path.display()))?
        } else {
            Map::new()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: RwLock::new(Map::new()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Map<String, Value>> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Map<String, Value>> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let serialized = serde_json::to_string_pretty(data)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serialized)
            .with_context(|| format!("Failed to write preferences to {}", tmp.display()))?;
        fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace preferences at {}", path.display()))
    }
}

impl PreferenceStore for JsonPreferences {
    fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut guard = self.write();
        guard.insert(key.to_string(), value);
        self.persist(&guard)
    }
}

/// Typed view over the handful of flags the core persists.
///
/// The running bit is advisory: it only exists so a restarted process knows to
/// reattach. The live scheduler state is authoritative.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    fn bool_value(&self, key: &str) -> bool {
        self.store
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn sampling_running(&self) -> bool {
        self.bool_value(KEY_SAMPLING_RUNNING)
    }

    pub fn set_sampling_running(&self, running: bool) -> Result<()> {
        self.store.set(KEY_SAMPLING_RUNNING, Value::Bool(running))
    }

    pub fn study_paused(&self) -> bool {
        self.bool_value(KEY_STUDY_PAUSED)
    }

    /// `-1` when no end was recorded.
    pub fn study_paused_until(&self) -> i64 {
        self.store
            .get(KEY_STUDY_PAUSED_UNTIL)
            .and_then(|v| v.as_i64())
            .unwrap_or(-1)
    }

    pub fn set_study_paused(&self, paused: bool, until_ms: Option<i64>) -> Result<()> {
        self.store.set(KEY_STUDY_PAUSED, Value::Bool(paused))?;
        self.store
            .set(KEY_STUDY_PAUSED_UNTIL, Value::from(until_ms.unwrap_or(-1)))
    }

    pub fn in_interaction(&self) -> bool {
        self.bool_value(KEY_IN_INTERACTION)
    }

    pub fn set_in_interaction(&self, value: bool) -> Result<()> {
        self.store.set(KEY_IN_INTERACTION, Value::Bool(value))
    }

    /// Returns the stored salt, generating and persisting one on first use.
    pub fn sensitive_data_salt(&self) -> Result<String> {
        if let Some(salt) = self
            .store
            .get(KEY_SENSITIVE_DATA_SALT)
            .and_then(|v| v.as_str().map(str::to_owned))
            .filter(|s| !s.is_empty())
        {
            return Ok(salt);
        }

        let salt = generate_salt();
        self.store
            .set(KEY_SENSITIVE_DATA_SALT, Value::String(salt.clone()))?;
        Ok(salt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = Preferences::new(Arc::new(JsonPreferences::new(path.clone()).unwrap()));
        prefs.set_sampling_running(true).unwrap();
        prefs.set_study_paused(true, Some(1_234)).unwrap();
        let salt = prefs.sensitive_data_salt().unwrap();

        let reloaded = Preferences::new(Arc::new(JsonPreferences::new(path).unwrap()));
        assert!(reloaded.sampling_running());
        assert!(reloaded.study_paused());
        assert_eq!(reloaded.study_paused_until(), 1_234);
        assert_eq!(reloaded.sensitive_data_salt().unwrap(), salt);
    }

    #[test]
    fn unreadable_file_is_an_error_and_left_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let prefs = Preferences::new(Arc::new(JsonPreferences::new(path.clone()).unwrap()));
        prefs.set_sampling_running(true).unwrap();
        prefs.sensitive_data_salt().unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let truncated = &contents[..contents.len() / 2];
        fs::write(&path, truncated).unwrap();

        let err = JsonPreferences::new(path.clone()).err().unwrap();
        assert!(format!("{err:#}").contains("Failed to parse preferences"));
        assert_eq!(fs::read_to_string(&path).unwrap(), truncated);
    }

    #[test]
    fn defaults_when_unset() {
        let prefs = Preferences::new(Arc::new(JsonPreferences::in_memory()));
        assert!(!prefs.sampling_running());
        assert!(!prefs.study_paused());
        assert_eq!(prefs.study_paused_until(), -1);
        assert!(!prefs.in_interaction());
    }
}

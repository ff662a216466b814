//! Reading data model.
//!
//! A reading is one timestamped record produced by a driver. Its payload is opaque
//! to the store and the uploader; only the producing driver knows how to read it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reading as persisted in the `readings` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Assigned on insert, strictly increasing.
    pub id: i64,
    pub local_id: String,
    /// Milliseconds since the Unix epoch (UTC).
    pub timestamp: i64,
    pub sensor_name: String,
    pub payload: String,
    pub has_file: bool,
    pub file_path: Option<String>,
    pub file_mime: Option<String>,
    pub synced: bool,
}

/// A reading that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReading {
    pub local_id: String,
    pub timestamp: i64,
    pub sensor_name: String,
    pub payload: String,
    pub file_path: Option<String>,
    pub file_mime: Option<String>,
}

impl NewReading {
    pub fn new(
        timestamp: i64,
        sensor_name: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            local_id: Uuid::new_v4().to_string(),
            timestamp,
            sensor_name: sensor_name.into(),
            payload: payload.into(),
            file_path: None,
            file_mime: None,
        }
    }

    /// Attaches a local artifact that the uploader sends after the batch is accepted.
    pub fn with_file(mut self, path: impl Into<String>, mime: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self.file_mime = Some(mime.into());
        self
    }

    pub fn has_file(&self) -> bool {
        self.file_path.as_deref().is_some_and(|p| !p.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_unique() {
        let a = NewReading::new(1, "Light", "12.5");
        let b = NewReading::new(1, "Light", "12.5");
        assert_ne!(a.local_id, b.local_id);
        assert_eq!(a.local_id.len(), 36);
    }

    #[test]
    fn empty_file_path_is_not_a_file() {
        let reading = NewReading::new(1, "Audio Sample", "clip").with_file("", "audio/aac");
        assert!(!reading.has_file());

        let reading = NewReading::new(1, "Audio Sample", "clip").with_file("/tmp/a", "audio/aac");
        assert!(reading.has_file());
    }
}

use std::{
    fs,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use log::{info, warn};
use uuid::Uuid;

use crate::{
    error::Result,
    sensing::{
        driver::{lock, DriverContext, DriverCore, DriverKind, SensorDriver},
        platform::{AudioRecorder, Recording},
    },
};

struct ActiveRecording {
    recording: Box<dyn Recording>,
    path: PathBuf,
    file_name: String,
    started_at: i64,
}

/// Records one clip per activation. The reading is written when the clip is closed,
/// stamped with the time recording began and pointing at the file.
pub struct AudioDriver {
    core: DriverCore,
    recorder: Arc<dyn AudioRecorder>,
    recordings_dir: PathBuf,
    active: Mutex<Option<ActiveRecording>>,
}

impl AudioDriver {
    pub fn new(recorder: Arc<dyn AudioRecorder>, recordings_dir: PathBuf, ctx: DriverContext) -> Self {
        Self {
            core: DriverCore::new(DriverKind::AudioSample, ctx),
            recorder,
            recordings_dir,
            active: Mutex::new(None),
        }
    }

    fn open(&self) -> Result<ActiveRecording> {
        fs::create_dir_all(&self.recordings_dir)?;

        let started_at = self.core.now_ms();
        let file_name = format!(
            "{started_at}-{}.{}",
            Uuid::new_v4().simple(),
            self.recorder.file_extension()
        );
        let path = self.recordings_dir.join(&file_name);
        let recording = self.recorder.open(&path)?;

        Ok(ActiveRecording {
            recording,
            path,
            file_name,
            started_at,
        })
    }
}

impl SensorDriver for AudioDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        self.recorder.is_available()
    }

    fn can_periodic_sample(&self) -> bool {
        true
    }

    fn start(&self) -> Result<()> {
        if !self.core.begin() {
            return Ok(());
        }

        match self.open() {
            Ok(active) => {
                info!("recording audio to {}", active.path.display());
                *lock(&self.active) = Some(active);
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
        let Some(active) = lock(&self.active).take() else {
            return;
        };

        if let Err(err) = active.recording.finish() {
            warn!("failed to close recording {}: {err}", active.path.display());
            return;
        }

        let path = active.path.to_string_lossy().into_owned();
        self.core.emit_file(
            active.started_at,
            active.file_name,
            &path,
            self.recorder.mime_type(),
        );
    }
}

#![allow(dead_code)]

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use sensing_core::{
    db::Database,
    error::{Result, SensingError},
    sensing::{DriverContext, DriverCore, DriverKind, SensorDriver},
    upload::{BatchAck, BatchItem, ReadingBackend},
};
use tempfile::TempDir;

pub fn database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("readings.sqlite3")).unwrap();
    (dir, db)
}

pub fn ack(id: i64, data: &str) -> BatchAck {
    BatchAck {
        id,
        data: data.to_string(),
        local_id: None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub backend_id: i64,
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Records every request. Echoes the payloads back with fresh ids unless acks were
/// scripted for the next batch; answers 503 while `failing` is set.
#[derive(Default)]
pub struct FakeBackend {
    pub failing: AtomicBool,
    scripted: Mutex<Option<Vec<BatchAck>>>,
    batches: Mutex<Vec<Vec<BatchItem>>>,
    files: Mutex<Vec<FileUpload>>,
    tokens: Mutex<Vec<String>>,
    next_id: AtomicI64,
}

impl FakeBackend {
    pub fn script_acks(&self, acks: Vec<BatchAck>) {
        *self.scripted.lock().unwrap() = Some(acks);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<BatchItem>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn files(&self) -> Vec<FileUpload> {
        self.files.lock().unwrap().clone()
    }

    pub fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReadingBackend for FakeBackend {
    async fn post_batch(&self, token: &str, items: &[BatchItem]) -> Result<Vec<BatchAck>> {
        self.tokens.lock().unwrap().push(token.to_string());
        self.batches.lock().unwrap().push(items.to_vec());
        if self.failing.load(Ordering::SeqCst) {
            return Err(SensingError::Transient(
                "reading batch rejected with 503 Service Unavailable".into(),
            ));
        }

        if let Some(acks) = self.scripted.lock().unwrap().take() {
            return Ok(acks);
        }
        Ok(items
            .iter()
            .map(|item| BatchAck {
                id: 1_000 + self.next_id.fetch_add(1, Ordering::SeqCst),
                data: item.data.clone(),
                local_id: Some(item.local_id.clone()),
            })
            .collect())
    }

    async fn post_file(
        &self,
        _token: &str,
        backend_id: i64,
        path: &Path,
        mime: &str,
    ) -> Result<()> {
        let bytes = tokio::fs::read(path).await?;
        self.files.lock().unwrap().push(FileUpload {
            backend_id,
            bytes,
            mime: mime.to_string(),
        });
        Ok(())
    }
}

/// Driver that only counts its starts and stops.
pub struct CountingDriver {
    core: DriverCore,
    periodic: bool,
    continuous: bool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl CountingDriver {
    pub fn new(kind: DriverKind, ctx: DriverContext, periodic: bool, continuous: bool) -> Self {
        Self {
            core: DriverCore::new(kind, ctx),
            periodic,
            continuous,
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }
}

impl SensorDriver for CountingDriver {
    fn core(&self) -> &DriverCore {
        &self.core
    }

    fn is_available(&self) -> bool {
        true
    }

    fn can_periodic_sample(&self) -> bool {
        self.periodic
    }

    fn can_continuous_sample(&self) -> bool {
        self.continuous
    }

    fn start(&self) -> Result<()> {
        if self.core.begin() {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn stop(&self) {
        if self.core.finish() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Polls `check` every millisecond of tokio time until it holds or `limit` passes.
pub async fn eventually<F>(limit: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    check()
}

use std::{collections::HashMap, path::Path, sync::Arc};

use futures::future::join_all;
use tokio::sync::Mutex;

use crate::{
    clock::Clock,
    config::UploadConfig,
    db::{Database, Reading},
    error::{Result, SensingError},
};

use super::backend::{AuthTokenSource, BatchAck, BatchItem, ReadingBackend};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const DEFAULT_FILE_MIME: &str = "application/octet-stream";

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    pub batches: usize,
    pub readings: usize,
    pub files_uploaded: usize,
    pub files_failed: usize,
}

impl UploadReport {
    pub fn is_empty(&self) -> bool {
        self.batches == 0
    }
}

/// Maps local reading ids to backend ids.
///
/// An ack that echoes `localId` is matched on it. Otherwise the ack's `data` is used,
/// but only when exactly one reading in the batch carries that payload.
pub fn correlate(batch: &[Reading], acks: &[BatchAck]) -> HashMap<i64, i64> {
    let by_local_id: HashMap<&str, i64> = batch
        .iter()
        .map(|r| (r.local_id.as_str(), r.id))
        .collect();

    let mut by_payload: HashMap<&str, Option<i64>> = HashMap::new();
    for reading in batch {
        by_payload
            .entry(reading.payload.as_str())
            .and_modify(|slot| *slot = None)
            .or_insert(Some(reading.id));
    }

    let mut matched = HashMap::new();
    for ack in acks {
        let local = ack
            .local_id
            .as_deref()
            .and_then(|local_id| by_local_id.get(local_id).copied());
        let reading_id = local.or_else(|| by_payload.get(ack.data.as_str()).copied().flatten());

        match reading_id {
            Some(id) => {
                matched.entry(id).or_insert(ack.id);
            }
            None => {
                log_debug!("ack {} does not match a reading in the batch", ack.id);
            }
        }
    }
    matched
}

/// One drain of the reading store. Only one pass runs at a time; a call made while
/// another pass is in flight returns an empty report.
pub struct BatchUploader {
    db: Database,
    backend: Arc<dyn ReadingBackend>,
    auth: Arc<dyn AuthTokenSource>,
    clock: Arc<dyn Clock>,
    config: UploadConfig,
    in_flight: Mutex<()>,
}

impl BatchUploader {
    pub fn new(
        db: Database,
        backend: Arc<dyn ReadingBackend>,
        auth: Arc<dyn AuthTokenSource>,
        clock: Arc<dyn Clock>,
        config: UploadConfig,
    ) -> Self {
        Self {
            db,
            backend,
            auth,
            clock,
            config,
            in_flight: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Unsynced readings older than `stale_after_ms`.
    pub async fn stale_count(&self) -> Result<u64> {
        let threshold = self.clock.now_ms() - self.config.stale_after_ms;
        self.db
            .unsynced_count_before(threshold)
            .await
            .map_err(SensingError::store)
    }

    /// Drains eligible readings batch by batch until none are left. A failed request
    /// ends the pass; readings not yet acknowledged stay unsynced for the next run.
    pub async fn run(&self) -> Result<UploadReport> {
        let Ok(_guard) = self.in_flight.try_lock() else {
            log_debug!("upload pass already in flight");
            return Ok(UploadReport::default());
        };

        let mut report = UploadReport::default();
        loop {
            let cutoff = self.clock.now_ms() - self.config.cutoff_lag_ms;
            let batch = self
                .db
                .next_unsynced_before(cutoff, self.config.batch_size.max(1))
                .await
                .map_err(SensingError::store)?;
            if batch.is_empty() {
                break;
            }

            let token = self
                .auth
                .current()
                .ok_or_else(|| SensingError::Missing("no auth token available".into()))?;

            let items: Vec<BatchItem> = batch.iter().map(BatchItem::from).collect();
            let acks = self.backend.post_batch(&token, &items).await?;

            let ids: Vec<i64> = batch.iter().map(|r| r.id).collect();
            self.db
                .mark_synced(&ids)
                .await
                .map_err(SensingError::store)?;
            report.batches += 1;
            report.readings += batch.len();

            let backend_ids = correlate(&batch, &acks);
            self.upload_files(&token, &batch, &backend_ids, &mut report)
                .await;
        }

        if !report.is_empty() {
            log_info!(
                "upload pass done: {} readings in {} batches, {} files ({} failed)",
                report.readings,
                report.batches,
                report.files_uploaded,
                report.files_failed
            );
        }
        Ok(report)
    }

    async fn upload_files(
        &self,
        token: &str,
        batch: &[Reading],
        backend_ids: &HashMap<i64, i64>,
        report: &mut UploadReport,
    ) {
        let uploads = batch
            .iter()
            .filter(|r| r.has_file)
            .map(|reading| async move {
                let Some(path) = reading.file_path.as_deref() else {
                    return false;
                };
                let Some(backend_id) = backend_ids.get(&reading.id).copied() else {
                    log_warn!("no backend id for file reading {}", reading.local_id);
                    return false;
                };
                let mime = reading.file_mime.as_deref().unwrap_or(DEFAULT_FILE_MIME);

                match self
                    .backend
                    .post_file(token, backend_id, Path::new(path), mime)
                    .await
                {
                    Ok(()) => true,
                    Err(err) => {
                        log_warn!("file upload for reading {} failed: {err}", reading.local_id);
                        false
                    }
                }
            });

        for uploaded in join_all(uploads).await {
            if uploaded {
                report.files_uploaded += 1;
            } else {
                report.files_failed += 1;
            }
        }
    }
}

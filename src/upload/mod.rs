//! Batch uploader: drains the reading store to the backend, then chains the file
//! uploads for readings that carry a blob.

mod backend;
mod uploader;
mod worker;

pub use backend::{AuthTokenSource, BatchAck, BatchItem, HttpBackend, ReadingBackend, StaticToken};
pub use uploader::{correlate, BatchUploader, UploadReport};
pub use worker::UploadWorker;

//! Document upload queue.
//!
//! Files are queued first, then sent either in one multipart request
//! (`/api/documents/upload-multiple`) or one request per file
//! (`/api/documents/upload`). Progress is counted as reqwest pulls each
//! file's body stream, so the reported byte counts follow the socket rather
//! than the disk.
//!
//! After a successful upload an optional process request asks the backend
//! to chunk and index the new documents.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::{decode_json, ApiClient};
use crate::documents::{normalize_tags, process_documents, ProcessRequest};
use crate::error::{ApiError, ApiResult};
use crate::models::{Document, Listing};
use crate::progress::{UploadProgressEvent, UploadProgressReporter};

const CHUNK_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct QueuedFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// Files waiting to be uploaded. Two entries with the same file name and
/// size are treated as the same file.
#[derive(Debug, Default)]
pub struct UploadQueue {
    entries: Vec<QueuedFile>,
}

impl UploadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file from disk. Fails if it cannot be read or is already queued.
    pub fn add_path(&mut self, path: &Path) -> ApiResult<()> {
        let meta = std::fs::metadata(path)
            .map_err(|e| ApiError::Storage(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                ApiError::Validation(format!("Not a file path: {}", path.display()))
            })?;
        self.add(QueuedFile {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
        })
    }

    pub fn add(&mut self, file: QueuedFile) -> ApiResult<()> {
        if self.contains(&file.name, file.size) {
            return Err(ApiError::Validation(format!(
                "{} is already in the upload queue",
                file.name
            )));
        }
        debug!(name = %file.name, size = file.size, "queued file");
        self.entries.push(file);
        Ok(())
    }

    pub fn contains(&self, name: &str, size: u64) -> bool {
        self.entries.iter().any(|e| e.name == name && e.size == size)
    }

    pub fn remove(&mut self, name: &str) -> Option<QueuedFile> {
        let pos = self.entries.iter().position(|e| e.name == name)?;
        Some(self.entries.remove(pos))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[QueuedFile] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    pub tags: Vec<String>,
    pub folder: Option<String>,
    /// Send all files in one request when more than one is queued.
    pub batch: bool,
    /// Chunking settings for the process step. `None` skips processing.
    pub process: Option<ProcessRequest>,
}

#[derive(Debug, Default)]
pub struct UploadSummary {
    pub uploaded: Vec<Document>,
    /// File name and error message for each file that was not uploaded.
    pub failed: Vec<(String, String)>,
    pub processed: Option<serde_json::Value>,
}

pub struct Uploader {
    client: ApiClient,
    reporter: Arc<dyn UploadProgressReporter>,
}

impl Uploader {
    pub fn new(client: ApiClient, reporter: Arc<dyn UploadProgressReporter>) -> Self {
        Self { client, reporter }
    }

    /// Upload every queued file, then trigger processing if requested.
    pub async fn upload(
        &self,
        queue: &UploadQueue,
        options: &UploadOptions,
    ) -> ApiResult<UploadSummary> {
        if queue.is_empty() {
            return Err(ApiError::Validation("No files queued for upload".into()));
        }
        if let Some(process) = &options.process {
            process.validate_chunking()?;
        }

        let mut files = Vec::with_capacity(queue.len());
        for entry in queue.entries() {
            let data = tokio::fs::read(&entry.path)
                .await
                .map_err(|e| ApiError::Storage(format!("{}: {}", entry.path.display(), e)))?;
            files.push((entry.name.clone(), Bytes::from(data)));
        }
        let overall_total: u64 = files.iter().map(|(_, d)| d.len() as u64).sum();

        let mut summary = if options.batch && files.len() > 1 {
            self.upload_batch(&files, options, overall_total).await?
        } else {
            self.upload_sequential(&files, options, overall_total).await?
        };

        if let Some(template) = &options.process {
            if !summary.uploaded.is_empty() {
                let request = ProcessRequest {
                    document_ids: summary.uploaded.iter().map(|d| d.id.clone()).collect(),
                    ..template.clone()
                };
                self.reporter.report(UploadProgressEvent::Processing {
                    documents: request.document_ids.len(),
                    strategy: request.chunking_strategy.clone(),
                });
                summary.processed = Some(process_documents(&self.client, &request).await?);
            }
        }
        Ok(summary)
    }

    async fn upload_batch(
        &self,
        files: &[(String, Bytes)],
        options: &UploadOptions,
        overall_total: u64,
    ) -> ApiResult<UploadSummary> {
        info!(files = files.len(), bytes = overall_total, "uploading batch");
        let path = "/api/documents/upload-multiple";
        let result = self
            .client
            .send(path, |http, url| {
                let tracker = RequestProgress::new(self.reporter.clone(), 0, overall_total);
                let mut form = Form::new();
                for (name, data) in files {
                    form = form.part("files", counted_part(name, data.clone(), tracker.clone()));
                }
                http.post(url).multipart(with_fields(form, options))
            })
            .await;

        let resp = match result {
            Ok(resp) => resp,
            Err(e) => {
                for (name, _) in files {
                    self.reporter.report(UploadProgressEvent::Failed {
                        file: name.clone(),
                        error: e.to_string(),
                    });
                }
                return Err(e);
            }
        };

        let listing: Listing<Document> = decode_json(resp).await?;
        let uploaded = listing.into_items("documents")?;
        for doc in &uploaded {
            self.reporter.report(UploadProgressEvent::Uploaded {
                file: doc.filename.clone(),
                document_id: doc.id.clone(),
            });
        }
        info!(uploaded = uploaded.len(), "batch upload complete");
        Ok(UploadSummary {
            uploaded,
            ..UploadSummary::default()
        })
    }

    async fn upload_sequential(
        &self,
        files: &[(String, Bytes)],
        options: &UploadOptions,
        overall_total: u64,
    ) -> ApiResult<UploadSummary> {
        let path = "/api/documents/upload";
        let mut summary = UploadSummary::default();
        let mut completed = 0u64;

        for (name, data) in files {
            let result = self
                .client
                .send(path, |http, url| {
                    let tracker =
                        RequestProgress::new(self.reporter.clone(), completed, overall_total);
                    let form = Form::new().part("file", counted_part(name, data.clone(), tracker));
                    http.post(url).multipart(with_fields(form, options))
                })
                .await;
            completed += data.len() as u64;

            let doc = match result {
                Ok(resp) => decode_json::<Document>(resp).await,
                Err(e) => Err(e),
            };
            match doc {
                Ok(mut doc) => {
                    if doc.filename.is_empty() {
                        doc.filename = name.clone();
                    }
                    info!(file = %name, id = %doc.id, "uploaded");
                    self.reporter.report(UploadProgressEvent::Uploaded {
                        file: name.clone(),
                        document_id: doc.id.clone(),
                    });
                    summary.uploaded.push(doc);
                }
                // Without credentials every remaining file would fail the same way.
                Err(e @ ApiError::LoginRequired { .. }) => return Err(e),
                Err(e) => {
                    warn!(file = %name, error = %e, "upload failed");
                    self.reporter.report(UploadProgressEvent::Failed {
                        file: name.clone(),
                        error: e.to_string(),
                    });
                    summary.failed.push((name.clone(), e.to_string()));
                }
            }
        }
        Ok(summary)
    }
}

fn with_fields(mut form: Form, options: &UploadOptions) -> Form {
    let tags = normalize_tags(&options.tags);
    if !tags.is_empty() {
        form = form.text("tags", tags.join(","));
    }
    if let Some(folder) = options.folder.as_deref().map(str::trim) {
        if !folder.is_empty() {
            form = form.text("folder", folder.to_string());
        }
    }
    form
}

/// Byte accounting for one HTTP request. A retried request gets a fresh
/// tracker, so counts restart instead of doubling.
struct RequestProgress {
    reporter: Arc<dyn UploadProgressReporter>,
    /// Bytes of the queue already sent by earlier requests.
    base: u64,
    overall_total: u64,
    sent: AtomicU64,
}

impl RequestProgress {
    fn new(reporter: Arc<dyn UploadProgressReporter>, base: u64, overall_total: u64) -> Arc<Self> {
        Arc::new(Self {
            reporter,
            base,
            overall_total,
            sent: AtomicU64::new(0),
        })
    }

    fn advance(&self, file: &str, bytes: u64, file_sent: u64, file_total: u64) {
        let request_sent = self.sent.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.reporter.report(UploadProgressEvent::Sending {
            file: file.to_string(),
            sent: file_sent,
            total: file_total,
            overall_sent: (self.base + request_sent).min(self.overall_total),
            overall_total: self.overall_total,
        });
    }
}

fn counted_part(name: &str, data: Bytes, tracker: Arc<RequestProgress>) -> Part {
    let len = data.len() as u64;
    let body = reqwest::Body::wrap_stream(counted_stream(name.to_string(), data, tracker));
    Part::stream_with_length(body, len).file_name(name.to_string())
}

fn counted_stream(
    name: String,
    data: Bytes,
    tracker: Arc<RequestProgress>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let total = data.len() as u64;
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(CHUNK_BYTES)
        .map(|start| data.slice(start..(start + CHUNK_BYTES).min(data.len())))
        .collect();
    let mut sent = 0u64;
    futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        tracker.advance(&name, chunk.len() as u64, sent, total);
        Ok(chunk)
    })
}

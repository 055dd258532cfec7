//! Upload progress reporting.
//!
//! Reports observable progress while `ragchat docs upload` runs: bytes sent
//! per file and for the whole queue, plus the processing step. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum UploadProgressEvent {
    /// Bytes sent so far for one file and for the whole queue.
    Sending {
        file: String,
        sent: u64,
        total: u64,
        overall_sent: u64,
        overall_total: u64,
    },
    /// A file (or the batch containing it) was accepted by the server.
    Uploaded { file: String, document_id: String },
    /// A file failed; the rest of the queue continues in sequential mode.
    Failed { file: String, error: String },
    /// The process request was sent for this many documents.
    Processing { documents: usize, strategy: String },
}

/// Reports upload progress. Implementations write to stderr (human or JSON).
pub trait UploadProgressReporter: Send + Sync {
    fn report(&self, event: UploadProgressEvent);
}

/// Human-friendly progress on stderr: "upload report.pdf  45%  (1.2 MB / 2.6 MB total)".
pub struct StderrProgress;

impl UploadProgressReporter for StderrProgress {
    fn report(&self, event: UploadProgressEvent) {
        let line = match &event {
            UploadProgressEvent::Sending {
                file,
                sent,
                total,
                overall_sent,
                overall_total,
            } => format!(
                "upload {}  {:>3}%  ({} / {} total)\n",
                file,
                percent(*sent, *total),
                format_bytes(*overall_sent),
                format_bytes(*overall_total)
            ),
            UploadProgressEvent::Uploaded { file, document_id } => {
                format!("upload {}  done  (id {})\n", file, document_id)
            }
            UploadProgressEvent::Failed { file, error } => {
                format!("upload {}  FAILED  {}\n", file, error)
            }
            UploadProgressEvent::Processing {
                documents,
                strategy,
            } => format!(
                "process  {} document{}  strategy={}\n",
                documents,
                if *documents == 1 { "" } else { "s" },
                strategy
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl UploadProgressReporter for JsonProgress {
    fn report(&self, event: UploadProgressEvent) {
        let obj = match &event {
            UploadProgressEvent::Sending {
                file,
                sent,
                total,
                overall_sent,
                overall_total,
            } => serde_json::json!({
                "event": "progress",
                "file": file,
                "sent": sent,
                "total": total,
                "overall_sent": overall_sent,
                "overall_total": overall_total,
            }),
            UploadProgressEvent::Uploaded { file, document_id } => serde_json::json!({
                "event": "uploaded",
                "file": file,
                "document_id": document_id,
            }),
            UploadProgressEvent::Failed { file, error } => serde_json::json!({
                "event": "failed",
                "file": file,
                "error": error,
            }),
            UploadProgressEvent::Processing {
                documents,
                strategy,
            } => serde_json::json!({
                "event": "processing",
                "documents": documents,
                "strategy": strategy,
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl UploadProgressReporter for NoProgress {
    fn report(&self, _event: UploadProgressEvent) {}
}

pub fn percent(sent: u64, total: u64) -> u64 {
    if total == 0 {
        100
    } else {
        (sent.min(total) * 100) / total
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "off" | "none" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> Arc<dyn UploadProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

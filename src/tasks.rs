//! Background task monitoring.
//!
//! Tasks are run by the backend's scheduler; the client lists, inspects,
//! creates and cancels them, and [`TaskPoller`] refreshes the list on a
//! fixed interval until it is stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::client::{resource_path, ApiClient};
use crate::error::{ApiError, ApiResult};
use crate::models::{lenient_timestamp, Listing};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
    Waiting,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Some(TaskStatus::Pending),
            "scheduled" => Some(TaskStatus::Scheduled),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" | "canceled" => Some(TaskStatus::Cancelled),
            "waiting" => Some(TaskStatus::Waiting),
            _ => None,
        }
    }

    /// Completed, failed and cancelled tasks never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn badge(&self) -> Badge {
        match self {
            TaskStatus::Pending => Badge::new("pending", "33"),
            TaskStatus::Scheduled => Badge::new("scheduled", "36"),
            TaskStatus::Running => Badge::new("running", "34"),
            TaskStatus::Completed => Badge::new("completed", "32"),
            TaskStatus::Failed => Badge::new("failed", "31"),
            TaskStatus::Cancelled => Badge::new("cancelled", "90"),
            TaskStatus::Waiting => Badge::new("waiting", "35"),
            TaskStatus::Unknown => Badge::new("unknown", "37"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "0" => Some(Priority::Low),
            "normal" | "1" => Some(Priority::Normal),
            "high" | "2" => Some(Priority::High),
            "critical" | "3" => Some(Priority::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    pub fn badge(&self) -> Badge {
        match self {
            Priority::Low => Badge::new("low", "90"),
            Priority::Normal => Badge::new("normal", "37"),
            Priority::High => Badge::new("high", "33"),
            Priority::Critical => Badge::new("critical", "1;31"),
        }
    }
}

impl Serialize for Priority {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Int(i64),
            Name(String),
        }
        let parsed = match Repr::deserialize(deserializer)? {
            Repr::Int(n) => Priority::parse(&n.to_string()),
            Repr::Name(s) => Priority::parse(&s),
        };
        Ok(parsed.unwrap_or_default())
    }
}

/// A status or priority label with its ANSI colour code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub label: &'static str,
    pub ansi: &'static str,
}

impl Badge {
    const fn new(label: &'static str, ansi: &'static str) -> Self {
        Self { label, ansi }
    }

    pub fn paint(&self, color: bool) -> String {
        if color {
            format!("\x1b[{}m{}\x1b[0m", self.ansi, self.label)
        } else {
            self.label.to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "task_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub task_type: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl Task {
    /// Progress as a whole percentage, clamped to 0..=100.
    pub fn progress_percent(&self) -> u8 {
        match self.progress {
            Some(p) if p.is_finite() => p.clamp(0.0, 100.0).round() as u8,
            _ => 0,
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub by_status: BTreeMap<String, u64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// Body of `POST /api/v1/tasks`.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub name: String,
    pub task_type: String,
    pub params: serde_json::Value,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewTask {
    pub fn validate(&self) -> ApiResult<()> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("Task name is required".into()));
        }
        if self.task_type.trim().is_empty() {
            return Err(ApiError::Validation("Task type is required".into()));
        }
        if !self.params.is_object() {
            return Err(ApiError::Validation(
                "Task parameters must be a JSON object".into(),
            ));
        }
        Ok(())
    }
}

/// Parse task parameters typed by the user. Blank input is an empty object.
pub fn parse_params(input: &str) -> ApiResult<serde_json::Value> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value = serde_json::from_str(input).map_err(|e| {
        ApiError::Validation(format!("Invalid JSON in task parameters: {}", e))
    })?;
    if !value.is_object() {
        return Err(ApiError::Validation(
            "Task parameters must be a JSON object".into(),
        ));
    }
    Ok(value)
}

pub async fn list_tasks(client: &ApiClient, query: &TaskQuery) -> ApiResult<Vec<Task>> {
    let listing: Listing<Task> = client.get_json_query("/api/v1/tasks", query).await?;
    Ok(listing.into_items("tasks")?)
}

pub async fn get_task(client: &ApiClient, id: &str) -> ApiResult<Task> {
    client.get_json(&resource_path("/api/v1/tasks", &[id])?).await
}

pub async fn create_task(client: &ApiClient, task: &NewTask) -> ApiResult<Task> {
    task.validate()?;
    let created: Task = client.post_json("/api/v1/tasks", task).await?;
    info!(id = %created.id, task_type = %task.task_type, "task created");
    Ok(created)
}

/// Cancel a task. Tasks that already finished are rejected without a
/// cancel request being sent.
pub async fn cancel_task(client: &ApiClient, id: &str) -> ApiResult<serde_json::Value> {
    let task = get_task(client, id).await?;
    if task.status.is_terminal() {
        return Err(ApiError::Validation(format!(
            "Task {} is already {} and cannot be cancelled",
            id,
            task.status.badge().label
        )));
    }
    let result = client
        .post_json(&resource_path("/api/v1/tasks", &[id, "cancel"])?, &serde_json::json!({}))
        .await?;
    info!(id, "task cancelled");
    Ok(result)
}

pub async fn task_stats(client: &ApiClient) -> ApiResult<TaskStats> {
    client.get_json("/api/v1/tasks/stats").await
}

/// Repeatedly lists tasks on a fixed interval until stopped.
///
/// The first refresh happens immediately. After [`stop`](Self::stop)
/// returns, no further requests are issued.
pub struct TaskPoller {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TaskPoller {
    pub fn start<F>(client: ApiClient, query: TaskQuery, every: Duration, mut on_update: F) -> Self
    where
        F: FnMut(ApiResult<Vec<Task>>) + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        debug!("refreshing task list");
                        on_update(list_tasks(&client, &query).await);
                    }
                }
            }
            debug!("task poller stopped");
        });
        info!(every_secs = every.as_secs(), "task poller started");
        Self { stop_tx, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Signal the poller and wait for its loop to exit.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        let _ = self.handle.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_parses_loose_shapes() {
        let task: Task = serde_json::from_str(
            r#"{"task_id":42,"name":"reindex","task_type":"index","status":"exploding","priority":3,"progress":140.2}"#,
        )
        .unwrap();
        assert_eq!(task.id, "42");
        assert_eq!(task.status, TaskStatus::Unknown);
        assert_eq!(task.priority, Priority::Critical);
        assert_eq!(task.progress_percent(), 100);
        assert_eq!(task.retry_count, 0);

        let task: Task =
            serde_json::from_str(r#"{"id":"t1","status":"running","priority":"high"}"#).unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.progress_percent(), 0);
    }

    #[test]
    fn task_accepts_naive_timestamps() {
        let task: Task = serde_json::from_str(
            r#"{"id":"t1","status":"running","created_at":"2024-05-01T10:00:00.123456","started_at":null,"completed_at":"2024-05-01T10:05:00Z"}"#,
        )
        .unwrap();
        assert_eq!(
            task.created_at.map(|t| t.to_rfc3339()).as_deref(),
            Some("2024-05-01T10:00:00.123456+00:00")
        );
        assert_eq!(task.started_at, None);
        assert!(task.completed_at.is_some());

        let listing: Listing<Task> = serde_json::from_str(
            r#"{"tasks":[{"id":"a","created_at":"2024-05-01T10:00:00"},{"id":"b","created_at":"soon"}]}"#,
        )
        .unwrap();
        assert_eq!(listing.into_items("tasks").unwrap().len(), 2);
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Unknown.is_terminal());
    }

    #[test]
    fn badges_paint_with_ansi() {
        assert_eq!(TaskStatus::Failed.badge().paint(false), "failed");
        assert_eq!(TaskStatus::Completed.badge().paint(true), "\x1b[32mcompleted\x1b[0m");
        assert_eq!(Priority::Critical.badge().label, "critical");
    }

    #[test]
    fn query_serializes_lowercase_status() {
        let q = TaskQuery {
            status: Some(TaskStatus::Running),
            task_type: None,
            limit: Some(10),
        };
        let v = serde_json::to_value(&q).unwrap();
        assert_eq!(v, serde_json::json!({"status":"running","limit":10}));
    }

    #[test]
    fn params_must_be_object() {
        assert_eq!(parse_params("").unwrap(), serde_json::json!({}));
        assert!(parse_params("[1]").is_err());
        assert!(parse_params("{").unwrap_err().to_string().contains("Invalid JSON"));

        let task = NewTask {
            name: " ".into(),
            task_type: "index".into(),
            params: serde_json::json!({}),
            priority: Priority::Normal,
            scheduled_at: None,
        };
        assert!(task.validate().is_err());
    }
}

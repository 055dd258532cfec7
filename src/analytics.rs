//! Analytics reports (`/api/analytics/{report}`).

use serde::Serialize;

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Overview,
    Queries,
    Documents,
    Users,
    Performance,
}

impl Report {
    pub const ALL: [Report; 5] = [
        Report::Overview,
        Report::Queries,
        Report::Documents,
        Report::Users,
        Report::Performance,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Report::Overview => "overview",
            Report::Queries => "queries",
            Report::Documents => "documents",
            Report::Users => "users",
            Report::Performance => "performance",
        }
    }
}

#[derive(Serialize)]
struct Window {
    #[serde(skip_serializing_if = "Option::is_none")]
    days: Option<u32>,
}

/// Fetch a report, optionally limited to the last `days` days. The payload
/// shape differs per report and is returned as raw JSON.
pub async fn fetch_report(
    client: &ApiClient,
    report: Report,
    days: Option<u32>,
) -> ApiResult<serde_json::Value> {
    if days == Some(0) {
        return Err(ApiError::Validation("days must be at least 1".into()));
    }
    client
        .get_json_query(
            &format!("/api/analytics/{}", report.as_str()),
            &Window { days },
        )
        .await
}

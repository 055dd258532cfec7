//! Database schema introspection and query plans (`/api/schema/*`).
//!
//! Only read-only statements are sent for EXPLAIN; anything else is
//! rejected locally.

use serde::Serialize;

use crate::client::{resource_path, ApiClient};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize)]
pub struct ExplainRequest {
    pub query: String,
    pub analyze: bool,
}

impl ExplainRequest {
    pub fn new(query: &str, analyze: bool) -> ApiResult<Self> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::Validation("Query must not be empty".into()));
        }
        if !is_read_only(query) {
            return Err(ApiError::Validation(
                "Only SELECT and WITH statements can be explained".into(),
            ));
        }
        Ok(Self {
            query: query.to_string(),
            analyze,
        })
    }
}

fn is_read_only(query: &str) -> bool {
    let first = query
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or("");
    first.eq_ignore_ascii_case("select") || first.eq_ignore_ascii_case("with")
}

pub async fn list_tables(client: &ApiClient) -> ApiResult<serde_json::Value> {
    client.get_json("/api/schema/tables").await
}

pub async fn describe_table(client: &ApiClient, table: &str) -> ApiResult<serde_json::Value> {
    let table = table.trim();
    if table.is_empty() {
        return Err(ApiError::Validation("Table name is required".into()));
    }
    client
        .get_json(&resource_path("/api/schema/tables", &[table])?)
        .await
}

pub async fn explain(client: &ApiClient, request: &ExplainRequest) -> ApiResult<serde_json::Value> {
    client.post_json("/api/schema/explain", request).await
}

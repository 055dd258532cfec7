//! Document management: listing, filtering, tagging, folders, processing
//! and deletion.
//!
//! Uploads live in [`crate::upload`]; everything here is plain JSON.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{resource_path, ApiClient};
use crate::config::{UploadConfig, CHUNKING_STRATEGIES};
use crate::error::{ApiError, ApiResult};
use crate::models::{Document, Listing};

/// Body of `POST /api/documents/process`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRequest {
    pub document_ids: Vec<String>,
    pub chunking_strategy: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl ProcessRequest {
    pub fn new(document_ids: Vec<String>, config: &UploadConfig) -> Self {
        Self {
            document_ids,
            chunking_strategy: config.chunking_strategy.clone(),
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
        }
    }

    pub fn validate(&self) -> ApiResult<()> {
        if self.document_ids.is_empty() {
            return Err(ApiError::Validation("No documents to process".into()));
        }
        self.validate_chunking()
    }

    /// Checks only the chunking parameters, so uploads can reject bad
    /// settings before any file is sent.
    pub fn validate_chunking(&self) -> ApiResult<()> {
        if !CHUNKING_STRATEGIES.contains(&self.chunking_strategy.as_str()) {
            return Err(ApiError::Validation(format!(
                "Unknown chunking strategy '{}'. Must be one of: {}",
                self.chunking_strategy,
                CHUNKING_STRATEGIES.join(", ")
            )));
        }
        if self.chunk_size == 0 {
            return Err(ApiError::Validation("Chunk size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(ApiError::Validation(
                "Chunk overlap must be smaller than chunk size".into(),
            ));
        }
        Ok(())
    }
}

/// Filter for `GET /api/documents/filter`. Tags are sent comma-separated.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub tags: Vec<String>,
    pub folder: Option<String>,
}

impl DocumentFilter {
    fn query(&self) -> Vec<(&'static str, String)> {
        let mut q = Vec::new();
        let tags = normalize_tags(&self.tags);
        if !tags.is_empty() {
            q.push(("tags", tags.join(",")));
        }
        if let Some(folder) = self.folder.as_deref().filter(|f| !f.trim().is_empty()) {
            q.push(("folder", folder.trim().to_string()));
        }
        q
    }
}

/// Tags are a set: trimmed, blanks dropped, de-duplicated and sorted.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = tags
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

pub async fn list_documents(client: &ApiClient) -> ApiResult<Vec<Document>> {
    let listing: Listing<Document> = client.get_json("/api/documents").await?;
    Ok(listing.into_items("documents")?)
}

pub async fn filter_documents(
    client: &ApiClient,
    filter: &DocumentFilter,
) -> ApiResult<Vec<Document>> {
    let query = filter.query();
    let listing: Listing<Document> = client
        .get_json_query("/api/documents/filter", &query)
        .await?;
    Ok(listing.into_items("documents")?)
}

pub async fn get_document(client: &ApiClient, id: &str) -> ApiResult<Document> {
    require_id(id)?;
    client.get_json(&resource_path("/api/documents", &[id])?).await
}

pub async fn update_tags(
    client: &ApiClient,
    id: &str,
    tags: &[String],
) -> ApiResult<serde_json::Value> {
    require_id(id)?;
    let body = serde_json::json!({ "tags": normalize_tags(tags) });
    client
        .put_json(&resource_path("/api/documents", &[id, "tags"])?, &body)
        .await
}

pub async fn update_folder(
    client: &ApiClient,
    id: &str,
    folder: &str,
) -> ApiResult<serde_json::Value> {
    require_id(id)?;
    let folder = folder.trim();
    if folder.is_empty() {
        return Err(ApiError::Validation("Folder must not be empty".into()));
    }
    let body = serde_json::json!({ "folder": folder });
    client
        .put_json(&resource_path("/api/documents", &[id, "folder"])?, &body)
        .await
}

pub async fn delete_document(client: &ApiClient, id: &str) -> ApiResult<()> {
    require_id(id)?;
    client.delete(&resource_path("/api/documents", &[id])?).await?;
    info!(id, "document deleted");
    Ok(())
}

pub async fn clear_all(client: &ApiClient) -> ApiResult<()> {
    client.delete("/api/documents/clear-all").await?;
    info!("all documents deleted");
    Ok(())
}

/// Ask the backend to chunk and index uploaded documents.
pub async fn process_documents(
    client: &ApiClient,
    request: &ProcessRequest,
) -> ApiResult<serde_json::Value> {
    request.validate()?;
    info!(
        documents = request.document_ids.len(),
        strategy = %request.chunking_strategy,
        "processing documents"
    );
    client.post_json("/api/documents/process", request).await
}

fn require_id(id: &str) -> ApiResult<()> {
    if id.trim().is_empty() {
        return Err(ApiError::Validation("Document id is required".into()));
    }
    Ok(())
}

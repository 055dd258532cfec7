//! Backend status: available models, corpus statistics, health.

use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::models::{Health, Listing, ModelInfo, SystemStats};

pub async fn list_models(client: &ApiClient) -> ApiResult<Vec<ModelInfo>> {
    let listing: Listing<ModelInfo> = client.get_json("/api/system/models").await?;
    Ok(listing.into_items("models")?)
}

pub async fn stats(client: &ApiClient) -> ApiResult<SystemStats> {
    client.get_json("/api/system/stats").await
}

pub async fn health(client: &ApiClient) -> ApiResult<Health> {
    client.get_json("/api/system/health").await
}

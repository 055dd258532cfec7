//! User administration (`/api/admin/users`). Requires an admin account.

use serde::Serialize;
use tracing::info;

use crate::auth::validate_password_pair;
use crate::client::{resource_path, ApiClient};
use crate::error::{ApiError, ApiResult};
use crate::models::{Listing, User};

#[derive(Debug, Clone, Serialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub is_admin: bool,
}

/// Partial update; only the fields that are set are sent.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_admin: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.full_name.is_none()
            && self.is_active.is_none()
            && self.is_admin.is_none()
            && self.password.is_none()
    }
}

pub async fn list_users(client: &ApiClient) -> ApiResult<Vec<User>> {
    let listing: Listing<User> = client.get_json("/api/admin/users").await?;
    Ok(listing.into_items("users")?)
}

pub async fn get_user(client: &ApiClient, username: &str) -> ApiResult<User> {
    client
        .get_json(&resource_path("/api/admin/users", &[require_username(username)?])?)
        .await
}

/// Create a user. `confirm` must repeat the password.
pub async fn create_user(client: &ApiClient, user: &NewUser, confirm: &str) -> ApiResult<User> {
    require_username(&user.username)?;
    validate_password_pair(&user.password, confirm)?;
    let created: User = client.post_json("/api/admin/users", user).await?;
    info!(username = %created.username, "user created");
    Ok(created)
}

pub async fn update_user(
    client: &ApiClient,
    username: &str,
    update: &UserUpdate,
) -> ApiResult<User> {
    let username = require_username(username)?;
    if update.is_empty() {
        return Err(ApiError::Validation("Nothing to update".into()));
    }
    let updated: User = client
        .put_json(&resource_path("/api/admin/users", &[username])?, update)
        .await?;
    info!(username, "user updated");
    Ok(updated)
}

pub async fn set_active(client: &ApiClient, username: &str, active: bool) -> ApiResult<User> {
    let update = UserUpdate {
        is_active: Some(active),
        ..UserUpdate::default()
    };
    update_user(client, username, &update).await
}

pub async fn delete_user(client: &ApiClient, username: &str) -> ApiResult<()> {
    let username = require_username(username)?;
    client
        .delete(&resource_path("/api/admin/users", &[username])?)
        .await?;
    info!(username, "user deleted");
    Ok(())
}

fn require_username(username: &str) -> ApiResult<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    Ok(username)
}

//! Login, registration, token refresh, and local JWT expiry checks.
//!
//! Tokens are issued by the backend auth service. The client never verifies
//! signatures; it only reads the `exp` claim to decide whether a token is
//! about to expire and should be exchanged before the next request.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::ApiClient;
use crate::error::{ApiError, ApiResult};
use crate::models::User;
use crate::session::Credentials;

/// Response of `/api/auth/token` and `/api/auth/refresh`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

#[derive(Debug, Deserialize)]
struct ExpClaim {
    exp: Option<i64>,
}

fn decode_exp(token: &str) -> jsonwebtoken::errors::Result<Option<i64>> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = jsonwebtoken::decode::<ExpClaim>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims.exp)
}

/// Read the `exp` claim without checking the signature.
pub fn token_expiry(token: &str) -> Option<i64> {
    decode_exp(token).ok().flatten()
}

/// True if the token expires within `horizon_secs` of `now`.
///
/// A token that cannot be decoded counts as expired. A token without an
/// `exp` claim never expires.
pub fn expires_within(token: &str, horizon_secs: i64, now: i64) -> bool {
    match decode_exp(token) {
        Ok(Some(exp)) => exp - now <= horizon_secs,
        Ok(None) => false,
        Err(e) => {
            debug!(error = %e, "access token is not a decodable JWT");
            true
        }
    }
}

pub fn is_expiring(token: &str, horizon_secs: i64) -> bool {
    expires_within(token, horizon_secs, Utc::now().timestamp())
}

/// Exchange a username and password for tokens and store them.
pub async fn login(client: &ApiClient, username: &str, password: &str) -> ApiResult<Credentials> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(ApiError::Validation(
            "Username and password are required".to_string(),
        ));
    }

    let form = [("username", username.to_string()), ("password", password.to_string())];
    let resp = client
        .send_public(|http, url| http.post(url).form(&form), "/api/auth/token")
        .await?;
    let tokens: TokenResponse = resp.json().await?;

    let creds = Credentials {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
        username: Some(username.to_string()),
    };
    client.session().set_credentials(creds.clone()).await?;
    info!(username, "logged in");
    Ok(creds)
}

/// Call `/api/auth/refresh` with the given refresh token.
pub(crate) async fn request_refresh(
    client: &ApiClient,
    refresh_token: &str,
) -> ApiResult<TokenResponse> {
    let body = serde_json::json!({ "refresh_token": refresh_token });
    let resp = client
        .send_public(|http, url| http.post(url).json(&body), "/api/auth/refresh")
        .await?;
    Ok(resp.json().await?)
}

pub async fn logout(client: &ApiClient) -> ApiResult<()> {
    client.session().clear_credentials().await?;
    info!("logged out");
    Ok(())
}

pub async fn current_user(client: &ApiClient) -> ApiResult<User> {
    client.get_json("/api/auth/me").await
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Validate a registration form; nothing is sent if this fails.
pub fn validate_registration(reg: &Registration, confirm_password: &str) -> ApiResult<()> {
    if reg.username.trim().is_empty() {
        return Err(ApiError::Validation("Username is required".into()));
    }
    if reg.email.trim().is_empty() || !reg.email.contains('@') {
        return Err(ApiError::Validation("A valid email is required".into()));
    }
    validate_password_pair(&reg.password, confirm_password)
}

pub fn validate_password_pair(password: &str, confirm: &str) -> ApiResult<()> {
    if password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }
    if password != confirm {
        return Err(ApiError::Validation("Passwords do not match".into()));
    }
    Ok(())
}

pub async fn register(
    client: &ApiClient,
    reg: &Registration,
    confirm_password: &str,
) -> ApiResult<User> {
    validate_registration(reg, confirm_password)?;
    let resp = client
        .send_public(|http, url| http.post(url).json(reg), "/api/auth/register")
        .await?;
    let user: User = resp.json().await?;
    info!(username = %user.username, "registered");
    Ok(user)
}

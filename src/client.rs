//! Authenticated HTTP client.
//!
//! [`ApiClient`] wraps a `reqwest::Client` and the [`SessionStore`]. Every
//! authenticated call goes through [`ApiClient::send`], which:
//!
//! 1. refreshes the access token first if its `exp` claim falls inside the
//!    refresh horizon,
//! 2. attaches `Authorization: Bearer …` plus a cookie mirror of the token,
//! 3. on `401`, refreshes once and resends once,
//! 4. if the refresh fails or the resend is still `401`, clears stored
//!    credentials and returns [`ApiError::LoginRequired`] with a login URL
//!    whose `redirect` parameter points back at the requested path.
//!
//! Requests are described by a closure so the same request can be rebuilt
//! for the retry, including multipart bodies that cannot be cloned.

use reqwest::header::{AUTHORIZATION, COOKIE};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth;
use crate::config::Config;
use crate::error::{ApiError, ApiResult};
use crate::session::SessionStore;

#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
    /// Deadline for each JSON call. Streams and uploads are unbounded.
    request_timeout: Option<Duration>,
}

struct Inner {
    http: reqwest::Client,
    base_url: String,
    session: SessionStore,
    refresh_horizon_secs: i64,
    /// Serializes refreshes so concurrent requests exchange the token once.
    refresh_lock: Mutex<()>,
}

impl ApiClient {
    pub fn new(config: &Config, session: SessionStore) -> ApiResult<Self> {
        let timeout = Duration::from_secs(config.server.request_timeout_secs);
        let http = reqwest::Client::builder().connect_timeout(timeout).build()?;
        Ok(Self::with_http(
            http,
            &config.server.base_url,
            session,
            config.auth.refresh_horizon_secs,
        )
        .with_request_timeout(timeout))
    }

    pub fn with_http(
        http: reqwest::Client,
        base_url: &str,
        session: SessionStore,
        refresh_horizon_secs: i64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url: base_url.trim_end_matches('/').to_string(),
                session,
                refresh_horizon_secs,
                refresh_lock: Mutex::new(()),
            }),
            request_timeout: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn bounded(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.request_timeout {
            Some(t) => req.timeout(t),
            None => req,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    /// Login page URL that sends the user back to `path` afterwards.
    pub fn login_url(&self, path: &str) -> String {
        let login = self.url("/login");
        match Url::parse_with_params(&login, &[("redirect", path)]) {
            Ok(url) => url.to_string(),
            Err(_) => login,
        }
    }

    /// Send a request without credentials. Non-success statuses become
    /// [`ApiError::Status`].
    pub async fn send_public<F>(&self, build: F, path: &str) -> ApiResult<Response>
    where
        F: Fn(&reqwest::Client, String) -> reqwest::RequestBuilder,
    {
        debug!(path, "public request");
        let resp = build(&self.inner.http, self.url(path)).send().await?;
        check_status(resp).await
    }

    /// Send an authenticated request, refreshing and retrying as described
    /// in the module docs.
    pub async fn send<F>(&self, path: &str, build: F) -> ApiResult<Response>
    where
        F: Fn(&reqwest::Client, String) -> reqwest::RequestBuilder,
    {
        let token = self.fresh_token(path).await?;
        let resp = self.dispatch(&build, path, token.as_deref()).await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return check_status(resp).await;
        }

        warn!(path, "request unauthorized, refreshing token and retrying once");
        let token = match self.refresh(token.as_deref()).await {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                return Err(self.force_logout(path).await);
            }
        };

        let retry = self.dispatch(&build, path, Some(&token)).await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(self.force_logout(path).await);
        }
        check_status(retry).await
    }

    async fn dispatch<F>(&self, build: &F, path: &str, token: Option<&str>) -> ApiResult<Response>
    where
        F: Fn(&reqwest::Client, String) -> reqwest::RequestBuilder,
    {
        let mut req = build(&self.inner.http, self.url(path));
        if let Some(token) = token {
            req = req
                .header(AUTHORIZATION, format!("Bearer {}", token))
                .header(COOKIE, format!("access_token={}", token));
        }
        debug!(path, authenticated = token.is_some(), "sending request");
        Ok(req.send().await?)
    }

    /// The current access token, refreshed first if it is about to expire.
    async fn fresh_token(&self, path: &str) -> ApiResult<Option<String>> {
        let Some(creds) = self.inner.session.credentials().await else {
            return Ok(None);
        };
        if !auth::is_expiring(&creds.access_token, self.inner.refresh_horizon_secs) {
            return Ok(Some(creds.access_token));
        }

        info!("access token expires soon, refreshing before request");
        match self.refresh(Some(&creds.access_token)).await {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!(error = %e, "proactive token refresh failed");
                Err(self.force_logout(path).await)
            }
        }
    }

    /// Exchange the stored refresh token. `stale` is the access token the
    /// caller saw; if another task already replaced it, that token is reused.
    async fn refresh(&self, stale: Option<&str>) -> ApiResult<String> {
        let _guard = self.inner.refresh_lock.lock().await;

        let creds = self
            .inner
            .session
            .credentials()
            .await
            .ok_or_else(|| ApiError::Validation("not logged in".into()))?;

        if stale.is_some_and(|s| s != creds.access_token)
            && !auth::is_expiring(&creds.access_token, self.inner.refresh_horizon_secs)
        {
            return Ok(creds.access_token);
        }

        let refresh_token = creds
            .refresh_token
            .ok_or_else(|| ApiError::Validation("no refresh token stored".into()))?;

        let tokens = auth::request_refresh(self, &refresh_token).await?;
        self.inner
            .session
            .update_tokens(tokens.access_token.clone(), tokens.refresh_token)
            .await?;
        info!("access token refreshed");
        Ok(tokens.access_token)
    }

    async fn force_logout(&self, path: &str) -> ApiError {
        if let Err(e) = self.inner.session.clear_credentials().await {
            warn!(error = %e, "failed to clear stored credentials");
        }
        warn!(path, "credentials cleared, login required");
        ApiError::LoginRequired {
            login_url: self.login_url(path),
        }
    }

    // ============ JSON helpers ============

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        let resp = self.send(path, |http, url| self.bounded(http.get(url))).await?;
        decode_json(resp).await
    }

    pub async fn get_json_query<T, Q>(&self, path: &str, query: &Q) -> ApiResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let resp = self
            .send(path, |http, url| self.bounded(http.get(url).query(query)))
            .await?;
        decode_json(resp).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .send(path, |http, url| self.bounded(http.post(url).json(body)))
            .await?;
        decode_json(resp).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let resp = self
            .send(path, |http, url| self.bounded(http.put(url).json(body)))
            .await?;
        decode_json(resp).await
    }

    /// DELETE, ignoring any response body.
    pub async fn delete(&self, path: &str) -> ApiResult<()> {
        self.send(path, |http, url| self.bounded(http.delete(url))).await?;
        Ok(())
    }
}

/// `prefix` plus `segments`, each percent-encoded as a single path segment,
/// so ids containing `/`, `?` or `#` stay inside their own segment.
pub fn resource_path(prefix: &str, segments: &[&str]) -> ApiResult<String> {
    let invalid = || ApiError::Validation(format!("Invalid API path: {}", prefix));
    let mut url = Url::parse("http://localhost")
        .and_then(|base| base.join(prefix))
        .map_err(|_| invalid())?;
    url.path_segments_mut()
        .map_err(|_| invalid())?
        .pop_if_empty()
        .extend(segments);
    Ok(url.path().to_string())
}

async fn check_status(resp: Response) -> ApiResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), body = %body, "request failed");
    Err(ApiError::from_status(status, &body))
}

/// Decode a JSON body. An empty body decodes as `null`, so endpoints that
/// answer `204 No Content` can be read as `serde_json::Value` or `()`.
pub(crate) async fn decode_json<T: DeserializeOwned>(resp: Response) -> ApiResult<T> {
    let bytes = resp.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::from_value(serde_json::Value::Null)?);
    }
    Ok(serde_json::from_slice(&bytes)?)
}

//! Persisted client state.
//!
//! Stands in for browser local/session storage: tokens, username, the
//! conversation transcript, and UI preferences live in one JSON file. Every
//! mutation is written through to disk (temp file + rename) so a crash never
//! leaves a half-written session.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::conversation::Conversation;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(default = "default_theme")]
    pub theme: String,
    /// Panel name → collapsed.
    #[serde(default)]
    pub collapsed_panels: BTreeMap<String, bool>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: default_theme(),
            collapsed_panels: BTreeMap::new(),
        }
    }
}

fn default_theme() -> String {
    "light".to_string()
}

pub const THEMES: &[&str] = &["light", "dark", "system"];

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default)]
    pub conversation: Option<Conversation>,
    #[serde(default)]
    pub preferences: Preferences,
}

/// File-backed session shared by every API call of one client.
#[derive(Debug)]
pub struct SessionStore {
    path: Option<PathBuf>,
    data: Mutex<SessionData>,
}

impl SessionStore {
    /// Load the session at `path`, starting empty if the file does not exist.
    /// An unreadable or corrupt file is logged and replaced.
    pub fn open(path: &Path) -> ApiResult<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(data) => data,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session file is corrupt, starting fresh");
                    SessionData::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionData::default(),
            Err(e) => return Err(ApiError::Storage(format!("{}: {}", path.display(), e))),
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            data: Mutex::new(data),
        })
    }

    /// A session that is never written to disk.
    pub fn in_memory(data: SessionData) -> Self {
        Self {
            path: None,
            data: Mutex::new(data),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> SessionData {
        self.data.lock().await.clone()
    }

    pub async fn credentials(&self) -> Option<Credentials> {
        self.data.lock().await.credentials.clone()
    }

    pub async fn set_credentials(&self, creds: Credentials) -> ApiResult<()> {
        self.update(|d| d.credentials = Some(creds)).await
    }

    /// Replace the access token (and the refresh token if a new one was
    /// issued), keeping the username.
    pub async fn update_tokens(
        &self,
        access_token: String,
        refresh_token: Option<String>,
    ) -> ApiResult<()> {
        self.update(|d| {
            let creds = d.credentials.get_or_insert_with(Credentials::default);
            creds.access_token = access_token;
            if refresh_token.is_some() {
                creds.refresh_token = refresh_token;
            }
        })
        .await
    }

    pub async fn clear_credentials(&self) -> ApiResult<()> {
        self.update(|d| d.credentials = None).await
    }

    pub async fn conversation(&self) -> Option<Conversation> {
        self.data.lock().await.conversation.clone()
    }

    pub async fn set_conversation(&self, conversation: Option<Conversation>) -> ApiResult<()> {
        self.update(|d| d.conversation = conversation).await
    }

    pub async fn preferences(&self) -> Preferences {
        self.data.lock().await.preferences.clone()
    }

    pub async fn set_theme(&self, theme: &str) -> ApiResult<()> {
        if !THEMES.contains(&theme) {
            return Err(ApiError::Validation(format!(
                "Unknown theme '{}'. Must be one of: {}",
                theme,
                THEMES.join(", ")
            )));
        }
        let theme = theme.to_string();
        self.update(|d| d.preferences.theme = theme).await
    }

    pub async fn set_panel_collapsed(&self, panel: &str, collapsed: bool) -> ApiResult<()> {
        let panel = panel.to_string();
        self.update(|d| {
            d.preferences.collapsed_panels.insert(panel, collapsed);
        })
        .await
    }

    async fn update(&self, f: impl FnOnce(&mut SessionData)) -> ApiResult<()> {
        let mut guard = self.data.lock().await;
        f(&mut guard);
        if let Some(path) = &self.path {
            persist(path, &guard)?;
        }
        Ok(())
    }
}

fn persist(path: &Path, data: &SessionData) -> ApiResult<()> {
    let storage_err = |e: std::io::Error| ApiError::Storage(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(storage_err)?;
    }
    let text = serde_json::to_string_pretty(data)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, text).map_err(storage_err)?;
    std::fs::rename(&tmp, path).map_err(storage_err)?;
    debug!(path = %path.display(), "session saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("session.json");

        let store = SessionStore::open(&path).unwrap();
        store
            .set_credentials(Credentials {
                access_token: "a".into(),
                refresh_token: Some("r".into()),
                username: Some("alice".into()),
            })
            .await
            .unwrap();
        let mut conv = Conversation::new();
        conv.push(Role::User, "hello");
        store.set_conversation(Some(conv.clone())).await.unwrap();
        store.set_panel_collapsed("sources", true).await.unwrap();

        let reopened = SessionStore::open(&path).unwrap();
        let snap = reopened.snapshot().await;
        assert_eq!(snap.credentials.unwrap().username.as_deref(), Some("alice"));
        assert_eq!(snap.conversation, Some(conv));
        assert_eq!(snap.preferences.collapsed_panels.get("sources"), Some(&true));
    }

    #[tokio::test]
    async fn update_tokens_keeps_refresh_when_not_reissued() {
        let store = SessionStore::in_memory(SessionData::default());
        store.update_tokens("a1".into(), Some("r1".into())).await.unwrap();
        store.update_tokens("a2".into(), None).await.unwrap();
        let creds = store.credentials().await.unwrap();
        assert_eq!(creds.access_token, "a2");
        assert_eq!(creds.refresh_token.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn corrupt_file_starts_fresh() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = SessionStore::open(&path).unwrap();
        assert!(store.credentials().await.is_none());
    }

    #[tokio::test]
    async fn rejects_unknown_theme() {
        let store = SessionStore::in_memory(SessionData::default());
        assert!(store.set_theme("neon").await.is_err());
        store.set_theme("dark").await.unwrap();
        assert_eq!(store.preferences().await.theme, "dark");
    }
}

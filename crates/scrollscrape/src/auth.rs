//! Consumption of a previously captured browser session.
//!
//! The artifact is the JSON storage-state document written by common browser
//! automation tools: a list of cookies plus per-origin `localStorage` entries.
//!
//! ```json
//! {
//!   "cookies": [{"name": "sid", "value": "abc", "domain": ".example.com", "path": "/",
//!                "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax"}],
//!   "origins": [{"origin": "https://example.com",
//!                "localStorage": [{"name": "token", "value": "xyz"}]}]
//! }
//! ```
//!
//! Capturing the artifact is someone else's job; this module only loads and
//! validates it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::AuthError;

/// Environment variable overriding the default artifact path.
pub const STORAGE_STATE_ENV: &str = "SCROLLSCRAPE_STORAGE_STATE";

/// Default artifact file name, relative to the working directory.
pub const DEFAULT_STORAGE_STATE: &str = "storage_state.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Unix seconds; negative means a session cookie.
    #[serde(default = "session_cookie")]
    pub expires: f64,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
    #[serde(default)]
    pub same_site: Option<String>,
}

fn default_path() -> String {
    "/".to_string()
}

fn session_cookie() -> f64 {
    -1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    pub origin: String,
    #[serde(default)]
    pub local_storage: Vec<StorageEntry>,
}

/// A captured session: cookies and local storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl SessionState {
    /// Read and validate an artifact.
    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::Missing(path.to_path_buf()))
            }
            Err(e) => {
                return Err(AuthError::Corrupt {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };
        let state: SessionState = serde_json::from_str(&data).map_err(|e| AuthError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        if let Some(bad) = state
            .cookies
            .iter()
            .find(|c| c.name.is_empty() || c.domain.is_empty())
        {
            return Err(AuthError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("cookie {:?} has no name or domain", bad.name),
            });
        }
        Ok(state)
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.iter().all(|o| o.local_storage.is_empty())
    }

    /// Script run before any page script that restores `localStorage` for
    /// the matching origin. `None` when there is nothing to restore.
    pub fn local_storage_script(&self) -> Option<String> {
        let by_origin: BTreeMap<&str, Vec<(&str, &str)>> = self
            .origins
            .iter()
            .filter(|o| !o.local_storage.is_empty())
            .map(|o| {
                let entries = o
                    .local_storage
                    .iter()
                    .map(|e| (e.name.as_str(), e.value.as_str()))
                    .collect();
                (o.origin.as_str(), entries)
            })
            .collect();
        if by_origin.is_empty() {
            return None;
        }
        let data = serde_json::to_string(&by_origin).ok()?;
        Some(format!(
            "(() => {{ const data = {data}; const items = data[window.location.origin]; \
             if (!items) return; \
             for (const [k, v] of items) {{ try {{ window.localStorage.setItem(k, v); }} catch (e) {{}} }} }})();"
        ))
    }
}

/// Whether and how a run uses a captured session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum AuthMode {
    #[default]
    Disabled,
    /// Use the artifact if it loads; otherwise continue anonymously.
    Optional { path: PathBuf },
    /// The run fails before navigation unless the artifact loads.
    Required { path: PathBuf },
}

impl AuthMode {
    /// Load the session this mode asks for.
    pub fn resolve(&self) -> Result<Option<SessionState>, AuthError> {
        match self {
            AuthMode::Disabled => Ok(None),
            AuthMode::Required { path } => {
                let state = SessionState::load(path)?;
                info!(path = %path.display(), cookies = state.cookies.len(), "session state loaded");
                Ok(Some(state))
            }
            AuthMode::Optional { path } => match SessionState::load(path) {
                Ok(state) => {
                    info!(path = %path.display(), cookies = state.cookies.len(), "session state loaded");
                    Ok(Some(state))
                }
                Err(e) => {
                    warn!(error = %e, "continuing without session state");
                    Ok(None)
                }
            },
        }
    }

    /// Whether a session that cannot be used must fail the run.
    pub fn is_required(&self) -> bool {
        matches!(self, AuthMode::Required { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            AuthMode::Disabled => None,
            AuthMode::Optional { path } | AuthMode::Required { path } => Some(path),
        }
    }
}

/// Resolve the artifact path.
///
/// Priority: explicit argument, then `SCROLLSCRAPE_STORAGE_STATE`, then
/// `./storage_state.json`.
pub fn resolve_state_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    if let Ok(p) = std::env::var(STORAGE_STATE_ENV) {
        if !p.trim().is_empty() {
            return PathBuf::from(p);
        }
    }
    PathBuf::from(DEFAULT_STORAGE_STATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATE: &str = r#"{
        "cookies": [
            {"name": "sid", "value": "abc", "domain": ".example.com", "path": "/",
             "expires": -1, "httpOnly": true, "secure": true, "sameSite": "Lax"}
        ],
        "origins": [
            {"origin": "https://example.com", "localStorage": [{"name": "token", "value": "x\"y"}]}
        ]
    }"#;

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage_state.json");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_valid_state() {
        let (_dir, path) = write(STATE);
        let state = SessionState::load(&path).unwrap();
        assert_eq!(state.cookies.len(), 1);
        assert!(state.cookies[0].http_only);
        assert_eq!(state.cookies[0].same_site.as_deref(), Some("Lax"));
        assert_eq!(state.origins[0].local_storage[0].name, "token");
        assert!(!state.is_empty());
    }

    #[test]
    fn test_missing_and_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            SessionState::load(&missing),
            Err(AuthError::Missing(p)) if p == missing
        ));

        let (_dir, path) = write("{not json");
        assert!(matches!(SessionState::load(&path), Err(AuthError::Corrupt { .. })));

        let (_dir, path) = write(r#"{"cookies": [{"name": "", "value": "v", "domain": "a.com"}]}"#);
        assert!(matches!(SessionState::load(&path), Err(AuthError::Corrupt { .. })));
    }

    #[test]
    fn test_cookie_defaults() {
        let (_dir, path) = write(r#"{"cookies": [{"name": "a", "value": "b", "domain": "x.com"}]}"#);
        let state = SessionState::load(&path).unwrap();
        assert_eq!(state.cookies[0].path, "/");
        assert!(state.cookies[0].expires < 0.0);
        assert!(state.origins.is_empty());
    }

    #[test]
    fn test_required_mode_fails_optional_mode_continues() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");

        let required = AuthMode::Required { path: path.clone() };
        assert!(matches!(required.resolve(), Err(AuthError::Missing(_))));

        let optional = AuthMode::Optional { path };
        assert_eq!(optional.resolve().unwrap(), None);
        assert_eq!(AuthMode::Disabled.resolve().unwrap(), None);
    }

    #[test]
    fn test_local_storage_script_escapes_values() {
        let (_dir, path) = write(STATE);
        let state = SessionState::load(&path).unwrap();
        let script = state.local_storage_script().unwrap();
        assert!(script.contains(r#""https://example.com":[["token","x\"y"]]"#));
        assert!(script.contains("window.location.origin"));

        assert_eq!(SessionState::default().local_storage_script(), None);
    }

    #[test]
    fn test_explicit_path_wins() {
        let p = resolve_state_path(Some(Path::new("/tmp/state.json")));
        assert_eq!(p, PathBuf::from("/tmp/state.json"));
    }
}

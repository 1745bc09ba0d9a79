//! Local cache of captured portal sessions.
//!
//! Logging in is someone else's job: a session is captured from a browser
//! (or another tool) and stored here as cookies, then reloaded for each run.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Session data for one portal login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    /// Session cookies (name -> value).
    #[serde(default)]
    pub cookies: HashMap<String, String>,

    /// When the session was captured (Unix timestamp).
    #[serde(default)]
    pub captured_at: Option<i64>,

    /// Arbitrary key-value data, e.g. the regional center it belongs to.
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }
}

/// Cache for session data, stored locally as one JSON file per session name.
pub struct SessionCache {
    cache_dir: PathBuf,
}

impl SessionCache {
    /// Create a session cache at the given directory, creating it if needed.
    pub fn with_path(cache_dir: impl AsRef<Path>) -> Result<Self> {
        let cache_dir = cache_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir)
            .with_context(|| format!("Failed to create session cache dir: {cache_dir:?}"))?;
        Ok(Self { cache_dir })
    }

    fn session_file(&self, name: &str) -> Result<PathBuf> {
        let safe = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if !safe {
            anyhow::bail!("Invalid session name {name:?}");
        }
        Ok(self.cache_dir.join(format!("{name}.json")))
    }

    /// Load session data by name.
    pub fn get(&self, name: &str) -> Result<Option<SessionData>> {
        let path = self.session_file(name)?;
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read session file: {path:?}"))?;

        let session: SessionData = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {path:?}"))?;

        Ok(Some(session))
    }

    /// Save session data under a name.
    pub fn set(&self, name: &str, session: &SessionData) -> Result<()> {
        let path = self.session_file(name)?;
        let content =
            serde_json::to_string_pretty(session).context("Failed to serialize session")?;

        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write session file: {path:?}"))?;

        Ok(())
    }

    /// Delete session data by name.
    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.session_file(name)?;
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete session file: {path:?}"))?;
        }
        Ok(())
    }
}

/// Parse session cookies exported from a browser.
///
/// Accepts either a plain map:
/// ```json
/// { "cookies": { "JSESSIONID": "...", "TS01": "..." } }
/// ```
/// or a browser storage-state export:
/// ```json
/// { "cookies": [ { "name": "JSESSIONID", "value": "...", "domain": "..." } ] }
/// ```
pub fn parse_exported_session(json: &str) -> Result<SessionData> {
    #[derive(Deserialize)]
    struct ExportedCookie {
        name: String,
        value: String,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ExportedCookies {
        Map(HashMap<String, String>),
        List(Vec<ExportedCookie>),
    }

    #[derive(Deserialize)]
    struct ExportedSession {
        cookies: ExportedCookies,
    }

    let exported: ExportedSession =
        serde_json::from_str(json).context("Failed to parse exported session JSON")?;

    let cookies: HashMap<String, String> = match exported.cookies {
        ExportedCookies::Map(map) => map,
        ExportedCookies::List(list) => list.into_iter().map(|c| (c.name, c.value)).collect(),
    };
    if cookies.is_empty() {
        anyhow::bail!("Exported session contains no cookies");
    }

    Ok(SessionData {
        cookies,
        captured_at: Some(chrono::Utc::now().timestamp()),
        data: HashMap::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_round_trip_and_delete() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = SessionCache::with_path(dir.path())?;
        assert!(cache.get("sgprc")?.is_none());

        let session = SessionData::new().with_cookie("JSESSIONID", "abc");
        cache.set("sgprc", &session)?;
        let loaded = cache.get("sgprc")?.expect("session should exist");
        assert_eq!(loaded.cookies.get("JSESSIONID"), Some(&"abc".to_string()));

        cache.delete("sgprc")?;
        assert!(cache.get("sgprc")?.is_none());
        Ok(())
    }

    #[test]
    fn test_rejects_path_like_names() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = SessionCache::with_path(dir.path())?;
        assert!(cache.get("../escape").is_err());
        assert!(cache.set("", &SessionData::new()).is_err());
        Ok(())
    }

    #[test]
    fn test_parse_exported_map_and_list() -> Result<()> {
        let map = parse_exported_session(r#"{"cookies": {"JSESSIONID": "a", "TS01": "b"}}"#)?;
        assert_eq!(map.cookies.len(), 2);
        assert_eq!(map.cookies.get("TS01").map(String::as_str), Some("b"));

        let list = parse_exported_session(
            r#"{"cookies": [{"name": "JSESSIONID", "value": "a", "domain": "ebilling.dds.ca.gov", "path": "/"}], "origins": []}"#,
        )?;
        assert_eq!(list.cookies.len(), 1);
        assert!(list.captured_at.is_some());

        assert!(parse_exported_session(r#"{"cookies": {}}"#).is_err());
        Ok(())
    }
}

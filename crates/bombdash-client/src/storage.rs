//! Client-local persisted state: the auth token and the terms flag.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("IO error on {path}: {message}")]
    Io { path: PathBuf, message: String },
    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("Failed to serialize client state: {0}")]
    Serialize(String),
}

/// On-disk layout. The token has been written under two keys over time;
/// both are read, only `jwtToken` is written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredState {
    #[serde(rename = "jwtToken", default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(rename = "jwt_token", default, skip_serializing_if = "Option::is_none")]
    legacy_token: Option<String>,
    #[serde(rename = "termsAccepted", default)]
    terms_accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saved_at: Option<DateTime<Utc>>,
}

/// Persisted token store, file-backed or in memory.
///
/// Clones share state. Every write goes straight to disk.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: Option<PathBuf>,
    state: Rc<RefCell<StoredState>>,
}

impl TokenStore {
    /// Open the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TokenStoreError> {
        let path = path.into();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| TokenStoreError::Io {
                path: path.clone(),
                message: e.to_string(),
            })?;
            toml::from_str(&content).map_err(|e| TokenStoreError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?
        } else {
            StoredState::default()
        };
        debug!("Opened token store at {}", path.display());
        Ok(Self {
            path: Some(path),
            state: Rc::new(RefCell::new(state)),
        })
    }

    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Rc::new(RefCell::new(StoredState::default())),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Token under the current key, else under the legacy key
    pub fn token(&self) -> Option<String> {
        let state = self.state.borrow();
        state
            .token
            .clone()
            .or_else(|| state.legacy_token.clone())
            .filter(|token| !token.is_empty())
    }

    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().saved_at
    }

    pub fn save_token(&self, token: &str) -> Result<(), TokenStoreError> {
        {
            let mut state = self.state.borrow_mut();
            state.token = Some(token.to_string());
            state.saved_at = Some(Utc::now());
        }
        info!("Stored auth token");
        self.persist()
    }

    /// Remove the token under both keys
    pub fn clear_token(&self) -> Result<(), TokenStoreError> {
        {
            let mut state = self.state.borrow_mut();
            state.token = None;
            state.legacy_token = None;
            state.saved_at = None;
        }
        info!("Cleared auth token");
        self.persist()
    }

    pub fn terms_accepted(&self) -> bool {
        self.state.borrow().terms_accepted
    }

    pub fn set_terms_accepted(&self, accepted: bool) -> Result<(), TokenStoreError> {
        self.state.borrow_mut().terms_accepted = accepted;
        self.persist()
    }

    fn persist(&self) -> Result<(), TokenStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let content = toml::to_string_pretty(&*self.state.borrow())
            .map_err(|e| TokenStoreError::Serialize(e.to_string()))?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TokenStoreError::Io {
                path: parent.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        fs::write(path, content).map_err(|e| TokenStoreError::Io {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("bombdash-store-{}-{}", name, std::process::id()))
            .join("client_state.toml")
    }

    #[test]
    fn test_reads_legacy_key() {
        let path = scratch("legacy");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "jwt_token = \"old-token\"\ntermsAccepted = true\n").unwrap();

        let store = TokenStore::open(&path).unwrap();
        assert_eq!(store.token(), Some("old-token".to_string()));
        assert!(store.terms_accepted());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_primary_key_wins_and_clear_removes_both() {
        let path = scratch("both");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "jwtToken = \"new\"\njwt_token = \"old\"\n").unwrap();

        let store = TokenStore::open(&path).unwrap();
        assert_eq!(store.token(), Some("new".to_string()));

        store.clear_token().unwrap();
        let reopened = TokenStore::open(&path).unwrap();
        assert_eq!(reopened.token(), None);
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("jwt"));

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_persists_under_primary_key() {
        let path = scratch("save");
        let store = TokenStore::open(&path).unwrap();
        assert_eq!(store.token(), None);

        store.save_token("abc").unwrap();
        store.set_terms_accepted(true).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("jwtToken = \"abc\""));
        let reopened = TokenStore::open(&path).unwrap();
        assert_eq!(reopened.token(), Some("abc".to_string()));
        assert!(reopened.terms_accepted());
        assert!(reopened.saved_at().is_some());

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_in_memory_store() {
        let store = TokenStore::in_memory();
        store.save_token("t").unwrap();
        let shared = store.clone();
        assert_eq!(shared.token(), Some("t".to_string()));
        shared.clear_token().unwrap();
        assert_eq!(store.token(), None);
        assert_eq!(store.path(), None);
    }
}

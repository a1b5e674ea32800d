//! Persisted UI preference state: the selected book and named toggles.
//!
//! An explicit, injectable store rather than a module-level singleton.
//! Loaded once at startup and saved on change only, as one JSON file next
//! to the database, written temp-file-then-rename like the database
//! snapshots. Preferences are low-stakes: an unreadable file is treated as
//! absent rather than refusing to start.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use vellum_api::{Result, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppState {
    pub selected_book_uuid: Option<String>,
    pub toggles: BTreeMap<String, bool>,
}

/// Handle to the preference store. Cheap to clone; clones share state and
/// serialize their saves through one lock.
#[derive(Debug, Clone)]
pub struct AppStateStore {
    inner: Arc<Mutex<AppState>>,
    path: Option<Arc<PathBuf>>,
}

impl AppStateStore {
    /// Load the state file, or start from defaults when it is absent or
    /// unreadable.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(state) => state,
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "unreadable app state file, starting from defaults"
                    );
                    AppState::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => AppState::default(),
            Err(err) => {
                return Err(StoreError::Storage {
                    message: format!("read {}: {err}", path.display()),
                });
            }
        };
        Ok(Self {
            inner: Arc::new(Mutex::new(state)),
            path: Some(Arc::new(path)),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Mutex::new(AppState::default())),
            path: None,
        }
    }

    pub async fn get(&self) -> AppState {
        self.inner.lock().await.clone()
    }

    /// Apply `f` and persist the result, but only when it actually changed
    /// the state. A failed save restores the previous state, so memory and
    /// disk never diverge. Returns the state after the update.
    pub async fn update(&self, f: impl FnOnce(&mut AppState)) -> Result<AppState> {
        // Lock held through the save so concurrent updates cannot
        // interleave their writes.
        let mut state = self.inner.lock().await;
        let before = state.clone();
        f(&mut state);
        if *state != before {
            if let Err(err) = self.save(&state).await {
                *state = before;
                return Err(err);
            }
        }
        Ok(state.clone())
    }

    async fn save(&self, state: &AppState) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| StoreError::Storage {
                message: format!("write {}: {e}", tmp.display()),
            })?;
        tokio::fs::rename(&tmp, path.as_ref())
            .await
            .map_err(|e| StoreError::Storage {
                message: format!("rename into {}: {e}", path.display()),
            })?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod state_tests;

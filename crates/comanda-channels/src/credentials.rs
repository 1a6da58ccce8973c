//! Credential persistence for the transport session.
//!
//! The transport hands us an opaque JSON blob whenever its credentials
//! change; we store it and give it back on the next connect.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

/// Where transport credentials live between connections.
pub trait CredentialStore: Send + Sync {
    /// Stored credentials, if any. Unreadable data counts as none.
    fn load(&self) -> Option<Value>;

    fn save(&self, credentials: &Value) -> Result<()>;
}

/// JSON file store: `{dir}/creds.json`.
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join("creds.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Value> {
        if !self.path.exists() {
            return None;
        }

        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to read credentials");
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "invalid credentials file, ignoring"
                );
                None
            }
        }
    }

    fn save(&self, credentials: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        // Write to a sibling file and rename so a crash never leaves a torn file.
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(credentials)?;
        std::fs::write(&tmp, json).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))?;

        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }
}

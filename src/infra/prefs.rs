use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::warn;

use crate::domain::vote::VoteKind;

/// Everything this device remembers between sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalPrefs {
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub votes: BTreeMap<String, VoteKind>,
    #[serde(default)]
    pub reported: BTreeSet<String>,
}

/// Device-scoped key-value persistence. A missing or unreadable backing file
/// degrades to an empty, memory-only store rather than failing.
#[derive(Debug, Clone)]
pub struct PrefsFile {
    path: Option<PathBuf>,
}

impl PrefsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn memory_only() -> Self {
        Self { path: None }
    }

    pub async fn load(&self) -> LocalPrefs {
        let Some(path) = &self.path else {
            return LocalPrefs::default();
        };

        match tokio::fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(prefs) => prefs,
                Err(err) => {
                    warn!(error = ?err, path = %path.display(), "ignoring corrupt preference file");
                    LocalPrefs::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => LocalPrefs::default(),
            Err(err) => {
                warn!(error = ?err, path = %path.display(), "preference file unavailable");
                LocalPrefs::default()
            }
        }
    }

    /// Best effort; failures are logged and dropped.
    pub async fn save(&self, prefs: &LocalPrefs) {
        if let Err(err) = self.try_save(prefs).await {
            warn!(error = ?err, "failed to persist preferences");
        }
    }

    async fn try_save(&self, prefs: &LocalPrefs) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let payload = serde_json::to_vec_pretty(prefs)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

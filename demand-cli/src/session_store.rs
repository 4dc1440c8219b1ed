use anyhow::{Context, Result};
use demand_core::DemandId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
#[cfg(unix)]
use std::{io::Write, os::unix::fs::OpenOptionsExt};

/// What survives between two `demand` invocations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_demand: Option<DemandId>,
}

pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `session.toml` next to the stored demands.
    pub fn in_data_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("session.toml"))
    }

    pub fn load(&self) -> Result<Option<SessionFile>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        match toml::from_str(&raw) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "ignoring unreadable session file: {e}"
                );
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &SessionFile) -> Result<()> {
        let raw = toml::to_string_pretty(session).context("Failed to serialize session")?;
        secure_write(&self.path, &raw)
    }
}

fn secure_write(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    #[cfg(unix)]
    {
        std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?
            .write_all(content.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, content)?;
    }

    Ok(())
}

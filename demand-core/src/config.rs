use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, PickFirst};

use crate::domain::{models::Phase, progress::CompletionTable};

const APP_DIR: &str = "demand-forge";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub session: SessionSettings,
    pub demand: DemandSettings,
    pub timeline: TimelineSettings,
    pub progress: CompletionTable,
    pub assistant: AssistantSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding demand documents, the index and attachments.
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR),
        }
    }
}

impl StorageSettings {
    pub fn attachments_dir(&self) -> PathBuf {
        self.data_dir.join("attachments")
    }
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Session lifetime measured from the session start.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub ttl_minutes: i64,
    /// Share of the TTL after which the session warns about expiry.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub warning_ratio: f64,
    /// Name recorded in audit entries.
    pub user: String,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_minutes: 60,
            warning_ratio: 0.8,
            user: "local-user".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandSettings {
    /// Prefix of generated demand ids, e.g. `LOG` in `LOG-2025-3F9A0C12`.
    pub id_prefix: String,
}

impl Default for DemandSettings {
    fn default() -> Self {
        Self {
            id_prefix: crate::domain::models::DEFAULT_ID_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineSettings {
    /// Default length in days of each phase in the phase-level schedule.
    pub phase_days: BTreeMap<Phase, u32>,
}

impl Default for TimelineSettings {
    fn default() -> Self {
        Self {
            phase_days: Phase::ALL
                .into_iter()
                .map(|phase| (phase, default_phase_days(phase)))
                .collect(),
        }
    }
}

impl TimelineSettings {
    pub fn days_for(&self, phase: Phase) -> u32 {
        self.phase_days
            .get(&phase)
            .copied()
            .unwrap_or_else(|| default_phase_days(phase))
    }
}

fn default_phase_days(phase: Phase) -> u32 {
    match phase {
        Phase::Ideation => 7,
        Phase::Requirements => 14,
        Phase::Assessment => 10,
        Phase::Design => 21,
        Phase::Build => 60,
        Phase::Validation => 14,
        Phase::Deployment => 7,
        Phase::Implementation => 30,
        Phase::Closing => 5,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    /// Shell command that reads a prompt on stdin and writes the reply to
    /// stdout. Unset disables generation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

impl Settings {
    /// Default location of the configuration file.
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }
}

/// Load settings from an optional TOML file, then `DEMAND_*` environment
/// variables (`DEMAND_SESSION__TTL_MINUTES=30`). Missing values use defaults.
pub fn read_config(file: Option<&Path>) -> Result<Settings, config::ConfigError> {
    let mut builder = config::Config::builder();
    if let Some(path) = file {
        builder = builder.add_source(config::File::from(path.to_path_buf()).required(false));
    }

    let settings = builder
        .add_source(
            config::Environment::with_prefix("DEMAND")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}

use crate::domain::{PeriodKind, TimeStyle};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User settings read from `settings.json`. Never written by this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub time_style: TimeStyle,
    #[serde(default)]
    pub default_period: PeriodKind,
    /// `tracing` filter used when `RUST_LOG` is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    /// Currency assumed for clients without one
    #[serde(default = "default_currency")]
    pub default_currency: String,
}

fn default_log_filter() -> String {
    "ticktally=info".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            time_style: TimeStyle::default(),
            default_period: PeriodKind::default(),
            log_filter: default_log_filter(),
            default_currency: default_currency(),
        }
    }
}

impl Settings {
    pub fn default_path() -> Result<PathBuf> {
        Ok(dirs::config_dir()
            .context("Cannot determine config directory")?
            .join("ticktally")
            .join("settings.json"))
    }

    /// Load from `path`, or from the default location. Missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };
        Self::load_from(&path)
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings at {}", path.display()))?;
        let settings: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse settings at {}", path.display()))?;
        Ok(settings)
    }
}

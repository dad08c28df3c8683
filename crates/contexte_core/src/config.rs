use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ContexteError, Result};
use crate::section::{DEFAULT_CONTEXTE_HEADING, DEFAULT_OBJECTIFS_HEADING, SectionMarkers};

pub const DEFAULT_CONFIG_FILENAME: &str = ".contexte.toml";
pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ContexteConfig {
    #[serde(default)]
    pub markers: MarkersSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MarkersSection {
    pub contexte: Option<String>,
    pub objectifs: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LoggingSection {
    pub level: Option<String>,
}

impl ContexteConfig {
    /// Contexte heading: env CONTEXTE_CONTEXTE_MARKER > config > `### Contexte`.
    pub fn contexte_heading(&self) -> String {
        env_override("CONTEXTE_CONTEXTE_MARKER")
            .or_else(|| self.markers.contexte.clone())
            .unwrap_or_else(|| DEFAULT_CONTEXTE_HEADING.to_string())
    }

    /// Objectifs heading: env CONTEXTE_OBJECTIFS_MARKER > config > `### Objectifs`.
    pub fn objectifs_heading(&self) -> String {
        env_override("CONTEXTE_OBJECTIFS_MARKER")
            .or_else(|| self.markers.objectifs.clone())
            .unwrap_or_else(|| DEFAULT_OBJECTIFS_HEADING.to_string())
    }

    pub fn section_markers(&self) -> SectionMarkers {
        SectionMarkers::from_headings(&self.contexte_heading(), &self.objectifs_heading())
    }

    /// Default filter directive; `CONTEXTE_LOG` and `RUST_LOG` still win at subscriber setup.
    pub fn log_level(&self) -> &str {
        self.logging
            .level
            .as_deref()
            .map(str::trim)
            .filter(|level| !level.is_empty())
            .unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "contexte_heading={:?}\nobjectifs_heading={:?}\nlog_level={}",
            self.contexte_heading(),
            self.objectifs_heading(),
            self.log_level()
        )
    }
}

fn env_override(name: &str) -> Option<String> {
    let value = env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `--config` wins; otherwise `.contexte.toml` in `cwd`.
pub fn resolve_config_path(flag: Option<&Path>, cwd: &Path) -> PathBuf {
    match flag {
        Some(path) => path.to_path_buf(),
        None => cwd.join(DEFAULT_CONFIG_FILENAME),
    }
}

/// Load and parse a config file. Returns the default if the file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ContexteConfig> {
    if !config_path.exists() {
        return Ok(ContexteConfig::default());
    }
    let content = fs::read_to_string(config_path).map_err(|error| {
        ContexteError::Config(format!("failed to read {}: {error}", config_path.display()))
    })?;
    let parsed: ContexteConfig = toml::from_str(&content).map_err(|error| {
        ContexteError::Config(format!("failed to parse {}: {error}", config_path.display()))
    })?;
    validate_headings(&parsed)?;
    Ok(parsed)
}

fn validate_headings(config: &ContexteConfig) -> Result<()> {
    for (key, heading) in [
        ("markers.contexte", &config.markers.contexte),
        ("markers.objectifs", &config.markers.objectifs),
    ] {
        if let Some(heading) = heading
            && (heading.trim().is_empty() || heading.contains('\n'))
        {
            return Err(ContexteError::Config(format!(
                "{key} must be a single non-empty line"
            )));
        }
    }
    Ok(())
}

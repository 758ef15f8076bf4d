use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::CronVcError;

const CONFIG_FILE: &str = "config.json";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Shared directory holding one subdirectory per host.
    pub snapshot_root: PathBuf,
    pub extension: String,
    pub crontab: PathBuf,
    pub co: PathBuf,
    pub ci: PathBuf,
    /// Overrides hostname detection when set.
    pub hostname: Option<String>,
    pub no_crontab_pattern: String,
    pub no_changes_pattern: String,
    pub negative_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            snapshot_root: PathBuf::from("/var/lib/crontab-vc"),
            extension: ".cron".to_string(),
            crontab: PathBuf::from("crontab"),
            co: PathBuf::from("co"),
            ci: PathBuf::from("ci"),
            hostname: None,
            no_crontab_pattern: "no crontab for ".to_string(),
            no_changes_pattern: "no changes made to crontab".to_string(),
            negative_prefix: "n".to_string(),
        }
    }
}

impl Config {
    pub fn no_crontab_regex(&self) -> Result<Regex> {
        compile("no_crontab_pattern", &self.no_crontab_pattern)
    }

    pub fn no_changes_regex(&self) -> Result<Regex> {
        compile("no_changes_pattern", &self.no_changes_pattern)
    }
}

fn compile(field: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern)
        .map_err(|e| CronVcError::Config(format!("{field}: {e}")).into())
}

// ~/.config/crontab-vc/config.json on Linux
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("crontab-vc").join(CONFIG_FILE))
}

pub fn parse(content: &str) -> Result<Config> {
    if content.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_json::from_str(content)
        .map_err(|e| CronVcError::Config(e.to_string()))?;
    if config.negative_prefix.is_empty() {
        return Err(CronVcError::Config("negative_prefix must not be empty".into()).into());
    }
    Ok(config)
}

// an explicit path must exist, the default location is optional
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) if path.exists() => path,
            _ => {
                tracing::debug!("no config file, using defaults");
                return Ok(Config::default());
            }
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("couldn't read config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "loaded config");
    parse(&content).with_context(|| format!("in {}", path.display()))
}

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::session::SessionSettings;
use crate::timer::{TimeBands, DEFAULT_DURATION_SECS};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub exam_id: String,
    pub duration_secs: Option<u64>,
    pub warning_at_secs: u64,
    pub critical_at_secs: u64,
    pub shuffle: bool,
}

impl Default for Config {
    fn default() -> Self {
        let bands = TimeBands::default();
        Self {
            exam_id: "sample".to_string(),
            duration_secs: None,
            warning_at_secs: bands.warning_at_secs,
            critical_at_secs: bands.critical_at_secs,
            shuffle: false,
        }
    }
}

impl Config {
    /// Session settings for an exam; an explicit duration wins over the
    /// exam's own, which wins over the default
    pub fn session_settings(&self, exam_duration: Option<u64>) -> SessionSettings {
        SessionSettings {
            duration_secs: self
                .duration_secs
                .or(exam_duration)
                .unwrap_or(DEFAULT_DURATION_SECS),
            bands: self.bands(),
        }
    }

    /// Warning threshold below the critical one would hide the warning band,
    /// so it is raised to the critical threshold
    fn bands(&self) -> TimeBands {
        if self.warning_at_secs < self.critical_at_secs {
            tracing::warn!(
                warning_at_secs = self.warning_at_secs,
                critical_at_secs = self.critical_at_secs,
                "warning threshold below critical threshold, using the critical one for both"
            );
        }
        TimeBands {
            warning_at_secs: self.warning_at_secs.max(self.critical_at_secs),
            critical_at_secs: self.critical_at_secs,
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = if let Some(pd) = ProjectDirs::from("", "", "proctor") {
            pd.config_dir().join("config.json")
        } else {
            PathBuf::from("proctor_config.json")
        };
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), "ignoring unreadable config: {e}");
                    Config::default()
                }
            },
            Err(_) => Config::default(),
        }
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}

//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory holding the project configuration
pub const PROJECT_DIR: &str = ".gwm";

/// gwm configuration with layered hierarchy
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    /// Window schema file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `gwm=trace`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,

    /// Default output format
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Self::load_files(Self::global_config_path().as_deref(), &cwd);
        config.merge(Self::from_env());
        config
    }

    /// Merge the global file and the nearest project file above `start`
    pub fn load_files(global_path: Option<&Path>, start: &Path) -> Self {
        // 1. Built-in defaults (already in Default impl)
        let mut config = Config::default();

        // 2. Global user config (~/.config/gwm/config.yaml)
        if let Some(global) = global_path.and_then(Self::read_file) {
            config.merge(global);
        }

        // 3. Project config (.gwm/config.yaml), paths relative to the project
        if let Some(root) = Self::discover_project(start) {
            let path = root.join(PROJECT_DIR).join("config.yaml");
            if let Some(mut project) = Self::read_file(&path) {
                project.resolve_paths(&root);
                config.merge(project);
            }
        }

        config
    }

    /// 4. Environment variables
    fn from_env() -> Self {
        Config {
            database: std::env::var_os("GWM_DATABASE").map(PathBuf::from),
            schema: std::env::var_os("GWM_SCHEMA").map(PathBuf::from),
            log: std::env::var("GWM_LOG").ok(),
            default_format: None,
        }
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!("Ignoring invalid config file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Find the closest directory at or above `start` containing `.gwm/`
    pub fn discover_project(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .find(|dir| dir.join(PROJECT_DIR).is_dir())
            .map(Path::to_path_buf)
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "gwm")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn resolve_paths(&mut self, root: &Path) {
        for path in [&mut self.database, &mut self.schema].into_iter().flatten() {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.schema.is_some() {
            self.schema = other.schema;
        }
        if other.log.is_some() {
            self.log = other.log;
        }
        if other.default_format.is_some() {
            self.default_format = other.default_format;
        }
    }
}

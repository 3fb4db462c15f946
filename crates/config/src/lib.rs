//! Layered configuration for the scanner.
//!
//! Values are merged, later sources winning:
//!
//! 1. built-in defaults,
//! 2. a configuration file: the one given explicitly, or `config.toml` in
//!    the platform configuration directory when it exists,
//! 3. environment variables prefixed with `OMNI_`, using `__` to reach into
//!    sections (`OMNI_SCANNER__BATCH_SIZE=128`).

pub mod error;
mod scanner;

use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::error::{ErrorKind, Result};
pub use crate::scanner::{MAX_CONCURRENCY, ScannerConfig};

const ENV_PREFIX: &str = "OMNI_";
const DEFAULT_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "omni.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the SQLite fingerprint database.
    pub database: PathBuf,
    pub scanner: ScannerConfig,
}

impl Default for Config {
    fn default() -> Self {
        let database = project_dirs()
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE));
        Self { database, scanner: ScannerConfig::default() }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "omni")
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// `file` overrides the default configuration file location; unlike the
    /// default location it must exist. Its format is picked from its
    /// extension (`toml`, `yaml`/`yml` or `json`).
    #[instrument]
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()));
        let figment = match file {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                merge_file(figment, path)?
            },
            None => match project_dirs().map(|dirs| dirs.config_dir().join(DEFAULT_FILE)) {
                Some(path) if path.is_file() => merge_file(figment, &path)?,
                _ => figment,
            },
        };
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .or_raise(|| ErrorKind::Load)?;
        config.validate()?;
        debug!(?config, "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.as_os_str().is_empty() {
            exn::bail!(ErrorKind::Invalid("database path is empty".to_string()));
        }
        self.scanner.validate()
    }
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file_exact(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path)),
        Some("json") => figment.merge(Json::file_exact(path)),
        _ => exn::bail!(ErrorKind::Invalid(format!("unsupported configuration format: {}", path.display()))),
    })
}

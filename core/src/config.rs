//! Logbook configuration loading
//!
//! Loads configuration from `~/.config/logbook/config.toml` (or the
//! `LOGBOOK_CONFIG` env var). Every key is optional; a missing file means
//! defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct LogbookConfig {
    /// Ledger file name, relative to the project directory
    #[serde(default = "default_ledger_file")]
    pub ledger_file: String,

    /// Guard file names, living beside the ledger
    #[serde(default)]
    pub sentinels: SentinelNames,

    /// Commit message settings
    #[serde(default)]
    pub commit: CommitConfig,

    /// Discovery roots for `logbook query`
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Lint settings
    #[serde(default)]
    pub lint: LintConfig,
}

fn default_ledger_file() -> String {
    "LOGBOOK.yaml".to_string()
}

/// File names of the lifecycle guard files.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct SentinelNames {
    #[serde(default = "default_lock")]
    pub lock: String,

    #[serde(default = "default_draft")]
    pub draft: String,

    #[serde(default = "default_diff")]
    pub diff: String,
}

fn default_lock() -> String {
    ".logbook.lock".to_string()
}

fn default_draft() -> String {
    ".logbook.draft.yaml".to_string()
}

fn default_diff() -> String {
    ".logbook.diff".to_string()
}

impl Default for SentinelNames {
    fn default() -> Self {
        Self {
            lock: default_lock(),
            draft: default_draft(),
            diff: default_diff(),
        }
    }
}

impl SentinelNames {
    pub fn all(&self) -> [&str; 3] {
        [
            self.lock.as_str(),
            self.draft.as_str(),
            self.diff.as_str(),
        ]
    }
}

/// Commit message configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CommitConfig {
    /// Prepended to every commit subject, e.g. "[logbook] "
    #[serde(default)]
    pub subject_prefix: Option<String>,
}

/// Discovery configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiscoveryConfig {
    /// Directories scanned for ledgers. `~/` is expanded.
    #[serde(default)]
    pub roots: Vec<String>,
}

impl DiscoveryConfig {
    pub fn resolved_roots(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|root| expand_home(root)).collect()
    }
}

/// Lint configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LintConfig {
    /// Report lint warnings on commit and dry runs
    #[serde(default = "default_lint_enabled")]
    pub enabled: bool,
}

fn default_lint_enabled() -> bool {
    true
}

impl Default for LintConfig {
    fn default() -> Self {
        Self {
            enabled: default_lint_enabled(),
        }
    }
}

impl Default for LogbookConfig {
    fn default() -> Self {
        Self {
            ledger_file: default_ledger_file(),
            sentinels: SentinelNames::default(),
            commit: CommitConfig::default(),
            discovery: DiscoveryConfig::default(),
            lint: LintConfig::default(),
        }
    }
}

impl LogbookConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "LOGBOOK_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "config.toml";

    /// Load configuration.
    ///
    /// Resolution order:
    /// 1. `explicit` (the `--config` flag)
    /// 2. `LOGBOOK_CONFIG` environment variable
    /// 3. `~/.config/logbook/config.toml`
    ///
    /// A missing file yields the defaults, except for an explicit path,
    /// which must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = Self::resolve_config_path();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let cfg: LogbookConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        cfg.validate()?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let cfg: LogbookConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path() -> PathBuf {
        if let Ok(path) = std::env::var(Self::ENV_CONFIG_PATH) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .map(|dir| dir.join("logbook").join(Self::DEFAULT_CONFIG_FILENAME))
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut names = vec![self.ledger_file.as_str()];
        names.extend(self.sentinels.all());

        for name in &names {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "ledger and sentinel file names must not be empty".into(),
                ));
            }
            if Path::new(name).components().count() != 1 {
                return Err(ConfigError::Invalid(format!(
                    "'{name}' must be a plain file name, not a path"
                )));
            }
        }

        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != names.len() {
            return Err(ConfigError::Invalid(
                "ledger and sentinel file names must be distinct".into(),
            ));
        }

        if self.discovery.roots.is_empty() {
            tracing::debug!("no discovery roots configured; `query` needs --root");
        }

        Ok(())
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(stripped);
    }
    PathBuf::from(path)
}

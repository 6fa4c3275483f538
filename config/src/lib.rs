//! Configuration for the dual-substrate ledger.
//!
//! Read from `~/.dualsub/config.toml`. Every key is optional; a missing file
//! yields [`LedgerConfig::default`].
//!
//! ```toml
//! [storage]
//! backend = "sqlite"              # or "memory"
//! data_dir = "${HOME}/ledger"
//! event_log = "/var/log/dualsub/event.log"
//!
//! [inference]
//! learning_rate = 0.05
//!
//! [energy]
//! lambda_weight = 0.5
//!
//! [flow]
//! policy = "auto_route"           # or "reject"
//!
//! [slots]
//! default_lawfulness = 1
//!
//! [symbols]
//! capacity = 10000
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable that overrides the event log location.
pub const EVENT_LOG_ENV: &str = "DUALSUB_EVENT_LOG";

pub const DEFAULT_LEARNING_RATE: f64 = 0.05;
pub const DEFAULT_LAMBDA_WEIGHT: f64 = 0.5;
pub const DEFAULT_LAWFULNESS: u8 = 1;
pub const DEFAULT_SYMBOL_CAPACITY: usize = 10_000;
const MAX_SYMBOL_CAPACITY: usize = 1_000_000;

const DATABASE_FILE: &str = "ledger.db";
const EVENT_LOG_FILE: &str = "event.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => Some(path),
            ConfigError::Invalid { .. } => None,
        }
    }

    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub inference: InferenceConfig,
    pub energy: EnergyConfig,
    pub flow: FlowConfig,
    pub slots: SlotsConfig,
    pub symbols: SymbolsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

impl StorageBackend {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory holding `ledger.db`. Supports `${VAR}` expansion.
    pub data_dir: Option<String>,
    /// Event log file. Supports `${VAR}` expansion.
    pub event_log: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceConfig {
    pub learning_rate: f64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            learning_rate: DEFAULT_LEARNING_RATE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnergyConfig {
    pub lambda_weight: f64,
}

impl Default for EnergyConfig {
    fn default() -> Self {
        Self {
            lambda_weight: DEFAULT_LAMBDA_WEIGHT,
        }
    }
}

/// What `anchor` does with an edge the flow rule forbids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPolicy {
    /// Legalize the edge through the centroid and report it.
    #[default]
    AutoRoute,
    /// Fail the anchor before anything is written.
    Reject,
}

impl FlowPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AutoRoute => "auto_route",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlowConfig {
    pub policy: FlowPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotsConfig {
    pub default_lawfulness: u8,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        Self {
            default_lawfulness: DEFAULT_LAWFULNESS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SymbolsConfig {
    pub capacity: usize,
}

impl Default for SymbolsConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SYMBOL_CAPACITY,
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl LedgerConfig {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No ledger config; using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| {
            tracing::warn!("Failed to read config at {:?}: {}", path, source);
            ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, source);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// A config for an ephemeral ledger: memory store and memory event log.
    #[must_use]
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.storage.backend = StorageBackend::Memory;
        config
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let lr = self.inference.learning_rate;
        if !lr.is_finite() || lr <= 0.0 {
            return Err(ConfigError::invalid(
                "inference.learning_rate",
                format!("must be a finite number > 0 (got {lr})"),
            ));
        }
        let lambda = self.energy.lambda_weight;
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(ConfigError::invalid(
                "energy.lambda_weight",
                format!("must be a finite number >= 0 (got {lambda})"),
            ));
        }
        if self.slots.default_lawfulness > 3 {
            return Err(ConfigError::invalid(
                "slots.default_lawfulness",
                format!("must be between 0 and 3 (got {})", self.slots.default_lawfulness),
            ));
        }
        let capacity = self.symbols.capacity;
        if capacity == 0 || capacity > MAX_SYMBOL_CAPACITY {
            return Err(ConfigError::invalid(
                "symbols.capacity",
                format!("must be between 1 and {MAX_SYMBOL_CAPACITY} (got {capacity})"),
            ));
        }
        Ok(())
    }

    /// Resolved data directory: configured value (env-expanded) or
    /// `~/.dualsub/data`.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = non_blank(self.storage.data_dir.as_deref()) {
            return Ok(PathBuf::from(expand_env_vars(dir)));
        }
        dirs::home_dir()
            .map(|home| home.join(".dualsub").join("data"))
            .ok_or_else(|| {
                ConfigError::invalid("storage.data_dir", "home directory could not be determined")
            })
    }

    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.data_dir()?.join(DATABASE_FILE))
    }

    /// Resolved event log file, honoring `DUALSUB_EVENT_LOG`.
    ///
    /// `None` means the log lives in memory (memory backend with no explicit
    /// location).
    pub fn event_log_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        let env_override = env::var(EVENT_LOG_ENV).ok();
        self.resolve_event_log(env_override.as_deref())
    }

    fn resolve_event_log(&self, env_override: Option<&str>) -> Result<Option<PathBuf>, ConfigError> {
        if let Some(path) = non_blank(env_override) {
            return Ok(Some(PathBuf::from(path)));
        }
        if let Some(path) = non_blank(self.storage.event_log.as_deref()) {
            return Ok(Some(PathBuf::from(expand_env_vars(path))));
        }
        match self.storage.backend {
            StorageBackend::Sqlite => Ok(Some(self.data_dir()?.join(EVENT_LOG_FILE))),
            StorageBackend::Memory => Ok(None),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Replace `${VAR}` with the variable's value (empty when unset).
///
/// Unclosed `${` and `${}` are copied through unchanged.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        match after.find('}') {
            Some(0) => {
                out.push_str("${}");
                rest = &after[1..];
            }
            Some(close) => {
                out.push_str(&env::var(&after[..close]).unwrap_or_default());
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".dualsub").join("config.toml"))
}

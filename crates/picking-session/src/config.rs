//! # Picking Configuration
//!
//! Configuration for the picking station.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     PICKING_STORAGE=memory                                             │
//! │     PICKING_FUZZY_MATCHING=false                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/picking-station/picking.toml (Linux)                     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     SQLite storage, fuzzy matching on, history of 50                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # picking.toml
//! [storage]
//! backend = "sqlite"   # sqlite | memory
//! database_path = "/var/lib/picking/picking.db"
//!
//! [matching]
//! fuzzy_enabled = true
//! min_common_run = 12
//!
//! [history]
//! limit = 50
//!
//! [adjustment]
//! allow_negative_total = false
//! allow_reopen = true
//!
//! [units]
//! atomic_unit = "UN"
//!
//! [settlement]
//! endpoint = "https://erp.example.com/webhook/picking-process"
//! timeout_secs = 10
//! batch_size = 20
//! retention_days = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use picking_core::barcode::MatchOptions;
use picking_core::{ATOMIC_UNIT, HISTORY_LIMIT, MIN_COMMON_RUN};

use crate::error::{ConfigError, ConfigResult};
use crate::manager::{AdjustmentPolicy, SessionOptions};

/// Config file name inside the platform config directory.
pub const CONFIG_FILE_NAME: &str = "picking.toml";

/// Database file name inside the platform data directory.
pub const DATABASE_FILE_NAME: &str = "picking.db";

// =============================================================================
// Storage Backend
// =============================================================================

/// Where checkpoints are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// SQLite file, survives restarts.
    #[default]
    Sqlite,

    /// Process memory only. Nothing survives a restart.
    Memory,
}

impl StorageBackend {
    /// Returns true if checkpoints survive a process restart.
    pub fn is_durable(&self) -> bool {
        matches!(self, StorageBackend::Sqlite)
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Sqlite => write!(f, "sqlite"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" | "file" => Ok(StorageBackend::Sqlite),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            other => Err(ConfigError::Invalid(format!(
                "Unknown storage backend: '{}'. Valid options: sqlite, memory",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Checkpoint storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

/// Barcode matcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingSettings {
    /// Run the containment, core-13 and common-run stages.
    #[serde(default = "default_true")]
    pub fuzzy_enabled: bool,

    /// Minimum shared digit run for the common-run stage.
    #[serde(default = "default_min_common_run")]
    pub min_common_run: usize,
}

fn default_true() -> bool {
    true
}

fn default_min_common_run() -> usize {
    MIN_COMMON_RUN
}

impl Default for MatchingSettings {
    fn default() -> Self {
        MatchingSettings {
            fuzzy_enabled: true,
            min_common_run: default_min_common_run(),
        }
    }
}

impl From<&MatchingSettings> for MatchOptions {
    fn from(settings: &MatchingSettings) -> Self {
        MatchOptions {
            fuzzy_enabled: settings.fuzzy_enabled,
            min_common_run: settings.min_common_run,
        }
    }
}

/// History settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistorySettings {
    /// Finalized records kept, newest first.
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    HISTORY_LIMIT
}

impl Default for HistorySettings {
    fn default() -> Self {
        HistorySettings {
            limit: default_history_limit(),
        }
    }
}

/// Unit-of-measure settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitsSettings {
    /// Unit code whose items need a units-per-container count.
    #[serde(default = "default_atomic_unit")]
    pub atomic_unit: String,
}

fn default_atomic_unit() -> String {
    ATOMIC_UNIT.to_string()
}

impl Default for UnitsSettings {
    fn default() -> Self {
        UnitsSettings {
            atomic_unit: default_atomic_unit(),
        }
    }
}

/// Settlement forwarding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementSettings {
    /// Source-system URL finalized pickings are posted to. Without one,
    /// settlements stay queued in the outbox.
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Entries sent per drain.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Days a delivered entry is kept before pruning.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_batch_size() -> u32 {
    20
}

fn default_retention_days() -> u32 {
    30
}

impl Default for SettlementSettings {
    fn default() -> Self {
        SettlementSettings {
            endpoint: None,
            timeout_secs: default_timeout_secs(),
            batch_size: default_batch_size(),
            retention_days: default_retention_days(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete picking station configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PickingConfig {
    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub matching: MatchingSettings,

    #[serde(default)]
    pub history: HistorySettings,

    #[serde(default)]
    pub adjustment: AdjustmentPolicy,

    #[serde(default)]
    pub units: UnitsSettings,

    #[serde(default)]
    pub settlement: SettlementSettings,
}

impl PickingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (picking.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading picking config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load picking config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Picking config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.history.limit == 0 || self.history.limit > HISTORY_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "history.limit must be between 1 and {}, got {}",
                HISTORY_LIMIT, self.history.limit
            )));
        }

        // Shorter runs would let unrelated 8-digit codes collide
        if self.matching.min_common_run < 8 {
            return Err(ConfigError::Invalid(format!(
                "matching.min_common_run must be at least 8, got {}",
                self.matching.min_common_run
            )));
        }

        if self.units.atomic_unit.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "units.atomic_unit must not be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.settlement.endpoint {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "settlement.endpoint must be an http(s) URL, got '{}'",
                    endpoint
                )));
            }
        }

        if self.settlement.batch_size == 0 || self.settlement.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "settlement.batch_size and settlement.timeout_secs must be greater than 0".into(),
            ));
        }

        if let Some(ref path) = self.storage.database_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.database_path must not be empty".into(),
                ));
            }
        }

        Ok(())
    }

    /// Applies `PICKING_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Applies overrides read through `lookup`.
    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("PICKING_STORAGE") {
            match backend.parse() {
                Ok(parsed) => {
                    debug!(backend = %backend, "Overriding storage backend from environment");
                    self.storage.backend = parsed;
                }
                Err(e) => warn!(error = %e, "Ignoring PICKING_STORAGE"),
            }
        }

        if let Some(path) = lookup("PICKING_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(fuzzy) = lookup("PICKING_FUZZY_MATCHING") {
            match parse_flag(&fuzzy) {
                Some(flag) => self.matching.fuzzy_enabled = flag,
                None => warn!(value = %fuzzy, "Ignoring PICKING_FUZZY_MATCHING"),
            }
        }

        if let Some(run) = lookup("PICKING_MIN_COMMON_RUN") {
            if let Ok(n) = run.parse::<usize>() {
                self.matching.min_common_run = n;
            }
        }

        if let Some(limit) = lookup("PICKING_HISTORY_LIMIT") {
            if let Ok(n) = limit.parse::<usize>() {
                self.history.limit = n;
            }
        }

        if let Some(flag) = lookup("PICKING_ALLOW_NEGATIVE_TOTAL").as_deref().and_then(parse_flag) {
            self.adjustment.allow_negative_total = flag;
        }

        if let Some(flag) = lookup("PICKING_ALLOW_REOPEN").as_deref().and_then(parse_flag) {
            self.adjustment.allow_reopen = flag;
        }

        if let Some(unit) = lookup("PICKING_ATOMIC_UNIT") {
            self.units.atomic_unit = unit;
        }

        if let Some(url) = lookup("PICKING_SETTLEMENT_URL") {
            debug!(url = %url, "Overriding settlement endpoint from environment");
            self.settlement.endpoint = Some(url).filter(|u| !u.trim().is_empty());
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "picking", "station")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Returns the default SQLite file path.
    pub fn default_database_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "picking", "station")
            .map(|dirs| dirs.data_dir().join(DATABASE_FILE_NAME))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Configured database path, or the platform default.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.storage
            .database_path
            .clone()
            .or_else(Self::default_database_path)
    }

    /// Options the [`PickingManager`](crate::PickingManager) runs with.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            matching: MatchOptions::from(&self.matching),
            adjustment: self.adjustment,
            atomic_unit: self.units.atomic_unit.trim().to_string(),
            history_limit: self.history.limit,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

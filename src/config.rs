use anyhow::{anyhow, Result};
use editvault_cache::{CleanupPolicy, FuzzyMode};
use editvault_queue::QueueConfig as WorkerQueueConfig;
use editvault_snapshot::RetentionLimits;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::cli::args::Args;

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct EditvaultConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub snapshots: SnapshotConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub assistant: AssistantConfig,
}

/// Where the durable store lives
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct StorageConfig {
    /// Root directory of the store (one subdirectory per collection)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Skip the disk entirely and keep everything in memory
    #[serde(default)]
    pub memory_only: bool,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".editvault")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            memory_only: false,
        }
    }
}

/// Snapshot retention and the workspace snapshots are taken from
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SnapshotConfig {
    /// Cap on non-milestone snapshots
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,

    /// Cap on non-milestone auto-saves
    #[serde(default = "default_max_auto_saves")]
    pub max_auto_saves: usize,

    /// Directory captured by `snapshot save` and written by `snapshot restore`
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,

    /// Workspace-relative path of the primary file
    pub main_file: Option<String>,
}

fn default_max_snapshots() -> usize {
    50
}

fn default_max_auto_saves() -> usize {
    10
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            max_snapshots: default_max_snapshots(),
            max_auto_saves: default_max_auto_saves(),
            workspace_dir: default_workspace_dir(),
            main_file: None,
        }
    }
}

impl SnapshotConfig {
    pub fn to_retention_limits(&self) -> RetentionLimits {
        RetentionLimits::new(self.max_snapshots, self.max_auto_saves)
    }
}

/// Response cache configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CacheConfig {
    /// Enable cache
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Entries held in the memory tier
    #[serde(default = "default_max_memory_entries")]
    pub max_memory_entries: usize,

    /// Most-hit persistent entries loaded into memory at startup
    #[serde(default = "default_warm_start_entries")]
    pub warm_start_entries: usize,

    /// "disabled", "same_context" or "same_intent"
    #[serde(default)]
    pub fuzzy_mode: FuzzyMode,

    /// Cleanup configuration
    #[serde(default)]
    pub cleanup: CacheCleanupConfig,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_max_memory_entries() -> usize {
    100
}

fn default_warm_start_entries() -> usize {
    50
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_memory_entries: default_max_memory_entries(),
            warm_start_entries: default_warm_start_entries(),
            fuzzy_mode: FuzzyMode::default(),
            cleanup: CacheCleanupConfig::default(),
        }
    }
}

/// Cache cleanup configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CacheCleanupConfig {
    /// Maximum age in days
    #[serde(default = "default_max_age_days")]
    pub max_age_days: usize,

    /// Maximum idle days
    #[serde(default = "default_max_idle_days")]
    pub max_idle_days: usize,

    /// Remove version mismatch entries
    #[serde(default = "default_remove_version_mismatch")]
    pub remove_version_mismatch: bool,

    /// Keep at most this many persistent entries
    pub max_entries: Option<usize>,
}

fn default_max_age_days() -> usize {
    90
}

fn default_max_idle_days() -> usize {
    30
}

fn default_remove_version_mismatch() -> bool {
    true
}

impl Default for CacheCleanupConfig {
    fn default() -> Self {
        Self {
            max_age_days: default_max_age_days(),
            max_idle_days: default_max_idle_days(),
            remove_version_mismatch: default_remove_version_mismatch(),
            max_entries: None,
        }
    }
}

impl CacheConfig {
    /// Convert to editvault-cache types
    pub fn to_cache_config(&self) -> editvault_cache::CacheConfig {
        editvault_cache::CacheConfig {
            enabled: self.enabled,
            max_memory_entries: self.max_memory_entries,
            warm_start_entries: self.warm_start_entries,
            fuzzy_mode: self.fuzzy_mode,
        }
    }

    pub fn to_cleanup_policy(&self) -> CleanupPolicy {
        CleanupPolicy {
            max_age_days: self.cleanup.max_age_days,
            max_idle_days: self.cleanup.max_idle_days,
            remove_version_mismatch: self.cleanup.remove_version_mismatch,
            max_entries: self.cleanup.max_entries,
        }
    }
}

/// Offline queue configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Concurrent sends during a replay pass
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Eviction records kept for `queue lost`
    #[serde(default = "default_max_evictions")]
    pub max_evictions: usize,
}

fn default_max_queue_size() -> usize {
    50
}

fn default_max_in_flight() -> usize {
    4
}

fn default_max_evictions() -> usize {
    100
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            max_in_flight: default_max_in_flight(),
            max_evictions: default_max_evictions(),
        }
    }
}

impl QueueConfig {
    pub fn to_queue_config(&self) -> WorkerQueueConfig {
        WorkerQueueConfig {
            max_queue_size: self.max_queue_size,
            max_in_flight: self.max_in_flight,
            max_evictions: self.max_evictions,
        }
    }
}

/// Upstream assistant configuration
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct AssistantConfig {
    /// Chat endpoint; an empty value selects the fallback assistant
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model name forwarded with each request
    pub model: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Answer from the built-in mock instead of the network
    #[serde(default)]
    pub mock: bool,
}

fn default_endpoint() -> String {
    "http://localhost:8080/api/chat".to_string()
}

fn default_api_key_env() -> String {
    "EDITVAULT_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            model: None,
            timeout_secs: default_timeout_secs(),
            mock: false,
        }
    }
}

impl AssistantConfig {
    /// Bearer token read from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl EditvaultConfig {
    /// Merge another config into this one (other takes precedence for set values)
    pub fn merge(&mut self, other: &EditvaultConfig) {
        // Storage
        if other.storage.data_dir != default_data_dir() {
            self.storage.data_dir = other.storage.data_dir.clone();
        }
        if other.storage.memory_only {
            self.storage.memory_only = true;
        }

        // Snapshots
        if other.snapshots.max_snapshots != default_max_snapshots() {
            self.snapshots.max_snapshots = other.snapshots.max_snapshots;
        }
        if other.snapshots.max_auto_saves != default_max_auto_saves() {
            self.snapshots.max_auto_saves = other.snapshots.max_auto_saves;
        }
        if other.snapshots.workspace_dir != default_workspace_dir() {
            self.snapshots.workspace_dir = other.snapshots.workspace_dir.clone();
        }
        if other.snapshots.main_file.is_some() {
            self.snapshots.main_file = other.snapshots.main_file.clone();
        }

        // Cache
        if !other.cache.enabled {
            self.cache.enabled = false;
        }
        if other.cache.max_memory_entries != default_max_memory_entries() {
            self.cache.max_memory_entries = other.cache.max_memory_entries;
        }
        if other.cache.warm_start_entries != default_warm_start_entries() {
            self.cache.warm_start_entries = other.cache.warm_start_entries;
        }
        if other.cache.fuzzy_mode != FuzzyMode::default() {
            self.cache.fuzzy_mode = other.cache.fuzzy_mode;
        }
        if other.cache.cleanup.max_age_days != default_max_age_days() {
            self.cache.cleanup.max_age_days = other.cache.cleanup.max_age_days;
        }
        if other.cache.cleanup.max_idle_days != default_max_idle_days() {
            self.cache.cleanup.max_idle_days = other.cache.cleanup.max_idle_days;
        }
        if !other.cache.cleanup.remove_version_mismatch {
            self.cache.cleanup.remove_version_mismatch = false;
        }
        if other.cache.cleanup.max_entries.is_some() {
            self.cache.cleanup.max_entries = other.cache.cleanup.max_entries;
        }

        // Queue
        if other.queue.max_queue_size != default_max_queue_size() {
            self.queue.max_queue_size = other.queue.max_queue_size;
        }
        if other.queue.max_in_flight != default_max_in_flight() {
            self.queue.max_in_flight = other.queue.max_in_flight;
        }
        if other.queue.max_evictions != default_max_evictions() {
            self.queue.max_evictions = other.queue.max_evictions;
        }

        // Assistant
        if other.assistant.endpoint != default_endpoint() {
            self.assistant.endpoint = other.assistant.endpoint.clone();
        }
        if other.assistant.api_key_env != default_api_key_env() {
            self.assistant.api_key_env = other.assistant.api_key_env.clone();
        }
        if other.assistant.model.is_some() {
            self.assistant.model = other.assistant.model.clone();
        }
        if other.assistant.timeout_secs != default_timeout_secs() {
            self.assistant.timeout_secs = other.assistant.timeout_secs;
        }
        if other.assistant.mock {
            self.assistant.mock = true;
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Invalid range in {field}: {value} (valid range: {valid_range})")]
    InvalidRange {
        field: String,
        value: u64,
        valid_range: String,
    },

    #[error("Inconsistent settings: {0}")]
    Inconsistent(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl EditvaultConfig {
    pub fn generate_default_config() -> String {
        let default_config = Self::default();
        toml::to_string_pretty(&default_config).unwrap_or_else(|_| {
            r#"# editvault configuration file

[storage]
data_dir = ".editvault"
memory_only = false

[snapshots]
max_snapshots = 50
max_auto_saves = 10
workspace_dir = "."
# main_file = "src/main.rs"

[cache]
enabled = true
max_memory_entries = 100
warm_start_entries = 50
fuzzy_mode = "same_context"

[cache.cleanup]
max_age_days = 90
max_idle_days = 30
remove_version_mismatch = true
# max_entries = 1000

[queue]
max_queue_size = 50
max_in_flight = 4
max_evictions = 100

[assistant]
endpoint = "http://localhost:8080/api/chat"
api_key_env = "EDITVAULT_API_KEY"
# model = "default"
timeout_secs = 60
mock = false
"#
            .to_string()
        })
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: EditvaultConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the user config file path (~/.config/editvault/config.toml)
    pub fn get_user_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/editvault/config.toml"))
    }

    /// Get the current directory config file path (./editvault.toml)
    pub fn get_current_config_path() -> PathBuf {
        PathBuf::from("./editvault.toml")
    }

    /// Load and merge configs from all sources with priority:
    /// 1. User config (~/.config/editvault/config.toml) - lowest priority (base)
    /// 2. Current directory (./editvault.toml)
    pub fn load_with_merged_configs() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(user_path) = Self::get_user_config_path() {
            if user_path.exists() {
                match Self::load_from_file(&user_path) {
                    Ok(user_config) => {
                        config.merge(&user_config);
                        tracing::debug!("Loaded user config from: {}", user_path.display());
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable config {}: {}", user_path.display(), e)
                    }
                }
            }
        }

        let current_path = Self::get_current_config_path();
        if current_path.exists() {
            match Self::load_from_file(&current_path) {
                Ok(current_config) => {
                    config.merge(&current_config);
                    tracing::debug!(
                        "Loaded current directory config from: {}",
                        current_path.display()
                    );
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable config {}: {}", current_path.display(), e)
                }
            }
        }

        Ok(config)
    }

    pub fn apply_env_vars(&mut self, env_vars: &HashMap<String, String>) -> Result<()> {
        for (key, value) in env_vars {
            if let Some(config_key) = key.strip_prefix("EDITVAULT_") {
                match config_key {
                    "DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
                    "MEMORY_ONLY" => {
                        self.storage.memory_only = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid memory_only value: {}", value))?;
                    }
                    "SNAPSHOTS_MAX" => {
                        self.snapshots.max_snapshots = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid max_snapshots value: {}", value))?;
                    }
                    "SNAPSHOTS_MAX_AUTO_SAVES" => {
                        self.snapshots.max_auto_saves = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid max_auto_saves value: {}", value))?;
                    }
                    "WORKSPACE_DIR" => self.snapshots.workspace_dir = PathBuf::from(value),
                    "CACHE_ENABLED" => {
                        self.cache.enabled = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid cache enabled value: {}", value))?;
                    }
                    "CACHE_MAX_MEMORY_ENTRIES" => {
                        self.cache.max_memory_entries = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid max_memory_entries value: {}", value))?;
                    }
                    "CACHE_FUZZY_MODE" => {
                        self.cache.fuzzy_mode = value.parse().map_err(|e: String| anyhow!(e))?;
                    }
                    "QUEUE_MAX_SIZE" => {
                        self.queue.max_queue_size = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid max_queue_size value: {}", value))?;
                    }
                    "QUEUE_MAX_IN_FLIGHT" => {
                        self.queue.max_in_flight = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid max_in_flight value: {}", value))?;
                    }
                    "ASSISTANT_ENDPOINT" => self.assistant.endpoint = value.clone(),
                    "ASSISTANT_MODEL" => self.assistant.model = Some(value.clone()),
                    "ASSISTANT_TIMEOUT_SECS" => {
                        self.assistant.timeout_secs = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid timeout_secs value: {}", value))?;
                    }
                    "ASSISTANT_MOCK" => {
                        self.assistant.mock = value
                            .parse()
                            .map_err(|_| anyhow!("Invalid mock value: {}", value))?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    pub fn apply_args(&mut self, args: &Args) -> Result<()> {
        if let Some(data_dir) = &args.data_dir {
            self.storage.data_dir = data_dir.clone();
        }
        if args.memory {
            self.storage.memory_only = true;
        }
        if let Some(workspace) = &args.workspace {
            self.snapshots.workspace_dir = workspace.clone();
        }
        if let Some(main) = &args.main_file {
            self.snapshots.main_file = Some(main.clone());
        }
        if args.mock {
            self.assistant.mock = true;
        }
        if args.no_cache {
            self.cache.enabled = false;
        }
        Ok(())
    }

    /// Load configuration with full precedence chain:
    /// 1. Default values (lowest)
    /// 2. User config (~/.config/editvault/config.toml)
    /// 3. Current directory (./editvault.toml)
    /// 4. Explicit `--config` file
    /// 5. Environment variables (EDITVAULT_*)
    /// 6. CLI arguments (highest)
    pub fn load_with_precedence(
        config_path: Option<PathBuf>,
        cli_args: &Args,
        env_vars: &HashMap<String, String>,
    ) -> Result<Self> {
        let mut config = Self::load_with_merged_configs().unwrap_or_else(|_| Self::default());

        if let Some(path) = config_path {
            let explicit_config = Self::load_from_file(&path)
                .map_err(|e| anyhow!("Failed to load config file {}: {}", path.display(), e))?;
            config.merge(&explicit_config);
        }

        config.apply_env_vars(env_vars)?;
        config.apply_args(cli_args)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacities = [
            ("snapshots.max_snapshots", self.snapshots.max_snapshots),
            ("snapshots.max_auto_saves", self.snapshots.max_auto_saves),
            ("cache.max_memory_entries", self.cache.max_memory_entries),
            ("queue.max_queue_size", self.queue.max_queue_size),
            ("queue.max_in_flight", self.queue.max_in_flight),
        ];
        for (field, value) in capacities {
            if value == 0 {
                return Err(ConfigError::InvalidRange {
                    field: field.to_string(),
                    value: 0,
                    valid_range: "1 or more".to_string(),
                });
            }
        }

        if self.snapshots.max_auto_saves > self.snapshots.max_snapshots {
            return Err(ConfigError::Inconsistent(format!(
                "snapshots.max_auto_saves ({}) exceeds snapshots.max_snapshots ({})",
                self.snapshots.max_auto_saves, self.snapshots.max_snapshots
            )));
        }

        if self.cache.warm_start_entries > self.cache.max_memory_entries {
            return Err(ConfigError::Inconsistent(format!(
                "cache.warm_start_entries ({}) exceeds cache.max_memory_entries ({})",
                self.cache.warm_start_entries, self.cache.max_memory_entries
            )));
        }

        if self.assistant.timeout_secs == 0 || self.assistant.timeout_secs > 3600 {
            return Err(ConfigError::InvalidRange {
                field: "assistant.timeout_secs".to_string(),
                value: self.assistant.timeout_secs,
                valid_range: "1-3600".to_string(),
            });
        }

        Ok(())
    }
}

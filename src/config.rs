//! Application configuration.
//!
//! Loaded from YAML files and `LOYALTY__*` environment variables.

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "loyalty.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LOYALTY_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LOYALTY";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LOYALTY_LOG";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ledger: LedgerSettings,
    pub retry: RetryConfig,
    pub session: SessionConfig,
    /// Members and rewards loaded into the in-memory store at startup.
    pub seed: SeedConfig,
}

/// Policy knobs for the ledger commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LedgerSettings {
    /// Points awarded per scan when the operator does not give an amount.
    pub award_points: u32,
    /// Largest amount accepted by a single award.
    pub max_award_points: u32,
    /// How many times a commit is retried after the balance changed underneath it.
    pub max_conflict_retries: u32,
    /// Page size used when streaming history or rewards.
    pub page_size: usize,
    /// Upper bound for a caller-provided page limit.
    pub max_page_size: usize,
    /// Prefix of QR payloads carrying a member code, as in `BB:1234`.
    pub scan_scheme: String,
    /// Number of members listed in analytics.
    pub top_members: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            award_points: 10,
            max_award_points: 1000,
            max_conflict_retries: 5,
            page_size: 50,
            max_page_size: 500,
            scan_scheme: "BB".to_string(),
            top_members: 5,
        }
    }
}

/// Backoff for calls failing with a retryable error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_times: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 50,
            max_delay_ms: 2000,
            max_times: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Operator signed in at the desk. Without one, every command is rejected.
    pub operator: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    pub members: Vec<SeedMember>,
    pub rewards: Vec<SeedReward>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedMember {
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedReward {
    pub name: String,
    pub cost: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `loyalty.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ::config::ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Lifetime of a cached decision in milliseconds
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Soft capacity; overflow triggers a prune of expired entries
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Evict oldest live entries when pruning alone cannot restore capacity
    #[serde(default)]
    pub strict_capacity: bool,
}

fn default_ttl_ms() -> u64 {
    60_000
}

fn default_max_entries() -> usize {
    200
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            max_entries: default_max_entries(),
            strict_capacity: false,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum outstanding external calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// How long a cache miss may wait for a slot (0 = fail fast)
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
    /// Coalesce concurrent misses on the same fingerprint into one call
    #[serde(default)]
    pub single_flight: bool,
}

fn default_max_concurrent() -> usize {
    5
}

fn default_acquire_timeout_ms() -> u64 {
    2_000
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
            single_flight: false,
        }
    }
}

impl AdmissionConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Chat-completions compatible endpoint root
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Bearer credential (also read from TACTICIAN_API_KEY)
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Models the oracle may be pointed at; empty allows any
    #[serde(default, deserialize_with = "string_or_list")]
    pub allowed_models: Vec<String>,
    /// Upper bound on a single external call
    #[serde(default = "default_oracle_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_oracle_timeout_secs() -> u64 {
    20
}

fn default_temperature() -> f32 {
    0.4
}

fn default_max_tokens() -> u32 {
    200
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            allowed_models: Vec::new(),
            timeout_secs: default_oracle_timeout_secs(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl OracleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    pub fn is_model_allowed(&self, model: &str) -> bool {
        self.allowed_models.is_empty() || self.allowed_models.iter().any(|m| m == model)
    }
}

/// Accepts either a TOML/JSON list or a comma-separated string (env vars)
fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrList {
        One(String),
        Many(Vec<String>),
    }

    Ok(match StringOrList::deserialize(deserializer)? {
        StringOrList::One(s) if s.trim().is_empty() => Vec::new(),
        StringOrList::One(s) => s.split(',').map(|m| m.trim().to_string()).collect(),
        StringOrList::Many(v) => v.into_iter().map(|m| m.trim().to_string()).collect(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsConfig {
    /// Liveness window for agent heartbeats
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

fn default_heartbeat_timeout_secs() -> u64 {
    45
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorldConfig {
    #[serde(default = "default_world_dim")]
    pub width: u32,
    #[serde(default = "default_world_dim")]
    pub height: u32,
    /// Maximum simultaneously simulated agents
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
}

fn default_world_dim() -> u32 {
    100
}

fn default_max_agents() -> usize {
    50
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            width: default_world_dim(),
            height: default_world_dim(),
            max_agents: default_max_agents(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            admission: AdmissionConfig::default(),
            oracle: OracleConfig::default(),
            agents: AgentsConfig::default(),
            world: WorldConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("TACTICIAN_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (TACTICIAN__CACHE__TTL_MS, etc.)
            .add_source(
                Environment::with_prefix("TACTICIAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("oracle.api_key", std::env::var("TACTICIAN_API_KEY").ok())?;

        builder.build()?.try_deserialize()
    }

    /// Load and validate; any problem is a configuration error
    pub fn load_validated<P: AsRef<Path>>(config_dir: P) -> crate::error::Result<Self> {
        let config = Self::load_from(config_dir)?;
        config
            .validate()
            .map_err(|errors| crate::error::TacticianError::Configuration(errors.join("; ")))?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        // Cache bounds
        if self.cache.ttl_ms == 0 {
            errors.push("cache.ttl_ms must be positive".to_string());
        }
        if self.cache.max_entries == 0 {
            errors.push("cache.max_entries must be positive".to_string());
        }

        // Admission bounds
        if self.admission.max_concurrent == 0 {
            errors.push("admission.max_concurrent must be positive".to_string());
        }
        if self.admission.max_concurrent > Semaphore::MAX_PERMITS {
            errors.push(format!(
                "admission.max_concurrent must be at most {}",
                Semaphore::MAX_PERMITS
            ));
        }

        // Oracle
        if self.oracle.timeout_secs == 0 {
            errors.push("oracle.timeout_secs must be positive".to_string());
        }
        if !self.oracle.base_url.starts_with("http://")
            && !self.oracle.base_url.starts_with("https://")
        {
            errors.push(format!(
                "oracle.base_url must be an http(s) URL, got '{}'",
                self.oracle.base_url
            ));
        }
        if self.oracle.model.trim().is_empty() {
            errors.push("oracle.model must not be empty".to_string());
        }
        for model in &self.oracle.allowed_models {
            if model.is_empty() || model.chars().any(char::is_whitespace) {
                errors.push(format!("oracle.allowed_models has malformed entry '{model}'"));
            }
        }
        if !self.oracle.is_model_allowed(&self.oracle.model) {
            errors.push(format!(
                "oracle.model '{}' is not in oracle.allowed_models",
                self.oracle.model
            ));
        }

        // Collaborator bounds
        if self.agents.heartbeat_timeout_secs == 0 {
            errors.push("agents.heartbeat_timeout_secs must be positive".to_string());
        }
        if self.world.width == 0 || self.world.height == 0 {
            errors.push("world dimensions must be positive".to_string());
        }
        if self.world.max_agents == 0 {
            errors.push("world.max_agents must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
        assert_eq!(config.cache.max_entries, 200);
        assert_eq!(config.admission.max_concurrent, 5);
        assert_eq!(config.agents.heartbeat_timeout_secs, 45);
        assert!(!config.cache.strict_capacity);
        assert!(!config.admission.single_flight);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let mut config = AppConfig::default();
        config.cache.ttl_ms = 0;
        config.admission.max_concurrent = 0;
        config.world.max_agents = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_max_concurrent_upper_bound() {
        let mut config = AppConfig::default();
        config.admission.max_concurrent = Semaphore::MAX_PERMITS + 1;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("admission.max_concurrent must be at most"));

        config.admission.max_concurrent = Semaphore::MAX_PERMITS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_model_must_be_in_allow_list() {
        let mut config = AppConfig::default();
        config.oracle.allowed_models = vec!["claude-haiku".to_string()];
        let errors = config.validate().unwrap_err();
        assert!(errors[0].contains("not in oracle.allowed_models"));

        config.oracle.model = "claude-haiku".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_malformed_allow_list_rejected() {
        let mut config = AppConfig::default();
        config.oracle.allowed_models = vec!["gpt-4o-mini".to_string(), "bad model".to_string()];
        let errors = config.validate().unwrap_err();
        assert!(errors.iter().any(|e| e.contains("malformed entry 'bad model'")));
    }

    #[test]
    fn test_allowed_models_accepts_comma_separated_string() {
        let oracle: OracleConfig =
            serde_json::from_str(r#"{"allowed_models": "gpt-4o-mini, claude-haiku"}"#).unwrap();
        assert_eq!(oracle.allowed_models, vec!["gpt-4o-mini", "claude-haiku"]);

        let oracle: OracleConfig =
            serde_json::from_str(r#"{"allowed_models": ["a", "b"]}"#).unwrap();
        assert_eq!(oracle.allowed_models, vec!["a", "b"]);

        let oracle: OracleConfig = serde_json::from_str(r#"{"allowed_models": ""}"#).unwrap();
        assert!(oracle.allowed_models.is_empty());
    }

    #[test]
    fn test_load_from_missing_dir_uses_defaults() {
        let config = AppConfig::load_from("does/not/exist").unwrap();
        assert_eq!(config.cache.ttl_ms, 60_000);
        assert_eq!(config.world.width, 100);
    }
}

//! Application configuration.
//!
//! Loaded from a `.env` file (if present) and the process environment using
//! the `IDEA_FORGE` prefix. Nested values use double underscores:
//!
//! ```text
//! IDEA_FORGE__SERVER__PORT=8080
//! IDEA_FORGE__LLM__ANTHROPIC_API_KEY=sk-ant-...
//! IDEA_FORGE__PIPELINE__BUDGET_LIMIT=0.5
//! IDEA_FORGE__BUDGET__DAILY_ALERT=5
//! ```
//!
//! A bare `ANTHROPIC_API_KEY` is accepted when the prefixed key is absent.
//! Every field has a default, so an empty environment yields a usable config
//! with no credentials.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use nodes::{Backoff, BudgetThresholds, CacheConfig, DEFAULT_ANALYSIS_MODEL, DEFAULT_DESIGN_MODEL};
use pipeline::{Constraints, CostBudget, ModelName, QualityScore};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use thiserror::Error;

const ENV_PREFIX: &str = "IDEA_FORGE";
const FALLBACK_API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration loading failed: {0}")]
    Load(#[from] config::ConfigError),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Values that parsed but make no sense.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("invalid host address '{0}'")]
    InvalidHost(String),

    #[error("port must be non-zero")]
    InvalidPort,

    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("quality threshold must be within 0..=1, got {0}")]
    QualityOutOfRange(f64),

    #[error("backoff cap ({cap_ms}ms) is below its base ({base_ms}ms)")]
    BackoffInverted { base_ms: u64, cap_ms: u64 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub cache: CacheSettings,
    pub budget: BudgetConfig,
    pub pipeline: PipelineSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub anthropic_api_key: Option<Secret<String>>,
    pub base_url: Option<String>,
    pub analysis_model: String,
    pub design_model: String,
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let backoff = Backoff::default();
        Self {
            anthropic_api_key: None,
            base_url: None,
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_owned(),
            design_model: DEFAULT_DESIGN_MODEL.to_owned(),
            timeout_secs: 30,
            retries: 3,
            backoff_base_ms: duration_ms(backoff.base),
            backoff_cap_ms: duration_ms(backoff.cap),
        }
    }
}

impl LlmConfig {
    /// True when a non-blank API key is present.
    pub fn has_api_key(&self) -> bool {
        self.anthropic_api_key
            .as_ref()
            .is_some_and(|key| !key.expose_secret().trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            base: Duration::from_millis(self.backoff_base_ms),
            cap: Duration::from_millis(self.backoff_cap_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            ttl_secs: defaults.ttl.as_secs(),
            max_entries: defaults.max_entries,
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: Duration::from_secs(self.ttl_secs),
            max_entries: self.max_entries,
        }
    }
}

/// Spend alert thresholds in USD. Unset disables the alert.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    pub daily_alert: Option<f64>,
    pub monthly_alert: Option<f64>,
}

impl BudgetConfig {
    pub fn thresholds(&self) -> BudgetThresholds {
        BudgetThresholds {
            daily: self.daily_alert.and_then(CostBudget::new),
            monthly: self.monthly_alert.and_then(CostBudget::new),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub budget_limit: f64,
    pub quality_threshold: f64,
    pub quality_retries: u32,
    pub max_duration_secs: u64,
    pub stage_timeout_secs: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let defaults = Constraints::default();
        Self {
            budget_limit: defaults.max_cost.as_f64(),
            quality_threshold: defaults.quality_threshold.as_f64(),
            quality_retries: nodes::DEFAULT_QUALITY_RETRIES,
            max_duration_secs: defaults.max_duration.as_secs(),
            stage_timeout_secs: nodes::DEFAULT_STAGE_TIMEOUT.as_secs(),
        }
    }
}

impl PipelineSettings {
    /// Per-execution limits applied when a submission sets none.
    pub fn constraints(&self) -> Result<Constraints, ValidationError> {
        Ok(Constraints {
            max_cost: CostBudget::new(self.budget_limit)
                .ok_or(ValidationError::NotPositive("pipeline.budget_limit"))?,
            max_duration: Duration::from_secs(self.max_duration_secs),
            quality_threshold: QualityScore::new(self.quality_threshold)
                .ok_or(ValidationError::QualityOutOfRange(self.quality_threshold))?,
        })
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

impl AppConfig {
    /// Loads and validates configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config: AppConfig = config::Config::builder()
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        if !config.llm.has_api_key() {
            if let Ok(key) = std::env::var(FALLBACK_API_KEY_VAR) {
                config.llm.anthropic_api_key = Some(Secret::new(key));
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.bind_address()?;
        if self.server.port == 0 {
            return Err(ValidationError::InvalidPort);
        }

        if self.llm.analysis_model.trim().is_empty() {
            return Err(ValidationError::Empty("llm.analysis_model"));
        }
        if self.llm.design_model.trim().is_empty() {
            return Err(ValidationError::Empty("llm.design_model"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(ValidationError::NotPositive("llm.timeout_secs"));
        }
        if self.llm.backoff_cap_ms < self.llm.backoff_base_ms {
            return Err(ValidationError::BackoffInverted {
                base_ms: self.llm.backoff_base_ms,
                cap_ms: self.llm.backoff_cap_ms,
            });
        }

        if self.cache.max_entries == 0 {
            return Err(ValidationError::NotPositive("cache.max_entries"));
        }

        for (name, value) in [
            ("budget.daily_alert", self.budget.daily_alert),
            ("budget.monthly_alert", self.budget.monthly_alert),
        ] {
            if value.is_some_and(|v| CostBudget::new(v).is_none()) {
                return Err(ValidationError::NotPositive(name));
            }
        }

        self.pipeline.constraints()?;
        if self.pipeline.max_duration_secs == 0 {
            return Err(ValidationError::NotPositive("pipeline.max_duration_secs"));
        }
        if self.pipeline.stage_timeout_secs == 0 {
            return Err(ValidationError::NotPositive("pipeline.stage_timeout_secs"));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ValidationError> {
        let ip: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ValidationError::InvalidHost(self.server.host.clone()))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Model names for the two agent tiers. Only call after `validate`.
    pub fn models(&self) -> Result<(ModelName, ModelName), ValidationError> {
        let analysis = ModelName::new(self.llm.analysis_model.trim())
            .ok_or(ValidationError::Empty("llm.analysis_model"))?;
        let design = ModelName::new(self.llm.design_model.trim())
            .ok_or(ValidationError::Empty("llm.design_model"))?;
        Ok((analysis, design))
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const VARS: &[&str] = &[
        "IDEA_FORGE__SERVER__PORT",
        "IDEA_FORGE__LLM__ANTHROPIC_API_KEY",
        "IDEA_FORGE__LLM__DESIGN_MODEL",
        "IDEA_FORGE__PIPELINE__BUDGET_LIMIT",
        "IDEA_FORGE__PIPELINE__QUALITY_THRESHOLD",
        "IDEA_FORGE__BUDGET__DAILY_ALERT",
        "ANTHROPIC_API_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_are_valid_without_credentials() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.llm.has_api_key());
        assert_eq!(config.bind_address().unwrap().port(), 8080);
        assert_eq!(config.pipeline.constraints().unwrap(), Constraints::default());
    }

    #[test]
    fn loads_nested_values_from_the_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("IDEA_FORGE__SERVER__PORT", "9090");
        env::set_var("IDEA_FORGE__LLM__ANTHROPIC_API_KEY", "sk-ant-test");
        env::set_var("IDEA_FORGE__LLM__DESIGN_MODEL", "claude-sonnet-test");
        env::set_var("IDEA_FORGE__PIPELINE__BUDGET_LIMIT", "0.25");
        env::set_var("IDEA_FORGE__BUDGET__DAILY_ALERT", "5");

        let config = AppConfig::load();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.server.port, 9090);
        assert!(config.llm.has_api_key());
        assert_eq!(config.llm.design_model, "claude-sonnet-test");
        assert_eq!(config.pipeline.budget_limit, 0.25);
        assert_eq!(config.budget.thresholds().daily.map(CostBudget::as_f64), Some(5.0));
        assert!(config.budget.thresholds().monthly.is_none());
    }

    #[test]
    fn falls_back_to_the_bare_anthropic_key() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("ANTHROPIC_API_KEY", "sk-ant-bare");

        let config = AppConfig::load();
        clear_env();
        let config = config.unwrap();

        assert_eq!(
            config.llm.anthropic_api_key.unwrap().expose_secret(),
            "sk-ant-bare"
        );
    }

    #[test]
    fn out_of_range_quality_threshold_fails_to_load() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("IDEA_FORGE__PIPELINE__QUALITY_THRESHOLD", "1.5");

        let result = AppConfig::load();
        clear_env();

        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::QualityOutOfRange(_)))
        ));
    }

    #[test]
    fn validation_rejects_nonsense() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));

        let mut config = AppConfig::default();
        config.server.host = "not a host".into();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidHost(_))));

        let mut config = AppConfig::default();
        config.pipeline.budget_limit = 0.0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::NotPositive("pipeline.budget_limit"))
        );

        let mut config = AppConfig::default();
        config.llm.backoff_base_ms = 5_000;
        config.llm.backoff_cap_ms = 100;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::BackoffInverted { .. })
        ));

        let mut config = AppConfig::default();
        config.budget.monthly_alert = Some(-1.0);
        assert_eq!(
            config.validate(),
            Err(ValidationError::NotPositive("budget.monthly_alert"))
        );

        let mut config = AppConfig::default();
        config.llm.analysis_model = "  ".into();
        assert_eq!(config.validate(), Err(ValidationError::Empty("llm.analysis_model")));
    }
}

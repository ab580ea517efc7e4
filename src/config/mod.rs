use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;

/// Environment variable that overrides the configured API key
pub const API_KEY_ENV: &str = "TRANSCRIPT_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Remote service settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Retry and backoff tuning
    #[serde(default)]
    pub retry: RetryConfig,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,
}

/// Which API target requests go to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiEnvironment {
    #[default]
    Production,
    Local,
}

impl std::fmt::Display for ApiEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiEnvironment::Production => write!(f, "production"),
            ApiEnvironment::Local => write!(f, "local"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Selected API target
    pub environment: ApiEnvironment,

    /// Base URL of the hosted service
    pub production_url: String,

    /// Base URL of a locally running service
    pub local_url: String,

    /// Key sent as `X-API-Key`
    pub api_key: Option<String>,

    /// Timeout for a single HTTP attempt
    pub request_timeout_secs: u64,

    /// Hard timeout for health checks
    pub health_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: ApiEnvironment::Production,
            production_url: "https://api.transcript-service.example.com".to_string(),
            local_url: "http://localhost:8000".to_string(),
            api_key: None,
            request_timeout_secs: 120,
            health_timeout_secs: 5,
        }
    }
}

impl ApiConfig {
    /// Base URL of the currently selected environment
    pub fn base_url(&self) -> &str {
        match self.environment {
            ApiEnvironment::Production => &self.production_url,
            ApiEnvironment::Local => &self.local_url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Backoff multiplier
    pub factor: u32,

    /// Extra submissions when the service answers with an empty transcript
    pub empty_result_retries: u32,

    /// Pause between empty-result resubmissions in milliseconds
    pub empty_result_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2000,
            factor: 2,
            empty_result_retries: 2,
            empty_result_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Session file location (defaults to the user data directory)
    pub session_file: Option<PathBuf>,

    /// Default output format
    pub default_output_format: String,

    /// Preferred transcript language
    pub default_language: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            session_file: None,
            default_output_format: "text".to_string(),
            default_language: None,
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        let mut config = if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            serde_yaml::from_str::<Config>(&content).context("Failed to parse config file")?
        } else {
            let config = Self::default();
            config.save().await?;
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;

        fs_err::write(&config_path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir().context("Could not determine config directory")?;

        Ok(config_dir.join("transcript-client").join("config.yaml"))
    }

    /// Resolve where the session (tokens and cached profile) is persisted
    pub fn session_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.app.session_file {
            return Ok(path.clone());
        }

        let data_dir = dirs::data_dir().context("Could not determine data directory")?;
        Ok(data_dir.join("transcript-client").join("session.json"))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api.api_key = Some(key.trim().to_string());
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, url) in [
            ("production_url", &self.api.production_url),
            ("local_url", &self.api.local_url),
        ] {
            if url.trim().is_empty() {
                anyhow::bail!("api.{} must be configured", name);
            }
            Url::parse(url).with_context(|| format!("api.{} is not a valid URL: {}", name, url))?;
        }

        if self.retry.factor == 0 {
            anyhow::bail!("retry.factor must be at least 1");
        }

        if self.api.health_timeout_secs == 0 {
            anyhow::bail!("api.health_timeout_secs must be at least 1");
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  Environment: {}", self.api.environment);
        println!("  API URL: {}", self.api.base_url());
        println!(
            "  API Key: {}",
            if self.api.api_key.is_some() { "configured" } else { "not set" }
        );
        println!(
            "  Retries: {} (base {} ms, x{})",
            self.retry.max_retries, self.retry.base_delay_ms, self.retry.factor
        );
        println!("  Default Format: {}", self.app.default_output_format);
        if let Some(lang) = &self.app.default_language {
            println!("  Default Language: {}", lang);
        }
    }
}

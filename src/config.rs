use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::env;
use tracing::{info, warn};

use crate::extractor::ExtractionMode;
use crate::llm_providers::LLMProviderType;

// Import logging macros
use crate::{log_system_event, log_validation};

pub const DEFAULT_LOG_LEVEL: &str = "info,flashcard_generator=debug";

/// Complete application configuration loaded from environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub export: ExportConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

/// Card store persistence
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Completion endpoint and extraction policy
#[derive(Debug, Clone, Deserialize)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub provider: LLMProviderType,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub extraction_mode: ExtractionMode,
}

/// Flashcard vendor the cards are exported to
#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub max_concurrency: usize,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

/// Logging system configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_enabled: bool,
    pub console_enabled: bool,
    pub log_directory: String,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> Result<Self> {
        log_system_event!(config, "Loading application configuration from environment variables");

        let config = Config {
            database: DatabaseConfig::from_env()?,
            llm: LLMConfig::from_env()?,
            export: ExportConfig::from_env()?,
            server: ServerConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        };

        log_system_event!(config, "Configuration loaded successfully");
        config.log_configuration_summary();

        Ok(config)
    }

    /// Log a summary of loaded configuration (without sensitive data)
    fn log_configuration_summary(&self) {
        info!(
            database_url_masked = %mask_sensitive_data(&self.database.url),
            llm_provider = ?self.llm.provider,
            llm_model = ?self.llm.model,
            llm_key_masked = %self.llm.api_key.as_deref().map(mask_sensitive_data).unwrap_or_default(),
            extraction_mode = %self.llm.extraction_mode,
            export_key_masked = %self.export.api_key.as_deref().map(mask_sensitive_data).unwrap_or_default(),
            export_max_concurrency = self.export.max_concurrency,
            server_address = %self.server.address(),
            log_level = %self.logging.level,
            "Configuration summary"
        );
    }

    /// Format problems with configured keys. These are reported, never fatal.
    pub fn credential_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(key) = self.llm.api_key.as_deref() {
            if self.llm.provider == LLMProviderType::Anthropic && !anthropic_key_looks_valid(key) {
                warnings.push(
                    "LLM_API_KEY does not look like an Anthropic key (expected 'sk-ant-' and more than 20 characters)"
                        .to_string(),
                );
            }
        }

        if let Some(key) = self.export.api_key.as_deref() {
            if !mochi_key_looks_valid(key) {
                warnings.push("MOCHI_API_KEY looks too short (expected more than 10 characters)".to_string());
            }
        }

        warnings
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(anyhow!("DATABASE_URL must start with 'sqlite:'"));
        }

        if self.server.port == 0 {
            return Err(anyhow!("Server port must be greater than 0"));
        }

        if self.export.max_concurrency == 0 {
            return Err(anyhow!("EXPORT_MAX_CONCURRENCY must be at least 1"));
        }

        if !(0.0..=1.0).contains(&self.llm.temperature) {
            return Err(anyhow!(
                "LLM_TEMPERATURE must be between 0.0 and 1.0, got {}",
                self.llm.temperature
            ));
        }

        if self.llm.api_key.as_deref().is_none_or(str::is_empty) {
            warn!("LLM_API_KEY is not set - card generation will be unavailable");
        }

        if self.export.api_key.as_deref().is_none_or(str::is_empty) {
            warn!("MOCHI_API_KEY is not set - export will be unavailable");
        }

        for warning in self.credential_warnings() {
            log_validation!(failure, "configuration", error = warning);
        }

        if !["trace", "debug", "info", "warn", "error"]
            .iter()
            .any(|level| self.logging.level.to_lowercase().contains(level))
        {
            warn!("Invalid log level '{}', using '{}' as fallback", self.logging.level, DEFAULT_LOG_LEVEL);
        }

        log_validation!(success, "configuration", "Configuration validation completed successfully");
        Ok(())
    }
}

impl DatabaseConfig {
    fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:flashcards.db?mode=rwc".to_string());

        Ok(DatabaseConfig { url })
    }
}

impl LLMConfig {
    fn from_env() -> Result<Self> {
        let api_key = non_empty_var("LLM_API_KEY");
        let base_url = non_empty_var("LLM_BASE_URL");

        let provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "anthropic".to_string());
        let provider = LLMProviderType::parse(&provider_str);

        let model = non_empty_var("LLM_MODEL");

        let max_tokens_str = env::var("LLM_MAX_TOKENS").unwrap_or_else(|_| "4000".to_string());
        let max_tokens = max_tokens_str
            .parse::<u32>()
            .map_err(|_| anyhow!("Invalid LLM_MAX_TOKENS value: '{}'", max_tokens_str))?;

        let temperature_str = env::var("LLM_TEMPERATURE").unwrap_or_else(|_| "0.2".to_string());
        let temperature = temperature_str
            .parse::<f32>()
            .map_err(|_| anyhow!("Invalid LLM_TEMPERATURE value: '{}'", temperature_str))?;

        let extraction_mode = match env::var("EXTRACTION_MODE") {
            Ok(value) => value.parse::<ExtractionMode>().map_err(|e| anyhow!("Invalid EXTRACTION_MODE: {}", e))?,
            Err(_) => ExtractionMode::default(),
        };

        Ok(LLMConfig {
            api_key,
            base_url,
            provider,
            model,
            max_tokens,
            temperature,
            extraction_mode,
        })
    }
}

impl ExportConfig {
    fn from_env() -> Result<Self> {
        let api_key = non_empty_var("MOCHI_API_KEY");
        let base_url = non_empty_var("MOCHI_BASE_URL");

        let concurrency_str = env::var("EXPORT_MAX_CONCURRENCY").unwrap_or_else(|_| "1".to_string());
        let max_concurrency = concurrency_str
            .parse::<usize>()
            .map_err(|_| anyhow!("Invalid EXPORT_MAX_CONCURRENCY value: '{}'", concurrency_str))?;

        Ok(ExportConfig {
            api_key,
            base_url,
            max_concurrency,
        })
    }
}

impl ServerConfig {
    fn from_env() -> Result<Self> {
        let port_str = env::var("PORT").unwrap_or_else(|_| "3000".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid PORT value: '{}'. Must be a number between 1-65535", port_str))?;

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        Ok(ServerConfig { port, host })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl LoggingConfig {
    fn from_env() -> Result<Self> {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.to_string());

        let file_enabled = env::var("LOG_FILE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let console_enabled = env::var("LOG_CONSOLE_ENABLED")
            .unwrap_or_else(|_| "true".to_string())
            .parse::<bool>()
            .unwrap_or(true);

        let log_directory = env::var("LOG_DIRECTORY").unwrap_or_else(|_| "logs".to_string());

        Ok(LoggingConfig {
            level,
            file_enabled,
            console_enabled,
            log_directory,
        })
    }
}

pub fn anthropic_key_looks_valid(key: &str) -> bool {
    key.starts_with("sk-ant-") && key.chars().count() > 20
}

pub fn mochi_key_looks_valid(key: &str) -> bool {
    key.chars().count() > 10
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

/// Mask sensitive data in configuration for safe logging
pub fn mask_sensitive_data(data: &str) -> String {
    let chars: Vec<char> = data.chars().collect();
    if chars.len() <= 8 {
        "*".repeat(chars.len())
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}***{}", head, tail)
    }
}

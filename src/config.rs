use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::validation::InputValidator;

/// Application configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub oracle: OracleConfig,
    pub ingestion: IngestionConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout_secs: u64,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file_path: Option<String>,
    pub format: String, // "json" or "text"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub min_content_length: usize,
    pub max_content_length: usize,
    pub max_concurrent_pipelines: usize,
    pub self_author_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub default_message_limit: u32,
    pub max_message_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/sentiment.db".to_string(),
                max_connections: 10,
                connection_timeout_secs: 30,
                busy_timeout_ms: 5000,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                file_path: None,
                format: "text".to_string(),
            },
            oracle: OracleConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: None,
                model: "gpt-3.5-turbo".to_string(),
                temperature: 0.3,
                max_tokens: 300,
                timeout_secs: 30,
            },
            ingestion: IngestionConfig {
                min_content_length: 10,
                max_content_length: 4000,
                max_concurrent_pipelines: 16,
                self_author_id: None,
            },
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                default_message_limit: 100,
                max_message_limit: 1000,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Start with default values
            .add_source(Config::try_from(&Self::default())?)
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(File::with_name("config").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("SENTIMENT").prefix_separator("_").separator("__"))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| anyhow::anyhow!("Failed to deserialize configuration: {}", e))?;
        app_config.apply_database_url_override(std::env::var("DATABASE_URL").ok());

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        InputValidator::validate_database_url(&self.database.url)?;
        if self.database.max_connections == 0 {
            return Err(anyhow::anyhow!("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(anyhow::anyhow!("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            ));
        }

        // Validate oracle config
        if self.oracle.timeout_secs == 0 {
            return Err(anyhow::anyhow!("oracle timeout_secs must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(anyhow::anyhow!("oracle temperature must be between 0 and 2"));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow::anyhow!("oracle model must not be empty"));
        }

        // Validate ingestion config
        if self.ingestion.min_content_length == 0 {
            return Err(anyhow::anyhow!("min_content_length must be greater than 0"));
        }
        if self.ingestion.max_content_length < self.ingestion.min_content_length {
            return Err(anyhow::anyhow!(
                "max_content_length must be at least min_content_length"
            ));
        }
        if self.ingestion.max_concurrent_pipelines == 0 {
            return Err(anyhow::anyhow!("max_concurrent_pipelines must be greater than 0"));
        }

        // Validate server config
        if self.server.max_message_limit == 0 {
            return Err(anyhow::anyhow!("max_message_limit must be greater than 0"));
        }
        if self.server.default_message_limit == 0
            || self.server.default_message_limit > self.server.max_message_limit
        {
            return Err(anyhow::anyhow!(
                "default_message_limit must be between 1 and max_message_limit"
            ));
        }

        Ok(())
    }

    /// Replace the configured database URL with `DATABASE_URL`, if set.
    /// Runs before validation so the override is checked like any other value.
    fn apply_database_url_override(&mut self, database_url: Option<String>) {
        if let Some(url) = database_url.filter(|url| !url.trim().is_empty()) {
            self.database.url = url;
        }
    }

    /// Get the oracle API key from config or the `OPENAI_API_KEY` environment variable
    pub fn get_oracle_api_key(&self) -> Option<String> {
        self.oracle
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }

    /// Get log level from environment or config
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

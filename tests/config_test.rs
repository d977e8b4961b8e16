//! Unit tests for config.rs module

use sentiment_pipeline::config::AppConfig;

#[test]
fn test_default_config_values() {
    let config = AppConfig::default();

    assert_eq!(config.database.url, "sqlite:data/sentiment.db");
    assert_eq!(config.database.max_connections, 10);
    assert_eq!(config.database.connection_timeout_secs, 30);
    assert_eq!(config.database.busy_timeout_ms, 5000);
}

#[test]
fn test_default_logging_config() {
    let config = AppConfig::default();

    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.file_path, None);
    assert_eq!(config.logging.format, "text");
}

#[test]
fn test_default_oracle_config() {
    let config = AppConfig::default();

    assert_eq!(config.oracle.model, "gpt-3.5-turbo");
    assert!((config.oracle.temperature - 0.3).abs() < f32::EPSILON);
    assert_eq!(config.oracle.timeout_secs, 30);
    assert!(config.oracle.api_key.is_none());
}

#[test]
fn test_default_ingestion_and_server_config() {
    let config = AppConfig::default();

    assert_eq!(config.ingestion.min_content_length, 10);
    assert_eq!(config.ingestion.max_concurrent_pipelines, 16);
    assert!(config.ingestion.self_author_id.is_none());
    assert_eq!(config.server.port, 8000);
    assert_eq!(config.server.default_message_limit, 100);
}

#[test]
fn test_validation_rejects_bad_log_level() {
    let mut config = AppConfig::default();
    config.logging.level = "verbose".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_bad_log_format() {
    let mut config = AppConfig::default();
    config.logging.format = "xml".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_zero_oracle_timeout() {
    let mut config = AppConfig::default();
    config.oracle.timeout_secs = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_inverted_content_bounds() {
    let mut config = AppConfig::default();
    config.ingestion.max_content_length = 5;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_zero_concurrency() {
    let mut config = AppConfig::default();
    config.ingestion.max_concurrent_pipelines = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_default_limit_above_max() {
    let mut config = AppConfig::default();
    config.server.default_message_limit = 2000;
    assert!(config.validate().is_err());
}

#[test]
fn test_validation_rejects_non_sqlite_url() {
    let mut config = AppConfig::default();
    config.database.url = "postgres://localhost/db".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_config_serialization_roundtrip() {
    let config = AppConfig::default();
    let json = serde_json::to_string(&config).expect("serializable");
    let back: AppConfig = serde_json::from_str(&json).expect("deserializable");
    assert_eq!(back.database.url, config.database.url);
    assert_eq!(back.server.port, config.server.port);
}

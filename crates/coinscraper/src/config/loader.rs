use std::path::Path;

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Cross-field rules the schema cannot express.
pub(crate) fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!(
            "Unsupported config version: {}",
            config.version
        )));
    }

    if config.worker_count == 0 {
        return Err(invalid("worker_count must be at least 1"));
    }

    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be at least 1"));
    }

    if config.retry.max_delay_ms < config.retry.base_delay_ms {
        return Err(invalid(format!(
            "retry.max_delay_ms ({}) is below retry.base_delay_ms ({})",
            config.retry.max_delay_ms, config.retry.base_delay_ms
        )));
    }

    // A lease shorter than a fetch would redeliver units that are still running.
    if config.queue.lease_timeout_ms <= config.fetch_timeout_ms {
        return Err(invalid(format!(
            "queue.lease_timeout_ms ({}) must exceed fetch_timeout_ms ({})",
            config.queue.lease_timeout_ms, config.fetch_timeout_ms
        )));
    }

    if config.queue.poll_interval_ms == 0 {
        return Err(invalid("queue.poll_interval_ms must be at least 1"));
    }

    if !config.scraper.base_url.contains("{}") {
        return Err(invalid(format!(
            "scraper.base_url must contain a '{{}}' placeholder: {}",
            config.scraper.base_url
        )));
    }

    if let Err(e) = tracing_subscriber::EnvFilter::try_new(&config.log_level) {
        return Err(invalid(format!(
            "Invalid log_level '{}': {}",
            config.log_level, e
        )));
    }

    Ok(())
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        message: message.into(),
    }
}

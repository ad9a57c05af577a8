//! Table-driven tests for configuration loading and validation.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{wait_for_tasks, AlwaysSucceed};
use tempfile::TempDir;

use coinscraper::{load_config, load_config_from_str, ConfigError, ScrapeService};

/// Represents a single config loading test case.
struct ConfigTestCase {
    /// Test case name for identification.
    name: &'static str,
    /// The config JSON content to test.
    config_json: &'static str,
    /// Whether loading should succeed.
    should_succeed: bool,
    /// Substring expected in the error message, when it fails.
    error_contains: Option<&'static str>,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "minimal",
        config_json: r#"{ "version": "1.0" }"#,
        should_succeed: true,
        error_contains: None,
    },
    ConfigTestCase {
        name: "fully_specified",
        config_json: r#"{
            "version": "1.0",
            "database_path": "/tmp/coins.db",
            "worker_count": 8,
            "fetch_timeout_ms": 10000,
            "retry": { "max_attempts": 4, "base_delay_ms": 500, "max_delay_ms": 8000 },
            "queue": { "lease_timeout_ms": 60000, "poll_interval_ms": 250 },
            "scraper": { "base_url": "https://example.com/coins/{}", "user_agent": "bot/1" },
            "log_level": "coinscraper=debug,warn"
        }"#,
        should_succeed: true,
        error_contains: None,
    },
    ConfigTestCase {
        name: "missing_version",
        config_json: r#"{ "worker_count": 2 }"#,
        should_succeed: false,
        error_contains: Some("version"),
    },
    ConfigTestCase {
        name: "unsupported_version",
        config_json: r#"{ "version": "9.9" }"#,
        should_succeed: false,
        error_contains: Some("Unsupported config version"),
    },
    ConfigTestCase {
        name: "zero_workers",
        config_json: r#"{ "version": "1.0", "worker_count": 0 }"#,
        should_succeed: false,
        error_contains: None,
    },
    ConfigTestCase {
        name: "zero_attempts",
        config_json: r#"{ "version": "1.0", "retry": { "max_attempts": 0 } }"#,
        should_succeed: false,
        error_contains: None,
    },
    ConfigTestCase {
        name: "wrong_type",
        config_json: r#"{ "version": "1.0", "fetch_timeout_ms": "fast" }"#,
        should_succeed: false,
        error_contains: None,
    },
    ConfigTestCase {
        name: "lease_shorter_than_fetch",
        config_json: r#"{
            "version": "1.0",
            "fetch_timeout_ms": 30000,
            "queue": { "lease_timeout_ms": 1000 }
        }"#,
        should_succeed: false,
        error_contains: Some("lease_timeout_ms"),
    },
    ConfigTestCase {
        name: "base_url_without_placeholder",
        config_json: r#"{ "version": "1.0", "scraper": { "base_url": "https://example.com" } }"#,
        should_succeed: false,
        error_contains: Some("placeholder"),
    },
    ConfigTestCase {
        name: "unknown_nested_field",
        config_json: r#"{ "version": "1.0", "retry": { "attempts": 3 } }"#,
        should_succeed: false,
        error_contains: None,
    },
];

#[test]
fn test_config_loading_table() {
    for case in CONFIG_TESTS {
        let result = load_config_from_str(case.config_json);
        match (case.should_succeed, &result) {
            (true, Ok(_)) => {}
            (false, Err(err)) => {
                if let Some(expected) = case.error_contains {
                    assert!(
                        err.to_string().contains(expected),
                        "{}: error '{}' should contain '{}'",
                        case.name,
                        err,
                        expected
                    );
                }
            }
            (true, Err(err)) => panic!("{}: expected success, got {}", case.name, err),
            (false, Ok(_)) => panic!("{}: expected an error", case.name),
        }
    }
}

#[test]
fn test_missing_file_reports_path() {
    let err = load_config("/nonexistent/coinscraper.json").unwrap_err();
    assert!(matches!(err, ConfigError::ReadFile { .. }));
    assert!(err.to_string().contains("/nonexistent/coinscraper.json"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_service_starts_from_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("coins.db");
    let config_path = temp_dir.path().join("config.json");
    let config_json = serde_json::json!({
        "version": "1.0",
        "database_path": db_path.to_string_lossy(),
        "worker_count": 2,
        "fetch_timeout_ms": 1000,
        "retry": { "base_delay_ms": 5, "max_delay_ms": 20 },
        "queue": { "lease_timeout_ms": 5000, "poll_interval_ms": 10 }
    });
    std::fs::write(&config_path, config_json.to_string()).unwrap();

    let config = load_config(&config_path).unwrap();
    let service = ScrapeService::start(&config, Arc::new(AlwaysSucceed::default())).unwrap();
    assert!(db_path.exists());

    let job = service
        .start_job(&["BTC".to_string()])
        .await
        .unwrap();
    let view = wait_for_tasks(&service, job.id, 1, Duration::from_secs(10)).await;
    assert_eq!(view.task_count(), 1);

    service.shutdown().await;
}

//! Integration tests for `logroute route` and configuration loading.
//!
//! Rules, input and spool files all live in a temporary directory.

use std::fs;
use std::path::Path;

use tempfile::TempDir;

use logroute_cli::cli::RouteArgs;
use logroute_cli::commands::route;
use logroute_core::config::LogRouteConfig;

const RULES: &str = r#"
rules:
  - name: payment_errors
    priority: 1
    conditions:
      - field: level
        operator: equals
        value: error
      - field: service
        operator: equals
        value: payments
    transformations:
      - type: mask
        field: card
        pattern: '\d{12}'
    destination:
      type: pci_archive
  - name: everything_else
    priority: 100
    conditions:
      - field: level
        operator: exists
    destination:
      type: general
"#;

const INPUT: &str = r#"{"level": "error", "service": "payments", "card": "4111111111111111"}
{"level": "info", "service": "web"}

not json
{"message": "no level"}
{"level": "warn", "service": "payments"}
"#;

fn write_fixture(dir: &Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let rules = dir.join("rules.yaml");
    let input = dir.join("input.ndjson");
    fs::write(&rules, RULES).expect("should write rules");
    fs::write(&input, INPUT).expect("should write input");
    (rules, input)
}

fn read_spool(path: &Path) -> Vec<serde_json::Value> {
    fs::read_to_string(path)
        .expect("spool file should exist")
        .lines()
        .map(|l| serde_json::from_str(l).expect("spool line should be JSON"))
        .collect()
}

#[tokio::test]
async fn test_route_spools_each_destination() {
    // Given: two rules and a mixed input file
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (rules, input) = write_fixture(temp_dir.path());
    let out_dir = temp_dir.path().join("spool");

    // When: routing with default configuration
    let report = route::run(
        &LogRouteConfig::default(),
        RouteArgs {
            input,
            rules: Some(rules),
            out_dir: out_dir.clone(),
            geoip: None,
            batch_size: 2,
        },
    )
    .await
    .expect("route should succeed");

    // Then: counts reflect every line
    assert_eq!(report.records, 4, "blank and invalid lines are not records");
    assert_eq!(report.invalid_lines, 1);
    assert_eq!(report.batches, 2);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.destinations["general"].delivered, 2);

    // And: the payment error is masked in its own spool file
    let pci = read_spool(&out_dir.join("pci_archive.ndjson"));
    assert_eq!(pci.len(), 1);
    assert_eq!(pci[0]["card"], "************1111");
    assert_eq!(pci[0]["_metadata"]["route_name"], "payment_errors");

    let general = read_spool(&out_dir.join("general.ndjson"));
    assert_eq!(general.len(), 2);

    let metrics = report.metrics.expect("metrics report is attached");
    assert_eq!(metrics.summary.total, 3);
    assert_eq!(metrics.unmatched, 1);
}

#[tokio::test]
async fn test_route_rejects_zero_batch_size() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (rules, input) = write_fixture(temp_dir.path());

    let result = route::run(
        &LogRouteConfig::default(),
        RouteArgs {
            input,
            rules: Some(rules),
            out_dir: temp_dir.path().join("spool"),
            geoip: None,
            batch_size: 0,
        },
    )
    .await;

    assert!(result.is_err(), "zero batch size should be rejected");
}

#[tokio::test]
async fn test_route_missing_input_is_io_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let (rules, _) = write_fixture(temp_dir.path());

    let err = route::run(
        &LogRouteConfig::default(),
        RouteArgs {
            input: temp_dir.path().join("missing.ndjson"),
            rules: Some(rules),
            out_dir: temp_dir.path().join("spool"),
            geoip: None,
            batch_size: 10,
        },
    )
    .await
    .expect_err("missing input should fail");

    assert_eq!(err.exit_code(), 10);
}

#[tokio::test]
async fn test_config_file_overrides_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("logroute.toml");
    fs::write(
        &config_path,
        r#"
[router]
max_in_flight = 8

[dispatch]
max_retries = 5
"#,
    )
    .expect("should write config");

    let config = logroute_cli::commands::load_config(Some(config_path.as_path()))
        .await
        .expect("config should load");

    assert_eq!(config.router.max_in_flight, 8);
    assert_eq!(config.dispatch.max_retries, 5);
    assert_eq!(config.general.log_format, "json");
}

#[tokio::test]
async fn test_invalid_config_maps_to_exit_code_two() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config_path = temp_dir.path().join("logroute.toml");
    fs::write(&config_path, "[router]\nmax_in_flight = 0\n").expect("should write config");

    let err = logroute_cli::commands::load_config(Some(config_path.as_path()))
        .await
        .expect_err("zero max_in_flight is invalid");

    assert_eq!(err.exit_code(), 2);
}

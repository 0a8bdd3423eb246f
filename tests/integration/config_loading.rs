// tests/integration/config_loading.rs

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::NamedTempFile;

use bookflow::config::loader::{default_config_path, load_and_validate, load_or_default, parse_str};
use bookflow::config::ConfigFile;
use bookflow::errors::BookflowError;
use bookflow::types::Level;

fn load(contents: &str) -> Result<ConfigFile, BookflowError> {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    load_and_validate(file.path())
}

fn expect_config_error(contents: &str, needle: &str) {
    match load(contents) {
        Err(BookflowError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "'{msg}' does not mention '{needle}'");
        }
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_empty_file_yields_defaults() {
    let cfg = load("").unwrap();

    let pools: Vec<(String, usize, Vec<Level>)> = cfg
        .worker_pools()
        .into_iter()
        .map(|p| (p.name, p.size, p.levels))
        .collect();
    assert_eq!(
        pools,
        vec![
            ("high".to_string(), 2, vec![Level::High]),
            ("medium".to_string(), 2, vec![Level::Medium]),
            ("low".to_string(), 1, vec![Level::Low]),
        ]
    );

    assert_eq!(cfg.move_along_interval(), Duration::from_secs(30));
    assert_eq!(cfg.download_sync_interval(), Duration::from_secs(600));
    assert_eq!(cfg.retry_policy().max_attempts, 3);
    assert_eq!(cfg.retry_policy().backoff, Duration::from_millis(500));
    assert_eq!(cfg.orchestrator.required_metadata, vec!["title".to_string()]);
    assert!(!cfg.orchestrator.auto_upload);
    assert_eq!(cfg.remote.ready_repub_state, 4);
    assert_eq!(cfg.packaging.blur_threshold, 0.5);
    assert_eq!(cfg.library.path, PathBuf::from("books"));
}

#[test]
fn test_sections_override_defaults() {
    let cfg = load(
        r#"
[scheduler]
high_workers = 4

[orchestrator]
interval_secs = 5
auto_upload = true
required_metadata = ["title", "creator", "language"]

[retry]
max_attempts = 5
backoff_ms = 50

[library]
path = "/srv/scribe/books"
"#,
    )
    .unwrap();

    assert_eq!(cfg.worker_pools()[0].size, 4);
    assert_eq!(cfg.worker_pools()[1].size, 2);
    assert_eq!(cfg.move_along_interval(), Duration::from_secs(5));
    assert!(cfg.orchestrator.auto_upload);
    assert_eq!(cfg.orchestrator.required_metadata.len(), 3);
    assert_eq!(cfg.retry_policy().max_attempts, 5);
    assert_eq!(cfg.library.path, PathBuf::from("/srv/scribe/books"));
}

#[test]
fn test_explicit_pools_replace_level_defaults() {
    let cfg = load(
        r#"
[[scheduler.pool]]
name = "io"
workers = 2
levels = ["high", "medium"]

[[scheduler.pool]]
name = "background"
workers = 1
levels = ["low"]
"#,
    )
    .unwrap();

    let pools = cfg.worker_pools();
    assert_eq!(pools.len(), 2);
    assert_eq!(pools[0].name, "io");
    assert!(pools[0].serves(Level::High) && pools[0].serves(Level::Medium));
    assert!(!pools[0].serves(Level::Low));
    assert_eq!(pools[1].name, "background");
}

#[test]
fn test_uncovered_level_returns_config_error() {
    expect_config_error(
        r#"
[[scheduler.pool]]
name = "io"
workers = 2
levels = ["high", "medium"]
"#,
        "low",
    );
}

#[test]
fn test_zero_workers_do_not_cover_a_level() {
    expect_config_error(
        r#"
[scheduler]
medium_workers = 0
"#,
        "medium",
    );
}

#[test]
fn test_duplicate_pool_name_returns_config_error() {
    expect_config_error(
        r#"
[[scheduler.pool]]
name = "all"
workers = 1
levels = ["high", "medium", "low"]

[[scheduler.pool]]
name = "all"
workers = 1
levels = ["low"]
"#,
        "more than once",
    );
}

#[test]
fn test_pool_without_levels_returns_config_error() {
    expect_config_error(
        r#"
[[scheduler.pool]]
name = "all"
workers = 2
levels = ["high", "medium", "low"]

[[scheduler.pool]]
name = "idle"
workers = 1
levels = []
"#,
        "at least one level",
    );
}

#[test]
fn test_out_of_range_values_return_config_error() {
    expect_config_error("[orchestrator]\ninterval_secs = 0\n", "interval_secs");
    expect_config_error("[orchestrator]\ndownload_sync_secs = 0\n", "download_sync_secs");
    expect_config_error("[retry]\nmax_attempts = 0\n", "max_attempts");
    expect_config_error("[packaging]\nblur_threshold = 1.5\n", "blur_threshold");
}

#[test]
fn test_unknown_level_is_a_toml_error() {
    let result = parse_str(
        r#"
[[scheduler.pool]]
name = "io"
workers = 1
levels = ["urgent"]
"#,
    );
    assert!(matches!(result, Err(BookflowError::TomlError(_))));
}

#[test]
fn test_malformed_toml_is_a_toml_error() {
    assert!(matches!(load("[scheduler"), Err(BookflowError::TomlError(_))));
}

#[test]
fn test_missing_explicit_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_or_default(dir.path().join("missing.toml"));
    assert!(matches!(result, Err(BookflowError::IoError(_))));
}

#[test]
fn test_missing_default_file_falls_back_to_defaults() {
    // Tests run from the package root, which carries no Bookflow.toml.
    let path = default_config_path();
    assert!(!path.exists());

    let cfg = load_or_default(&path).unwrap();
    assert_eq!(cfg.worker_pools().len(), 3);
}

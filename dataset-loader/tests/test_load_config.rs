use dataset_loader::load_config::load_config;
use dataset_loader_core::feature_set::ConflictPolicy;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

/// A config with only the required keys picks up every default.
#[test]
fn test_load_config_minimal_uses_defaults() {
    let file = config_file(
        r#"
download:
  source: "https://storage.example.com/mars_surface_captioned.zip"
  work_dir: ./tmp
upload:
  dataset_id: "ds-123"
"#,
    );

    let config = load_config(file.path()).expect("Config should load");

    assert_eq!(
        config.download.source,
        "https://storage.example.com/mars_surface_captioned.zip"
    );
    assert_eq!(config.download.work_dir, PathBuf::from("./tmp"));
    assert_eq!(config.upload.dataset_id, "ds-123");

    let options = &config.upload.options;
    assert_eq!(options.concurrency, None);
    assert_eq!(options.feature_set.name, "openai-clip");
    assert_eq!(options.feature_set.size, 512);
    assert_eq!(options.feature_set.entity_type, "item");
    assert_eq!(options.feature_set.set_type, "clip");
    assert_eq!(
        options.conflict_policy,
        ConflictPolicy::RetryThenLookup {
            attempts: 3,
            backoff_ms: 1000
        }
    );
}

/// Every optional upload knob can be overridden.
#[test]
fn test_load_config_with_overrides() {
    let file = config_file(
        r#"
download:
  source: "file:///data/archive.zip"
  work_dir: /var/tmp/loader
upload:
  dataset_id: "ds-9"
  concurrency: 8
  feature_set:
    name: my-clip
    size: 768
  conflict_policy:
    type: random_suffix
"#,
    );

    let config = load_config(file.path()).expect("Config should load with overrides");
    let options = &config.upload.options;
    assert_eq!(options.workers(), 8);
    assert_eq!(options.feature_set.name, "my-clip");
    assert_eq!(options.feature_set.size, 768);
    assert_eq!(options.feature_set.set_type, "clip");
    assert_eq!(options.conflict_policy, ConflictPolicy::RandomSuffix);
}

#[test]
fn test_load_config_errors_on_missing_dataset() {
    let file = config_file(
        r#"
download:
  source: "https://example.com/a.zip"
  work_dir: ./tmp
upload:
  concurrency: 2
"#,
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(
        err.to_string().contains("parse") || err.to_string().contains("YAML"),
        "Parse error expected, got: {err}"
    );
}

#[test]
fn test_load_config_errors_on_blank_dataset() {
    let file = config_file(
        r#"
download:
  source: "https://example.com/a.zip"
  work_dir: ./tmp
upload:
  dataset_id: "  "
"#,
    );
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("dataset_id"), "got: {err}");
}

/// This test ensures that if the config file is not valid YAML, load_config errors and reports as such.
#[test]
fn test_load_config_errors_for_invalid_file() {
    let file = config_file("not-yaml: [:::");
    let err = load_config(file.path()).unwrap_err();
    let msg = err.to_string();
    assert!(
        msg.contains("parse") || msg.contains("YAML"),
        "Parse error expected, got: {msg}"
    );
}

#[test]
fn test_load_config_errors_for_missing_file() {
    let err = load_config("/no/such/config.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

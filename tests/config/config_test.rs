//! Coverage for config parsing, validation and command-line overrides.

use std::io::Write;
use std::path::{Path, PathBuf};

use tripwire::config::{load_config, CliOverrides, TripwireConfig};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(contents.as_bytes())
        .expect("should write config");
    file
}

#[test]
fn default_values() {
    let config = TripwireConfig::default();
    assert_eq!(config.api.port, 8080);
    assert!(!config.api.rest_enabled);
    assert!(!config.block_reports.enabled);
    assert_eq!(config.kubernetes.admission_source, "kyverno-admission");
    assert!(config.kubernetes.event_namespace.is_empty());
    assert!(config.kubernetes.kubeconfig.is_none());
    assert!(config.forward.url.is_none());
    assert_eq!(config.forward.timeout_secs, 10);
    assert!(config.logging.dir.is_none());
    assert!(!config.metrics.enabled);
    assert!(config.validate().is_ok());
}

#[test]
fn empty_file_is_valid() {
    let file = write_config("");
    let config = load_config(file.path()).expect("empty config should load");
    assert_eq!(config.api.port, 8080);
}

#[test]
fn parse_full_config() {
    let file = write_config(
        r#"
[kubernetes]
kubeconfig = "/home/ops/.kube/config"
event_namespace = "team-a"
admission_source = "kyverno-admission"

[api]
port = 9090
rest_enabled = true

[block_reports]
enabled = true

[forward]
url = "https://violations.example.com/ingest"
timeout_secs = 3

[metrics]
enabled = true

[logging]
dir = "/var/log/tripwire"
"#,
    );

    let config = load_config(file.path()).expect("full config should load");
    assert_eq!(
        config.kubernetes.kubeconfig.as_deref(),
        Some(Path::new("/home/ops/.kube/config"))
    );
    assert_eq!(config.kubernetes.event_namespace, "team-a");
    assert_eq!(config.api.port, 9090);
    assert!(config.api.rest_enabled);
    assert!(config.block_reports.enabled);
    assert_eq!(
        config.forward.url.as_deref(),
        Some("https://violations.example.com/ingest")
    );
    assert_eq!(config.forward.timeout_secs, 3);
    assert!(config.metrics.enabled);
    assert_eq!(
        config.logging.dir.as_deref(),
        Some(Path::new("/var/log/tripwire"))
    );
}

#[test]
fn missing_file_is_an_error() {
    let err = load_config(Path::new("/nonexistent/tripwire.toml")).expect_err("missing file");
    assert!(err.to_string().contains("failed to read config"));
}

#[test]
fn malformed_toml_is_an_error() {
    let file = write_config("[api\nport = ");
    let err = load_config(file.path()).expect_err("malformed file");
    assert!(err.to_string().contains("failed to parse config"));
}

#[test]
fn rejects_zero_port() {
    let file = write_config("[api]\nport = 0\n");
    let config = load_config(file.path()).expect("file should parse");
    assert!(config.validate().is_err());
}

#[test]
fn override_can_fix_invalid_file_value() {
    let file = write_config("[api]\nport = 0\n");
    let mut config = load_config(file.path()).expect("file should parse");

    config.apply_overrides(CliOverrides {
        port: Some(8080),
        ..CliOverrides::default()
    });

    assert_eq!(config.api.port, 8080);
    assert!(config.validate().is_ok());
}

#[test]
fn rejects_blank_admission_source() {
    let mut config = TripwireConfig::default();
    config.kubernetes.admission_source = "  ".to_owned();
    assert!(config.validate().is_err());
}

#[test]
fn rejects_out_of_range_timeout() {
    for timeout in [0, 301] {
        let mut config = TripwireConfig::default();
        config.forward.timeout_secs = timeout;
        assert!(config.validate().is_err(), "timeout {timeout} should fail");
    }
}

#[test]
fn rejects_bad_forward_urls() {
    for url in ["not a url", "ftp://example.com/violations"] {
        let mut config = TripwireConfig::default();
        config.forward.url = Some(url.to_owned());
        assert!(config.validate().is_err(), "{url} should fail");
    }
}

#[test]
fn overrides_replace_file_values() {
    let mut config = TripwireConfig::default();
    config.kubernetes.event_namespace = "from-file".to_owned();

    config.apply_overrides(CliOverrides {
        kubeconfig: Some(PathBuf::from("/tmp/kubeconfig")),
        port: Some(9191),
        rest_enabled: true,
        block_reports: true,
        metrics_enabled: true,
        event_namespace: Some("from-flag".to_owned()),
    });

    assert_eq!(
        config.kubernetes.kubeconfig.as_deref(),
        Some(Path::new("/tmp/kubeconfig"))
    );
    assert_eq!(config.api.port, 9191);
    assert!(config.api.rest_enabled);
    assert!(config.block_reports.enabled);
    assert!(config.metrics.enabled);
    assert_eq!(config.kubernetes.event_namespace, "from-flag");
}

#[test]
fn unset_flags_keep_file_values() {
    let mut config = TripwireConfig::default();
    config.api.port = 7000;
    config.api.rest_enabled = true;

    config.apply_overrides(CliOverrides::default());

    assert_eq!(config.api.port, 7000);
    assert!(config.api.rest_enabled);
}

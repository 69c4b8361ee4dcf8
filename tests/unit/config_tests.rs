// Configuration module unit tests
// Covers the derived endpoint helpers the proxy relies on

use std::path::PathBuf;
use std::time::Duration;
use thumbgate::config::*;

fn load(yaml: &str) -> Config {
    let config = Config::from_yaml_with_env(yaml).expect("Failed to parse YAML");
    config.validate().expect("Config should be valid");
    config
}

#[test]
fn test_backend_endpoint_with_explicit_port() {
    let config = load(
        r#"
backend:
  host: "thumbor.internal:8888"
  secret: "k"
  timeout: 5
cdn:
  origin: "cdn.example.com"
"#,
    );

    assert_eq!(
        config.backend.peer_endpoint(),
        ("thumbor.internal".to_string(), 8888)
    );
    assert_eq!(config.backend.host_name(), "thumbor.internal");
    assert_eq!(config.backend.timeout(), Duration::from_secs(5));
}

#[test]
fn test_backend_endpoint_defaults_to_port_80() {
    let config = load(
        r#"
backend:
  host: "thumbor"
  secret: "k"
cdn:
  origin: "cdn.example.com"
"#,
    );

    assert_eq!(config.backend.peer_endpoint(), ("thumbor".to_string(), 80));
}

#[test]
fn test_cdn_endpoint_follows_project_protocol() {
    let config = load(
        r#"
backend:
  host: "thumbor"
  secret: "k"
cdn:
  origin: "cdn.example.com"
"#,
    );

    assert_eq!(
        config.cdn.peer_endpoint(true),
        ("cdn.example.com".to_string(), 443)
    );
    assert_eq!(
        config.cdn.peer_endpoint(false),
        ("cdn.example.com".to_string(), 80)
    );
    assert_eq!(
        config.cdn.public_url("https", "/abc_/cat.jpg"),
        "https://cdn.example.com/abc_/cat.jpg"
    );
}

#[test]
fn test_cdn_origin_port_is_kept_in_public_url() {
    let config = load(
        r#"
backend:
  host: "thumbor"
  secret: "k"
cdn:
  origin: "127.0.0.1:9000"
"#,
    );

    assert_eq!(config.cdn.host_name(), "127.0.0.1");
    assert_eq!(
        config.cdn.peer_endpoint(true),
        ("127.0.0.1".to_string(), 9000)
    );
    assert_eq!(
        config.cdn.public_url("http", "/x/a.png"),
        "http://127.0.0.1:9000/x/a.png"
    );
}

#[test]
fn test_sqlite_database_path() {
    let config = load(
        r#"
backend:
  host: "thumbor"
  secret: "k"
cdn:
  origin: "cdn.example.com"
database:
  kind: sqlite
  path: "/var/lib/thumbgate/images.db"
analytics:
  probe_timeout_ms: 250
"#,
    );

    assert_eq!(
        config.database,
        DatabaseConfig::Sqlite {
            path: PathBuf::from("/var/lib/thumbgate/images.db")
        }
    );
    assert_eq!(config.analytics.probe_timeout(), Duration::from_millis(250));
}

#[test]
fn test_unknown_database_kind_is_rejected() {
    let yaml = r#"
backend:
  host: "thumbor"
  secret: "k"
cdn:
  origin: "cdn.example.com"
database:
  kind: postgres
  url: "postgres://localhost/db"
"#;

    assert!(Config::from_yaml_with_env(yaml).is_err());
}

#[test]
fn test_missing_backend_section_is_rejected() {
    let yaml = r#"
cdn:
  origin: "cdn.example.com"
"#;

    let err = Config::from_yaml_with_env(yaml).unwrap_err();
    assert!(err.contains("backend"));
}

//! Integration tests for logging system

use bridge_traits::time::LogLevel;
use core_runtime::logging::{
    init_logging, redact_if_sensitive, strip_path, LogFormat, LoggingConfig,
};

#[test]
fn test_config_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_pii_redaction(false)
        .with_spans(false)
        .with_target(false);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert!(!config.redact_pii);
    assert!(!config.enable_spans);
    assert!(!config.display_target);
}

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default().with_format(LogFormat::Json);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());
}

#[test]
fn test_redaction_of_credentials() {
    assert_eq!(redact_if_sensitive("access_token", "sl.abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Authorization", "Bearer sl.abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
}

#[test]
fn test_redaction_of_emails() {
    let redacted = redact_if_sensitive("owner", "dj@example.com");

    assert!(redacted.starts_with('d'));
    assert!(redacted.contains("[REDACTED]"));
    assert!(!redacted.contains("example.com"));
}

#[test]
fn test_plain_values_pass_through() {
    assert_eq!(redact_if_sensitive("track_id", "id:abc"), "id:abc");
    assert_eq!(redact_if_sensitive("title", "Road Trip"), "Road Trip");
    assert_eq!(redact_if_sensitive("handle", "@dj"), "@dj");
}

#[test]
fn test_path_stripping() {
    assert_eq!(strip_path("/data/mixtape/abc_3.mp3"), "abc_3.mp3");
    assert_eq!(strip_path("C:\\Users\\dj\\mixtape\\road_trip.mix"), "road_trip.mix");
    assert_eq!(strip_path("abc_3.mp3.part"), "abc_3.mp3.part");
    assert_eq!(strip_path("/var/log/"), "");
    assert_eq!(strip_path(""), "");
}

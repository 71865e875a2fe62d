//! Integration tests for logging system

use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LogLevel, LoggingConfig};

#[test]
fn test_vendor_credentials_are_redacted() {
    assert_eq!(redact_if_sensitive("secret_id", "AKIDxxxx"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("access_key", "AKIAxxxx"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("token", "ya29.xxxx"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("password", "hunter2"), "[REDACTED]");
}

#[test]
fn test_identifiers_pass_through() {
    assert_eq!(redact_if_sensitive("cloud_id", "eip-1"), "eip-1");
    assert_eq!(redact_if_sensitive("region", "ap-guangzhou"), "ap-guangzhou");
    assert_eq!(redact_if_sensitive("account_id", "acct-1"), "acct-1");
}

#[test]
fn test_init_logging_only_once() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn);

    assert!(init_logging(config.clone()).is_ok());
    assert!(init_logging(config).is_err());

    tracing::warn!(account_id = "acct-1", "[aws] sync cvm failed");
}

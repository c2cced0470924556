//! Integration tests for the public API

use netcheck::probe::DeadlineScope;
use netcheck::{
    cipher_suite_name, version_name, DiagnosticError, ProbeError, ProbeRequest, ProbeResult,
    Variant,
};
use std::time::Duration;

#[test]
fn test_public_api_compiles() {
    // Signatures only; these would need a live server.
    let plain: fn(&str, u16, Duration) -> ProbeResult = netcheck::tls_handshake;
    let insecure: fn(&str, u16, Duration) -> ProbeResult = netcheck::tls_handshake_insecure;
    let sni: fn(&str, u16, &str, Duration) -> ProbeResult = netcheck::tls_handshake_with_sni;
    let postgres: fn(&str, u16, Duration) -> ProbeResult = netcheck::postgres_starttls;
    let ldap: fn(&str, u16, Duration) -> ProbeResult = netcheck::ldap_starttls;
    let tcp: fn(&str, u16, Duration) -> Result<Duration, ProbeError> = netcheck::check_tcp;

    let _ = (plain, insecure, sni, postgres, ldap, tcp);
}

#[test]
fn test_error_types_are_public() {
    fn handle_error(err: ProbeError) -> String {
        match err {
            ProbeError::DnsResolution { hostname, .. } => {
                format!("DNS failed for {}", hostname)
            }
            ProbeError::ConnectionFailed { address, .. } => {
                format!("Connection failed to {}", address)
            }
            ProbeError::Timeout { operation, limit } => {
                format!("Timeout: {} ({:?})", operation, limit)
            }
            ProbeError::UpgradeIo {
                protocol, stage, ..
            } => {
                format!("Upgrade I/O: {} {}", protocol, stage)
            }
            ProbeError::UpgradeRejected { protocol, reason } => {
                format!("Upgrade rejected: {} {}", protocol, reason)
            }
            ProbeError::HandshakeFailed { details } => {
                format!("Handshake failed: {}", details)
            }
            ProbeError::InvalidInput { field, reason } => {
                format!("Invalid {}: {}", field, reason)
            }
            ProbeError::OpenSSLError { details } => {
                format!("OpenSSL error: {}", details)
            }
            ProbeError::IoError { source } => {
                format!("I/O error: {}", source)
            }
        }
    }

    let err = ProbeError::InvalidInput {
        field: "test".to_string(),
        reason: "test reason".to_string(),
    };

    let msg = handle_error(err);
    assert!(msg.contains("test"));
}

#[test]
fn test_request_builder() {
    let timeout = Duration::from_secs(2);
    let request = ProbeRequest::new("db.example.com", 5432, timeout, Variant::PostgresStartTls)
        .unwrap()
        .with_server_name("postgres.example.com")
        .unwrap()
        .with_verification(false)
        .with_deadline_scope(DeadlineScope::Dial);

    assert_eq!(request.host(), "db.example.com");
    assert_eq!(request.port(), 5432);
    assert_eq!(request.server_name(), "postgres.example.com");
    assert!(!request.verify());
    assert_eq!(request.variant(), Variant::PostgresStartTls);
    assert_eq!(request.deadline_scope(), DeadlineScope::Dial);
}

#[test]
fn test_invalid_port_is_reported_not_panicked() {
    for result in [
        netcheck::tls_handshake("example.com", 0, Duration::from_secs(1)),
        netcheck::postgres_starttls("example.com", 0, Duration::from_secs(1)),
        netcheck::ldap_starttls("example.com", 0, Duration::from_secs(1)),
    ] {
        assert!(!result.success());
        assert!(result.handshake().is_none());
        assert!(result.failure().unwrap().to_string().contains("port"));
    }
}

#[test]
fn test_name_lookups() {
    assert_eq!(version_name(0x0304), "TLS 1.3");
    assert_eq!(version_name(0x0300), "SSL 3.0");
    assert_eq!(version_name(0x9999), "Unknown (0x9999)");
    assert_eq!(cipher_suite_name(0xc02f), "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256");
    assert_eq!(cipher_suite_name(0x0000), "Unknown (0x0000)");
}

#[test]
fn test_diagnostic_error_display() {
    let err = DiagnosticError::ProcessNotFound {
        name: "mattermost".to_string(),
    };
    assert!(err.to_string().contains("mattermost"));
}

#[test]
fn test_error_conversion_from_io() {
    let err: ProbeError = std::io::Error::from(std::io::ErrorKind::BrokenPipe).into();
    assert!(matches!(err, ProbeError::IoError { .. }));
    assert_eq!(err.stage(), "io");
}

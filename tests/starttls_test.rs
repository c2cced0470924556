//! PostgreSQL and LDAP upgrade exchanges against a loopback server.

mod common;

use common::{acceptor, serve_once, TEST_CIPHER};
use netcheck::probe::starttls::{LDAP_STARTTLS_REQUEST, POSTGRES_SSL_REQUEST};
use netcheck::{probe, ProbeError, ProbeRequest, ProtocolVersion, Variant};
use std::io::{Read, Write};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

/// ExtendedResponse, messageID 1, resultCode success, empty DN and message.
const LDAP_GRANT: [u8; 14] = [
    0x30, 0x0c, 0x02, 0x01, 0x01, 0x78, 0x07, 0x0a, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00,
];

fn insecure(port: u16, variant: Variant) -> ProbeRequest {
    ProbeRequest::new("127.0.0.1", port, TIMEOUT, variant)
        .unwrap()
        .with_verification(false)
}

#[test]
fn test_postgres_grant_then_handshake() {
    let (acceptor, seen) = acceptor();
    let (port, server) = serve_once(move |mut stream| {
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).unwrap();
        stream.write_all(b"S").unwrap();
        let established = acceptor.accept(stream).is_ok();
        (request, established)
    });

    let request = insecure(port, Variant::PostgresStartTls)
        .with_server_name("db.example.com")
        .unwrap();
    let result = probe(&request);

    assert!(result.success(), "probe failed: {:?}", result.failure());
    let handshake = result.handshake().unwrap();
    assert_eq!(handshake.version, ProtocolVersion::Tls13);
    assert_eq!(handshake.cipher_suite.to_string(), TEST_CIPHER);
    assert_eq!(handshake.server_name, "db.example.com");
    assert_eq!(handshake.peer_certificates, 1);

    let (sent, _) = server.join().unwrap();
    assert_eq!(sent, POSTGRES_SSL_REQUEST);
    assert_eq!(seen.lock().unwrap().as_deref(), Some("db.example.com"));
}

#[test]
fn test_postgres_refusal_sends_nothing_further() {
    let (port, server) = serve_once(|mut stream| {
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).unwrap();
        stream.write_all(b"N").unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        (request, rest.len())
    });

    let result = netcheck::postgres_starttls("127.0.0.1", port, TIMEOUT);
    assert!(!result.success());
    let err = result.failure().unwrap();
    assert!(matches!(err, ProbeError::UpgradeRejected { protocol: "postgres", .. }));
    let msg = err.to_string();
    assert!(msg.contains("server does not support SSL"), "{}", msg);
    assert!(msg.contains("'N'"), "{}", msg);

    let (sent, trailing) = server.join().unwrap();
    assert_eq!(sent, POSTGRES_SSL_REQUEST);
    assert_eq!(trailing, 0);
}

#[test]
fn test_postgres_closed_before_reply() {
    let (port, server) = serve_once(|mut stream| {
        let mut request = [0u8; 8];
        stream.read_exact(&mut request).unwrap();
    });

    let result = netcheck::postgres_starttls("127.0.0.1", port, TIMEOUT);
    server.join().unwrap();
    assert!(matches!(
        result.failure(),
        Some(ProbeError::UpgradeIo { protocol: "postgres", .. })
    ));
}

#[test]
fn test_postgres_silent_server_times_out() {
    let (port, _server) = serve_once(|mut stream| {
        let mut request = [0u8; 8];
        let _ = stream.read_exact(&mut request);
        std::thread::sleep(Duration::from_secs(3));
    });

    let result = netcheck::postgres_starttls("127.0.0.1", port, Duration::from_secs(1));
    let err = result.failure().unwrap();
    assert!(matches!(err, ProbeError::Timeout { .. }), "{:?}", err);
    assert!(err.to_string().contains("postgres STARTTLS"));
    assert!(result.elapsed() < Duration::from_secs(3));
}

#[test]
fn test_ldap_grant_then_handshake() {
    let (acceptor, _) = acceptor();
    let (port, server) = serve_once(move |mut stream| {
        let mut request = [0u8; 31];
        stream.read_exact(&mut request).unwrap();
        stream.write_all(&LDAP_GRANT).unwrap();
        let established = acceptor.accept(stream).is_ok();
        (request, established)
    });

    let result = probe(&insecure(port, Variant::LdapStartTls));
    assert!(result.success(), "probe failed: {:?}", result.failure());
    assert_eq!(result.handshake().unwrap().cipher_suite.to_string(), TEST_CIPHER);

    let (sent, _) = server.join().unwrap();
    assert_eq!(sent, LDAP_STARTTLS_REQUEST);
}

#[test]
fn test_ldap_any_long_enough_reply_is_a_grant() {
    let (acceptor, _) = acceptor();
    let (port, server) = serve_once(move |mut stream| {
        let mut request = [0u8; 31];
        stream.read_exact(&mut request).unwrap();
        stream.write_all(&[0xab; 10]).unwrap();
        acceptor.accept(stream).is_ok()
    });

    let result = probe(&insecure(port, Variant::LdapStartTls));
    assert!(result.success(), "probe failed: {:?}", result.failure());
    let _ = server.join();
}

#[test]
fn test_ldap_short_reply_is_rejected() {
    let (port, server) = serve_once(|mut stream| {
        let mut request = [0u8; 31];
        stream.read_exact(&mut request).unwrap();
        stream.write_all(&[0x30, 0x03, 0x02, 0x01]).unwrap();
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
        rest.len()
    });

    let result = netcheck::ldap_starttls("127.0.0.1", port, TIMEOUT);
    assert!(!result.success());
    let err = result.failure().unwrap();
    assert_eq!(
        err.to_string(),
        "ldap STARTTLS rejected: invalid STARTTLS response length: 4"
    );
    assert_eq!(server.join().unwrap(), 0);
}

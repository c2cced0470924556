//! Connectivity, TLS/STARTTLS handshake and host tuning checks.
//!
//! The network side dials a `host:port`, optionally upgrades the plaintext
//! connection in-band (PostgreSQL, LDAP) and reports what the TLS handshake
//! negotiated. The host side compares kernel tunables and resource limits
//! against recommended values and lists a running process's environment.

pub mod config;
pub mod error;
pub mod metrics;
pub mod names;
pub mod output;
pub mod probe;
pub mod system;

pub use error::ProbeError;
pub use names::{cipher_suite_name, version_name, CipherSuite, ProtocolVersion};
pub use probe::{
    check_tcp, ldap_starttls, postgres_starttls, probe, tls_handshake, tls_handshake_insecure,
    tls_handshake_with_sni, Handshake, ProbeOutcome, ProbeRequest, ProbeResult, Variant,
};
pub use system::{DiagnosticError, HostInspector};

//! TCP reachability and TLS handshake probes.
//!
//! A probe is one synchronous, one-shot exchange with a remote endpoint:
//! dial, optionally upgrade the plaintext connection in-band (PostgreSQL
//! SSLRequest or LDAP StartTLS), perform a TLS client handshake and read back
//! what was negotiated. The connection is owned by the probe and dropped
//! before the result is returned, whichever way the attempt ended.
//!
//! # Example
//!
//! ```no_run
//! use netcheck::probe::{probe, ProbeRequest, Variant};
//! use std::time::Duration;
//!
//! let timeout = Duration::from_secs(5);
//! let request = ProbeRequest::new("db.internal", 5432, timeout, Variant::PostgresStartTls)?
//!     .with_server_name("postgres.example.com")?;
//! let result = probe(&request);
//! if let Some(handshake) = result.handshake() {
//!     println!("{} {}", handshake.version, handshake.cipher_suite);
//! }
//! # Ok::<(), netcheck::ProbeError>(())
//! ```

pub mod starttls;
mod tls;
pub mod transport;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, info};

use crate::error::ProbeError;
use crate::names::{CipherSuite, ProtocolVersion};
use starttls::{Ldap, Postgres};
pub use transport::{Deadline, DeadlineScope};

/// How the TLS session is reached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Variant {
    /// TLS from the first byte.
    Tls,
    /// PostgreSQL SSLRequest, then TLS on the same connection.
    PostgresStartTls,
    /// LDAP StartTLS extended operation, then TLS on the same connection.
    LdapStartTls,
}

/// Everything a single probe needs, validated up front.
#[derive(Debug, Clone)]
pub struct ProbeRequest {
    host: String,
    port: u16,
    timeout: Duration,
    server_name: String,
    verify: bool,
    variant: Variant,
    deadline_scope: DeadlineScope,
}

impl ProbeRequest {
    /// Creates a verifying request whose SNI is `host`.
    pub fn new(
        host: &str,
        port: u16,
        timeout: Duration,
        variant: Variant,
    ) -> Result<Self, ProbeError> {
        if host.trim().is_empty() {
            return Err(ProbeError::InvalidInput {
                field: "host".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        if port == 0 {
            return Err(ProbeError::InvalidInput {
                field: "port".to_string(),
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if timeout.is_zero() {
            return Err(ProbeError::InvalidInput {
                field: "timeout".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(ProbeRequest {
            host: host.to_string(),
            port,
            timeout,
            server_name: host.to_string(),
            verify: true,
            variant,
            deadline_scope: DeadlineScope::default(),
        })
    }

    /// Announces `server_name` instead of the dial host.
    pub fn with_server_name(mut self, server_name: &str) -> Result<Self, ProbeError> {
        if server_name.trim().is_empty() {
            return Err(ProbeError::InvalidInput {
                field: "sni".to_string(),
                reason: "cannot be empty".to_string(),
            });
        }
        self.server_name = server_name.to_string();
        Ok(self)
    }

    pub fn with_verification(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_deadline_scope(mut self, scope: DeadlineScope) -> Self {
        self.deadline_scope = scope;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn verify(&self) -> bool {
        self.verify
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn deadline_scope(&self) -> DeadlineScope {
        self.deadline_scope
    }
}

/// Parameters read from an established TLS session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Handshake {
    pub version: ProtocolVersion,
    pub cipher_suite: CipherSuite,
    /// SNI configured for the attempt.
    pub server_name: String,
    pub peer_certificates: usize,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    Established(Handshake),
    Failed(ProbeError),
}

/// Outcome of one probe. Built once and only read afterwards.
#[derive(Debug)]
pub struct ProbeResult {
    host: String,
    port: u16,
    variant: Variant,
    elapsed: Duration,
    outcome: ProbeOutcome,
}

impl ProbeResult {
    fn failed(host: &str, port: u16, variant: Variant, error: ProbeError) -> Self {
        ProbeResult {
            host: host.to_string(),
            port,
            variant,
            elapsed: Duration::ZERO,
            outcome: ProbeOutcome::Failed(error),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self.outcome, ProbeOutcome::Established(_))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    /// Wall time of the whole exchange.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn outcome(&self) -> &ProbeOutcome {
        &self.outcome
    }

    pub fn handshake(&self) -> Option<&Handshake> {
        match &self.outcome {
            ProbeOutcome::Established(handshake) => Some(handshake),
            ProbeOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ProbeError> {
        match &self.outcome {
            ProbeOutcome::Established(_) => None,
            ProbeOutcome::Failed(err) => Some(err),
        }
    }
}

fn run(request: &ProbeRequest, deadline: &Deadline) -> Result<Handshake, ProbeError> {
    let session = match request.variant {
        Variant::Tls => {
            let stream = transport::dial(&request.host, request.port, deadline)?;
            deadline.arm(&stream, "TLS handshake")?;
            tls::handshake(stream, &request.server_name, request.verify, deadline)?
        }
        Variant::PostgresStartTls => starttls::establish::<Postgres>(request, deadline)?,
        Variant::LdapStartTls => starttls::establish::<Ldap>(request, deadline)?,
    };
    Ok(tls::extract(session.ssl(), &request.server_name))
}

/// Runs one probe. Never panics on network conditions; every failure ends up
/// in the returned result.
pub fn probe(request: &ProbeRequest) -> ProbeResult {
    debug!(
        host = %request.host,
        port = request.port,
        variant = %request.variant,
        server_name = %request.server_name,
        verify = request.verify,
        scope = %request.deadline_scope,
        "starting probe"
    );
    let deadline = Deadline::start(request.timeout, request.deadline_scope);
    let outcome = match run(request, &deadline) {
        Ok(handshake) => {
            info!(
                host = %request.host,
                port = request.port,
                version = %handshake.version,
                cipher = %handshake.cipher_suite,
                "handshake established"
            );
            ProbeOutcome::Established(handshake)
        }
        Err(err) => {
            info!(
                host = %request.host,
                port = request.port,
                stage = err.stage(),
                error = %err,
                "probe failed"
            );
            ProbeOutcome::Failed(err)
        }
    };

    ProbeResult {
        host: request.host.clone(),
        port: request.port,
        variant: request.variant,
        elapsed: deadline.elapsed(),
        outcome,
    }
}

fn probe_or_fail(
    host: &str,
    port: u16,
    variant: Variant,
    request: Result<ProbeRequest, ProbeError>,
) -> ProbeResult {
    match request {
        Ok(request) => probe(&request),
        Err(err) => ProbeResult::failed(host, port, variant, err),
    }
}

/// TLS handshake with certificate and hostname verification, SNI = `host`.
pub fn tls_handshake(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    probe_or_fail(
        host,
        port,
        Variant::Tls,
        ProbeRequest::new(host, port, timeout, Variant::Tls),
    )
}

/// TLS handshake that accepts any certificate.
pub fn tls_handshake_insecure(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    probe_or_fail(
        host,
        port,
        Variant::Tls,
        ProbeRequest::new(host, port, timeout, Variant::Tls)
            .map(|request| request.with_verification(false)),
    )
}

/// Verifying TLS handshake announcing `sni` instead of `host`.
pub fn tls_handshake_with_sni(host: &str, port: u16, sni: &str, timeout: Duration) -> ProbeResult {
    probe_or_fail(
        host,
        port,
        Variant::Tls,
        ProbeRequest::new(host, port, timeout, Variant::Tls)
            .and_then(|request| request.with_server_name(sni)),
    )
}

/// PostgreSQL SSLRequest upgrade followed by a verifying handshake.
pub fn postgres_starttls(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    probe_or_fail(
        host,
        port,
        Variant::PostgresStartTls,
        ProbeRequest::new(host, port, timeout, Variant::PostgresStartTls),
    )
}

/// LDAP StartTLS upgrade followed by a verifying handshake.
pub fn ldap_starttls(host: &str, port: u16, timeout: Duration) -> ProbeResult {
    probe_or_fail(
        host,
        port,
        Variant::LdapStartTls,
        ProbeRequest::new(host, port, timeout, Variant::LdapStartTls),
    )
}

/// Checks that a TCP connection to `host:port` can be opened within `timeout`.
///
/// The connection is closed straight away; the connect time is returned.
pub fn check_tcp(host: &str, port: u16, timeout: Duration) -> Result<Duration, ProbeError> {
    let request = ProbeRequest::new(host, port, timeout, Variant::Tls)?;
    let deadline = Deadline::start(request.timeout, DeadlineScope::Dial);
    let stream = transport::dial(&request.host, request.port, &deadline)?;
    let elapsed = deadline.elapsed();
    drop(stream);
    debug!(host, port, ?elapsed, "TCP connection successful");
    Ok(elapsed)
}

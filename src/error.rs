//! Error types for connectivity and TLS handshake probes.
//!
//! Every variant names the stage of the exchange at which the probe stopped,
//! so the rendered message alone tells the operator where things went wrong.

use std::fmt;
use std::io;
use std::time::Duration;

/// Error type for probe failures.
///
/// A probe never retries: whichever of these is produced first ends the
/// attempt and is carried inside the failed [`crate::ProbeResult`].
#[derive(Debug)]
pub enum ProbeError {
    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection failed to the target address
    ConnectionFailed {
        /// The address (host:port) that connection failed to
        address: String,
        /// Time spent before the failure was reported
        elapsed: Duration,
        /// The underlying I/O error
        source: io::Error,
    },

    /// The deadline ran out before a stage could finish
    Timeout {
        /// Description of which operation timed out
        operation: String,
        /// The configured timeout
        limit: Duration,
    },

    /// Sending or reading the STARTTLS upgrade exchange failed at the socket level
    UpgradeIo {
        /// Wire protocol being upgraded (postgres, ldap)
        protocol: &'static str,
        /// What the probe was doing, e.g. "send SSL request"
        stage: &'static str,
        /// The underlying I/O error
        source: io::Error,
    },

    /// The server answered the upgrade request but did not grant it
    UpgradeRejected {
        /// Wire protocol being upgraded (postgres, ldap)
        protocol: &'static str,
        /// Why the reply was not accepted
        reason: String,
    },

    /// TLS handshake failed
    HandshakeFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// Invalid input provided to the API
    InvalidInput {
        /// Which field/parameter was invalid
        field: String,
        /// Why it was invalid
        reason: String,
    },

    /// OpenSSL error occurred while preparing the TLS client
    OpenSSLError {
        /// The underlying OpenSSL error
        details: String,
    },

    /// Generic I/O error
    IoError {
        /// The underlying I/O error
        source: io::Error,
    },
}

impl ProbeError {
    /// Short name of the stage that produced the error, used as a metrics label.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::DnsResolution { .. } => "resolve",
            Self::ConnectionFailed { .. } => "connect",
            Self::Timeout { .. } => "timeout",
            Self::UpgradeIo { .. } | Self::UpgradeRejected { .. } => "starttls",
            Self::HandshakeFailed { .. } | Self::OpenSSLError { .. } => "handshake",
            Self::InvalidInput { .. } => "input",
            Self::IoError { .. } => "io",
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { hostname, source } => {
                write!(f, "failed to resolve hostname {}: {}", hostname, source)
            }
            Self::ConnectionFailed {
                address,
                elapsed,
                source,
            } => {
                write!(
                    f,
                    "failed to connect to {} after {:?}: {}",
                    address, elapsed, source
                )
            }
            Self::Timeout { operation, limit } => {
                write!(f, "{} timed out after {:?}", operation, limit)
            }
            Self::UpgradeIo {
                protocol,
                stage,
                source,
            } => {
                write!(f, "failed to {} ({} STARTTLS): {}", stage, protocol, source)
            }
            Self::UpgradeRejected { protocol, reason } => {
                write!(f, "{} STARTTLS rejected: {}", protocol, reason)
            }
            Self::HandshakeFailed { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::InvalidInput { field, reason } => {
                write!(f, "Invalid input for '{}': {}", field, reason)
            }
            Self::OpenSSLError { details } => {
                write!(f, "OpenSSL error: {}", details)
            }
            Self::IoError { source } => {
                write!(f, "I/O error: {}", source)
            }
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution { source, .. } => Some(source),
            Self::ConnectionFailed { source, .. } => Some(source),
            Self::UpgradeIo { source, .. } => Some(source),
            Self::IoError { source } => Some(source),
            _ => None,
        }
    }
}

impl From<io::Error> for ProbeError {
    fn from(e: io::Error) -> Self {
        Self::IoError { source: e }
    }
}

impl From<openssl::error::ErrorStack> for ProbeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::OpenSSLError {
            details: e.to_string(),
        }
    }
}

impl<S: fmt::Debug> From<openssl::ssl::HandshakeError<S>> for ProbeError {
    fn from(e: openssl::ssl::HandshakeError<S>) -> Self {
        Self::HandshakeFailed {
            details: format!("{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProbeError::InvalidInput {
            field: "host".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid input for 'host': cannot be empty");
    }

    #[test]
    fn test_io_error_has_stage() {
        let err: ProbeError = io::Error::from(io::ErrorKind::InvalidInput).into();
        assert!(err.to_string().starts_with("I/O error:"));
        assert_eq!(err.stage(), "io");
    }

    #[test]
    fn test_connection_failed_names_address() {
        let err = ProbeError::ConnectionFailed {
            address: "db.internal:5432".to_string(),
            elapsed: Duration::from_millis(3),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("failed to connect to db.internal:5432 after"));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.stage(), "connect");
    }

    #[test]
    fn test_upgrade_errors_name_protocol() {
        let err = ProbeError::UpgradeIo {
            protocol: "postgres",
            stage: "send SSL request",
            source: io::Error::from(io::ErrorKind::BrokenPipe),
        };
        assert!(err.to_string().starts_with("failed to send SSL request (postgres STARTTLS)"));

        let err = ProbeError::UpgradeRejected {
            protocol: "ldap",
            reason: "invalid STARTTLS response length: 4".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "ldap STARTTLS rejected: invalid STARTTLS response length: 4"
        );
        assert_eq!(err.stage(), "starttls");
    }
}

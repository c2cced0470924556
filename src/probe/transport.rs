//! Plain TCP establishment and deadline bookkeeping shared by every probe.

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use tracing::debug;

use crate::error::ProbeError;

/// How far the configured timeout reaches into the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeadlineScope {
    /// One deadline bounds dial, upgrade exchange and TLS handshake.
    #[default]
    Exchange,
    /// Only the TCP dial is bounded; later reads and writes may block.
    Dial,
}

/// A single deadline started when the probe begins.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
    scope: DeadlineScope,
}

impl Deadline {
    pub fn start(limit: Duration, scope: DeadlineScope) -> Self {
        Deadline {
            started: Instant::now(),
            limit,
            scope,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Time left before the deadline, or a `Timeout` naming `operation`.
    pub fn remaining(&self, operation: &str) -> Result<Duration, ProbeError> {
        match self.limit.checked_sub(self.elapsed()) {
            Some(left) if !left.is_zero() => Ok(left),
            _ => Err(self.expired(operation)),
        }
    }

    pub fn expired(&self, operation: &str) -> ProbeError {
        ProbeError::Timeout {
            operation: operation.to_string(),
            limit: self.limit,
        }
    }

    /// Re-bounds socket reads and writes before the next stage of the exchange.
    ///
    /// Socket timeouts are per call, so each stage gets whatever is left of
    /// the deadline at the moment it starts.
    pub fn arm(&self, stream: &TcpStream, operation: &str) -> Result<(), ProbeError> {
        let bound = match self.scope {
            DeadlineScope::Dial => None,
            DeadlineScope::Exchange => Some(self.remaining(operation)?),
        };
        stream.set_read_timeout(bound)?;
        stream.set_write_timeout(bound)?;
        Ok(())
    }
}

/// Whether an I/O error came from an expired socket timeout.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

fn resolve(host: &str, port: u16) -> Result<Vec<SocketAddr>, ProbeError> {
    let addrs: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ProbeError::DnsResolution {
            hostname: host.to_string(),
            source,
        })?
        .collect();
    if addrs.is_empty() {
        return Err(ProbeError::DnsResolution {
            hostname: host.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        });
    }
    Ok(addrs)
}

/// Opens a TCP connection to `host:port` within the deadline.
///
/// Resolved addresses are tried in order; the first that accepts wins. No
/// attempt is repeated.
pub fn dial(host: &str, port: u16, deadline: &Deadline) -> Result<TcpStream, ProbeError> {
    let address = format!("{}:{}", host, port);
    let operation = format!("TCP connection to {}", address);
    let mut last_error = None;

    for addr in resolve(host, port)? {
        let left = deadline.remaining(&operation)?;
        match TcpStream::connect_timeout(&addr, left) {
            Ok(stream) => {
                debug!(%address, peer = %addr, elapsed = ?deadline.elapsed(), "connected");
                return Ok(stream);
            }
            Err(err) => {
                debug!(%address, peer = %addr, error = %err, "connect attempt failed");
                last_error = Some(err);
            }
        }
    }

    let source = last_error
        .unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable));
    if is_timeout(&source) {
        return Err(deadline.expired(&operation));
    }
    Err(ProbeError::ConnectionFailed {
        address,
        elapsed: deadline.elapsed(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_remaining_reports_timeout_once_expired() {
        let deadline = Deadline::start(Duration::ZERO, DeadlineScope::Exchange);
        match deadline.remaining("TLS handshake") {
            Err(ProbeError::Timeout { operation, .. }) => assert_eq!(operation, "TLS handshake"),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_dial_and_arm() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let deadline = Deadline::start(Duration::from_secs(5), DeadlineScope::Exchange);

        let stream = dial("127.0.0.1", port, &deadline).unwrap();
        deadline.arm(&stream, "read").unwrap();
        let bound = stream.read_timeout().unwrap().unwrap();
        assert!(bound <= Duration::from_secs(5));

        let unbounded = Deadline::start(Duration::from_secs(5), DeadlineScope::Dial);
        unbounded.arm(&stream, "read").unwrap();
        assert_eq!(stream.read_timeout().unwrap(), None);
    }

    #[test]
    fn test_dial_refused() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let deadline = Deadline::start(Duration::from_secs(2), DeadlineScope::Exchange);
        let err = dial("127.0.0.1", port, &deadline).unwrap_err();
        assert!(
            err.to_string().contains(&format!("127.0.0.1:{}", port)),
            "unexpected error: {}",
            err
        );
    }

    #[test]
    fn test_scope_from_str() {
        assert_eq!("dial".parse::<DeadlineScope>().unwrap(), DeadlineScope::Dial);
        assert_eq!(DeadlineScope::default().to_string(), "exchange");
    }
}

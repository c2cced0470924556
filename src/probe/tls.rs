use openssl::ssl::{HandshakeError, SslConnector, SslMethod, SslRef, SslStream, SslVerifyMode};
use std::fmt::Debug;
use std::io::{Read, Write};
use tracing::debug;

use crate::error::ProbeError;
use crate::names::{CipherSuite, ProtocolVersion};
use crate::probe::transport::{self, Deadline};
use crate::probe::Handshake;

fn connector(verify: bool) -> Result<SslConnector, ProbeError> {
    let mut builder = SslConnector::builder(SslMethod::tls_client())?;
    if !verify {
        builder.set_verify(SslVerifyMode::NONE);
    }
    Ok(builder.build())
}

/// Runs a TLS client handshake over an already connected stream.
///
/// `server_name` is sent as SNI (unless it is an IP literal) and, when
/// `verify` is set, the peer certificate must chain to a trusted root and
/// match it. A socket timeout while waiting for the peer is reported as the
/// deadline expiring.
pub(crate) fn handshake<S>(
    stream: S,
    server_name: &str,
    verify: bool,
    deadline: &Deadline,
) -> Result<SslStream<S>, ProbeError>
where
    S: Read + Write + Debug,
{
    let config = connector(verify)?
        .configure()?
        .verify_hostname(verify);
    let session = config
        .connect(server_name, stream)
        .map_err(|err| match err {
            HandshakeError::WouldBlock(_) => deadline.expired("TLS handshake"),
            HandshakeError::Failure(ref mid)
                if mid.error().io_error().map_or(false, transport::is_timeout) =>
            {
                deadline.expired("TLS handshake")
            }
            other => ProbeError::from(other),
        })?;
    debug!(server_name, verify, "TLS handshake complete");
    Ok(session)
}

/// Reads the negotiated parameters from an established session.
///
/// The server name is the one configured for the attempt, not re-read from
/// the session.
pub(crate) fn extract(ssl: &SslRef, server_name: &str) -> Handshake {
    let version = ProtocolVersion::from_ssl(ssl.version2());
    let cipher_suite = ssl
        .current_cipher()
        .map(|cipher| u16::from_be_bytes(cipher.protocol_id()))
        .unwrap_or(0);
    // On the client side the chain includes the leaf.
    let peer_certificates = match ssl.peer_cert_chain() {
        Some(chain) => chain.len(),
        None => usize::from(ssl.peer_certificate().is_some()),
    };

    Handshake {
        version,
        cipher_suite: CipherSuite(cipher_suite),
        server_name: server_name.to_string(),
        peer_certificates,
    }
}

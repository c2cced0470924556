//! In-band upgrade of a plaintext connection to TLS.
//!
//! Both supported protocols go through the same four states:
//! `Disconnected -> PlaintextConnected -> UpgradeRequested -> SecureEstablished`.
//! Any failure along the way ends the attempt; there is no fallback to
//! plaintext and no second try.

use openssl::ssl::SslStream;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use strum_macros::Display;
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::probe::transport::{self, Deadline};
use crate::probe::{tls, ProbeRequest};

/// PostgreSQL SSLRequest: length 8 followed by the request code 80877103.
pub const POSTGRES_SSL_REQUEST: [u8; 8] = [0x00, 0x00, 0x00, 0x08, 0x04, 0xd2, 0x16, 0x2f];

/// Object identifier naming the LDAP StartTLS extended operation.
pub const LDAP_STARTTLS_OID: &str = "1.3.6.1.4.1.1466.20037";

/// LDAPMessage carrying an ExtendedRequest for StartTLS, messageID 1.
pub const LDAP_STARTTLS_REQUEST: [u8; 31] = [
    0x30, 0x1d, // SEQUENCE, length 29
    0x02, 0x01, 0x01, // messageID 1
    0x77, 0x18, // [APPLICATION 23] ExtendedRequest, length 24
    0x80, 0x16, // [0] requestName, length 22
    b'1', b'.', b'3', b'.', b'6', b'.', b'1', b'.', b'4', b'.', b'1', b'.', b'1', b'4', b'6',
    b'6', b'.', b'2', b'0', b'0', b'3', b'7',
];

/// Replies shorter than this are not taken as a grant.
pub const LDAP_MIN_RESPONSE_LEN: usize = 10;

const LDAP_READ_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UpgradeState {
    Disconnected,
    PlaintextConnected,
    UpgradeRequested,
    SecureEstablished,
}

/// Why the server's answer to the upgrade request was not a grant.
#[derive(Debug)]
pub enum GrantError {
    Io(io::Error),
    Rejected(String),
}

impl From<io::Error> for GrantError {
    fn from(e: io::Error) -> Self {
        GrantError::Io(e)
    }
}

/// A wire protocol that can ask its server to switch to TLS in-band.
pub trait Upgrade {
    /// Protocol name used in errors and log fields.
    const PROTOCOL: &'static str;
    /// Byte-exact request frame written on the plaintext connection.
    const REQUEST: &'static [u8];
    const SEND_STAGE: &'static str;
    const READ_STAGE: &'static str;

    /// Reads the server's answer and decides whether the upgrade was granted.
    fn read_grant<R: Read>(reader: &mut R) -> Result<(), GrantError>;
}

/// PostgreSQL SSLRequest exchange.
pub struct Postgres;

impl Upgrade for Postgres {
    const PROTOCOL: &'static str = "postgres";
    const REQUEST: &'static [u8] = &POSTGRES_SSL_REQUEST;
    const SEND_STAGE: &'static str = "send SSL request";
    const READ_STAGE: &'static str = "read SSL response";

    fn read_grant<R: Read>(reader: &mut R) -> Result<(), GrantError> {
        let mut response = [0u8; 1];
        reader.read_exact(&mut response)?;
        match response[0] {
            b'S' => Ok(()),
            other => Err(GrantError::Rejected(format!(
                "server does not support SSL (response: {:?} 0x{:02x})",
                char::from(other),
                other
            ))),
        }
    }
}

/// LDAP StartTLS extended operation.
pub struct Ldap;

impl Upgrade for Ldap {
    const PROTOCOL: &'static str = "ldap";
    const REQUEST: &'static [u8] = &LDAP_STARTTLS_REQUEST;
    const SEND_STAGE: &'static str = "send STARTTLS request";
    const READ_STAGE: &'static str = "read STARTTLS response";

    /// Any reply of at least [`LDAP_MIN_RESPONSE_LEN`] bytes counts as a grant.
    ///
    /// The envelope is only decoded for the debug log; a non-zero resultCode
    /// does not stop the probe from attempting the handshake.
    fn read_grant<R: Read>(reader: &mut R) -> Result<(), GrantError> {
        let mut response = [0u8; LDAP_READ_BUFFER];
        let n = loop {
            match reader.read(&mut response) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        };
        if n == 0 {
            return Err(GrantError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before any response",
            )));
        }
        if n < LDAP_MIN_RESPONSE_LEN {
            return Err(GrantError::Rejected(format!(
                "invalid STARTTLS response length: {}",
                n
            )));
        }

        match extended_response_code(&response[..n]) {
            Some(0) => debug!(len = n, "StartTLS extended response: success"),
            Some(code) => warn!(
                len = n,
                result_code = code,
                "StartTLS extended response carries an error code, attempting handshake anyway"
            ),
            None => debug!(
                len = n,
                "reply is not an ExtendedResponse, attempting handshake anyway"
            ),
        }
        Ok(())
    }
}

/// Skips a BER length at `pos`, returning the position after it and the length.
fn read_length(data: &[u8], pos: usize) -> Option<(usize, usize)> {
    let first = *data.get(pos)?;
    if first < 0x80 {
        return Some((pos + 1, usize::from(first)));
    }
    let octets = usize::from(first & 0x7f);
    if octets == 0 || octets > 4 {
        return None;
    }
    let bytes = data.get(pos + 1..pos + 1 + octets)?;
    let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b));
    Some((pos + 1 + octets, len))
}

/// resultCode of an LDAP ExtendedResponse, if `reply` starts with one.
pub fn extended_response_code(reply: &[u8]) -> Option<u8> {
    if *reply.first()? != 0x30 {
        return None;
    }
    let (pos, _) = read_length(reply, 1)?;
    // messageID INTEGER
    if *reply.get(pos)? != 0x02 {
        return None;
    }
    let (pos, id_len) = read_length(reply, pos + 1)?;
    let pos = pos + id_len;
    // [APPLICATION 24] ExtendedResponse
    if *reply.get(pos)? != 0x78 {
        return None;
    }
    let (pos, _) = read_length(reply, pos + 1)?;
    // resultCode ENUMERATED
    if *reply.get(pos)? != 0x0a {
        return None;
    }
    let (pos, code_len) = read_length(reply, pos + 1)?;
    if code_len != 1 {
        return None;
    }
    reply.get(pos).copied()
}

fn step(protocol: &'static str, from: UpgradeState, to: UpgradeState) -> UpgradeState {
    debug!(protocol, %from, %to, "STARTTLS state change");
    to
}

fn io_failure<U: Upgrade>(
    stage: &'static str,
    deadline: &Deadline,
    source: io::Error,
) -> ProbeError {
    if transport::is_timeout(&source) {
        return deadline.expired(&format!("{} ({} STARTTLS)", stage, U::PROTOCOL));
    }
    ProbeError::UpgradeIo {
        protocol: U::PROTOCOL,
        stage,
        source,
    }
}

/// Dials plaintext, performs the `U` upgrade exchange and the TLS handshake
/// on the same connection.
pub(crate) fn establish<U: Upgrade>(
    request: &ProbeRequest,
    deadline: &Deadline,
) -> Result<SslStream<TcpStream>, ProbeError> {
    let mut state = UpgradeState::Disconnected;

    let mut stream = transport::dial(request.host(), request.port(), deadline)?;
    state = step(U::PROTOCOL, state, UpgradeState::PlaintextConnected);

    deadline.arm(&stream, U::SEND_STAGE)?;
    stream
        .write_all(U::REQUEST)
        .and_then(|_| stream.flush())
        .map_err(|e| io_failure::<U>(U::SEND_STAGE, deadline, e))?;
    state = step(U::PROTOCOL, state, UpgradeState::UpgradeRequested);

    deadline.arm(&stream, U::READ_STAGE)?;
    U::read_grant(&mut stream).map_err(|err| match err {
        GrantError::Io(e) => io_failure::<U>(U::READ_STAGE, deadline, e),
        GrantError::Rejected(reason) => ProbeError::UpgradeRejected {
            protocol: U::PROTOCOL,
            reason,
        },
    })?;

    deadline.arm(&stream, "TLS handshake")?;
    let session = tls::handshake(stream, request.server_name(), request.verify(), deadline)?;
    step(U::PROTOCOL, state, UpgradeState::SecureEstablished);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_postgres_frame_is_byte_exact() {
        assert_eq!(
            Postgres::REQUEST,
            &[0x00, 0x00, 0x00, 0x08, 0x04, 0xD2, 0x16, 0x2F][..]
        );
        let length = u32::from_be_bytes([
            POSTGRES_SSL_REQUEST[0],
            POSTGRES_SSL_REQUEST[1],
            POSTGRES_SSL_REQUEST[2],
            POSTGRES_SSL_REQUEST[3],
        ]);
        assert_eq!(length as usize, POSTGRES_SSL_REQUEST.len());
    }

    #[test]
    fn test_ldap_frame_is_byte_exact() {
        let mut expected = vec![0x30, 0x1D, 0x02, 0x01, 0x01, 0x77, 0x18, 0x80, 0x16];
        expected.extend_from_slice(b"1.3.6.1.4.1.1466.20037");
        assert_eq!(Ldap::REQUEST, &expected[..]);
        assert_eq!(&LDAP_STARTTLS_REQUEST[9..], LDAP_STARTTLS_OID.as_bytes());
        // outer SEQUENCE length covers everything after its header
        assert_eq!(LDAP_STARTTLS_REQUEST[1] as usize, LDAP_STARTTLS_REQUEST.len() - 2);
    }

    #[test]
    fn test_postgres_grant() {
        assert!(Postgres::read_grant(&mut Cursor::new(b"S")).is_ok());

        match Postgres::read_grant(&mut Cursor::new(b"N")) {
            Err(GrantError::Rejected(reason)) => {
                assert!(reason.contains("server does not support SSL"));
                assert!(reason.contains("'N'"));
                assert!(reason.contains("0x4e"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        match Postgres::read_grant(&mut Cursor::new(b"")) {
            Err(GrantError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_ldap_grant_is_length_only() {
        // arbitrary bytes, not an LDAP message at all
        assert!(Ldap::read_grant(&mut Cursor::new([0xffu8; 10])).is_ok());

        match Ldap::read_grant(&mut Cursor::new([0x30u8; 9])) {
            Err(GrantError::Rejected(reason)) => {
                assert_eq!(reason, "invalid STARTTLS response length: 9")
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        match Ldap::read_grant(&mut Cursor::new(Vec::<u8>::new())) {
            Err(GrantError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn test_extended_response_code() {
        // success with an empty matchedDN and diagnosticMessage
        let ok = [
            0x30, 0x0c, 0x02, 0x01, 0x01, 0x78, 0x07, 0x0a, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00,
        ];
        assert_eq!(extended_response_code(&ok), Some(0));

        // protocolError (2), long-form outer length
        let refused = [
            0x30, 0x81, 0x0c, 0x02, 0x01, 0x01, 0x78, 0x07, 0x0a, 0x01, 0x02, 0x04, 0x00, 0x04,
            0x00,
        ];
        assert_eq!(extended_response_code(&refused), Some(2));

        // BindResponse is not an ExtendedResponse
        let bind = [
            0x30, 0x0c, 0x02, 0x01, 0x01, 0x61, 0x07, 0x0a, 0x01, 0x00, 0x04, 0x00, 0x04, 0x00,
        ];
        assert_eq!(extended_response_code(&bind), None);
        assert_eq!(extended_response_code(&[0x30]), None);
        assert_eq!(extended_response_code(&[]), None);
    }
}

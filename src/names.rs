//! Display names for negotiated TLS protocol versions and cipher suites.

use lazy_static::lazy_static;
use openssl::ssl::SslVersion;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

lazy_static! {
    static ref CIPHER_SUITES: HashMap<u16, &'static str> = {
        let mut m = HashMap::new();
        m.insert(0x0004, "TLS_RSA_WITH_RC4_128_MD5");
        m.insert(0x0005, "TLS_RSA_WITH_RC4_128_SHA");
        m.insert(0x000a, "TLS_RSA_WITH_3DES_EDE_CBC_SHA");
        m.insert(0x002f, "TLS_RSA_WITH_AES_128_CBC_SHA");
        m.insert(0x0035, "TLS_RSA_WITH_AES_256_CBC_SHA");
        m.insert(0x003c, "TLS_RSA_WITH_AES_128_CBC_SHA256");
        m.insert(0x003d, "TLS_RSA_WITH_AES_256_CBC_SHA256");
        m.insert(0x009c, "TLS_RSA_WITH_AES_128_GCM_SHA256");
        m.insert(0x009d, "TLS_RSA_WITH_AES_256_GCM_SHA384");
        m.insert(0xc007, "TLS_ECDHE_ECDSA_WITH_RC4_128_SHA");
        m.insert(0xc009, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA");
        m.insert(0xc00a, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA");
        m.insert(0xc011, "TLS_ECDHE_RSA_WITH_RC4_128_SHA");
        m.insert(0xc013, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA");
        m.insert(0xc014, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA");
        m.insert(0xc023, "TLS_ECDHE_ECDSA_WITH_AES_128_CBC_SHA256");
        m.insert(0xc024, "TLS_ECDHE_ECDSA_WITH_AES_256_CBC_SHA384");
        m.insert(0xc027, "TLS_ECDHE_RSA_WITH_AES_128_CBC_SHA256");
        m.insert(0xc028, "TLS_ECDHE_RSA_WITH_AES_256_CBC_SHA384");
        m.insert(0xc02b, "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256");
        m.insert(0xc02c, "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384");
        m.insert(0xc02f, "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256");
        m.insert(0xc030, "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384");
        m.insert(0x1301, "TLS_AES_128_GCM_SHA256");
        m.insert(0x1302, "TLS_AES_256_GCM_SHA384");
        m.insert(0x1303, "TLS_CHACHA20_POLY1305_SHA256");
        m
    };
}

fn unknown(code: u16) -> String {
    format!("Unknown (0x{:04x})", code)
}

/// Converts a TLS version number to a human-readable string.
pub fn version_name(code: u16) -> String {
    match code {
        0x0300 => "SSL 3.0".to_string(),
        0x0301 => "TLS 1.0".to_string(),
        0x0302 => "TLS 1.1".to_string(),
        0x0303 => "TLS 1.2".to_string(),
        0x0304 => "TLS 1.3".to_string(),
        _ => unknown(code),
    }
}

/// Converts a cipher suite number to a human-readable string.
pub fn cipher_suite_name(code: u16) -> String {
    CIPHER_SUITES
        .get(&code)
        .map(|name| name.to_string())
        .unwrap_or_else(|| unknown(code))
}

/// Negotiated protocol version of an established session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    Ssl3,
    Tls10,
    Tls11,
    Tls12,
    Tls13,
    Unknown(u16),
}

impl ProtocolVersion {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0300 => Self::Ssl3,
            0x0301 => Self::Tls10,
            0x0302 => Self::Tls11,
            0x0303 => Self::Tls12,
            0x0304 => Self::Tls13,
            other => Self::Unknown(other),
        }
    }

    /// Maps OpenSSL's version handle onto the wire code.
    ///
    /// OpenSSL does not expose the raw number, so anything outside the five
    /// known versions (or a session without a version) becomes `Unknown(0)`.
    pub fn from_ssl(version: Option<SslVersion>) -> Self {
        match version {
            Some(v) if v == SslVersion::SSL3 => Self::Ssl3,
            Some(v) if v == SslVersion::TLS1 => Self::Tls10,
            Some(v) if v == SslVersion::TLS1_1 => Self::Tls11,
            Some(v) if v == SslVersion::TLS1_2 => Self::Tls12,
            Some(v) if v == SslVersion::TLS1_3 => Self::Tls13,
            _ => Self::Unknown(0),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            Self::Ssl3 => 0x0300,
            Self::Tls10 => 0x0301,
            Self::Tls11 => 0x0302,
            Self::Tls12 => 0x0303,
            Self::Tls13 => 0x0304,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&version_name(self.code()))
    }
}

impl Serialize for ProtocolVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Negotiated cipher suite, identified by its two-byte IANA code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CipherSuite(pub u16);

impl CipherSuite {
    pub fn code(self) -> u16 {
        self.0
    }
}

impl fmt::Display for CipherSuite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&cipher_suite_name(self.0))
    }
}

impl Serialize for CipherSuite {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

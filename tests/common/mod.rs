//! Loopback servers for the probe integration tests.
#![allow(dead_code)]

use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{NameType, SslAcceptor, SslMethod};
use openssl::x509::{X509Builder, X509NameBuilder, X509};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cipher suite the test acceptor is pinned to.
pub const TEST_CIPHER: &str = "TLS_AES_128_GCM_SHA256";

/// SNI value seen by the server, if any.
pub type SeenServerName = Arc<Mutex<Option<String>>>;

pub fn self_signed(common_name: &str) -> (PKey<Private>, X509) {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_nid(Nid::COMMONNAME, common_name).unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    let serial = BigNum::from_u32(1).unwrap().to_asn1_integer().unwrap();
    builder.set_serial_number(&serial).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(30).unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();
    (key, builder.build())
}

/// TLS 1.3 only acceptor with a single cipher suite and a self-signed
/// certificate for example.com. Records the SNI it receives.
pub fn acceptor() -> (SslAcceptor, SeenServerName) {
    let (key, cert) = self_signed("example.com");
    let mut builder = SslAcceptor::mozilla_modern_v5(SslMethod::tls_server()).unwrap();
    builder.set_private_key(&key).unwrap();
    builder.set_certificate(&cert).unwrap();
    builder.check_private_key().unwrap();
    builder.set_ciphersuites(TEST_CIPHER).unwrap();

    let seen: SeenServerName = Arc::new(Mutex::new(None));
    let record = Arc::clone(&seen);
    builder.set_servername_callback(move |ssl, _alert| {
        *record.lock().unwrap() = ssl.servername(NameType::HOST_NAME).map(str::to_string);
        Ok(())
    });
    (builder.build(), seen)
}

/// Accepts one connection on a fresh loopback port and hands it to `handler`
/// on a background thread.
pub fn serve_once<T, F>(handler: F) -> (u16, JoinHandle<T>)
where
    F: FnOnce(TcpStream) -> T + Send + 'static,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        handler(stream)
    });
    (port, handle)
}

/// A loopback port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

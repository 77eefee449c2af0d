//! Certificate acquisition.
//!
//! The `CertificateProber` trait is the seam: everything above it only
//! sees [`CertificateInfo`] or a [`ProbeError`]. The default
//! implementation performs a TLS handshake via openssl on a blocking
//! thread and reads the leaf certificate's metadata.

use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::ssl::{SslConnector, SslMethod};
use openssl::x509::X509NameRef;
use thiserror::Error;

use crate::certificate::CertificateInfo;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("tls handshake failed: {0}")]
    Handshake(String),

    #[error("openssl error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    #[error("{0}")]
    Internal(String),
}

#[async_trait]
pub trait CertificateProber: Send + Sync {
    async fn probe(&self, host: &str, port: u16) -> Result<CertificateInfo, ProbeError>;
}

/// Handshake-based prober. Certificate validation failures surface as
/// `Handshake` errors, which the check service records as invalid.
pub struct TlsProber {
    timeout: Duration,
}

impl TlsProber {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }
}

#[async_trait]
impl CertificateProber for TlsProber {
    async fn probe(&self, host: &str, port: u16) -> Result<CertificateInfo, ProbeError> {
        let host = host.to_string();
        let timeout = self.timeout;
        let handle =
            tokio::task::spawn_blocking(move || probe_blocking(&host, port, timeout));
        match tokio::time::timeout(timeout * 2, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(ProbeError::Internal(join_err.to_string())),
            Err(_) => Err(ProbeError::Timeout),
        }
    }
}

fn probe_blocking(host: &str, port: u16, timeout: Duration) -> Result<CertificateInfo, ProbeError> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| ProbeError::Connect(e.to_string()))?
        .next()
        .ok_or_else(|| ProbeError::Connect(format!("no address for {host}")))?;
    let stream = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| ProbeError::Connect(e.to_string()))?;
    stream
        .set_read_timeout(Some(timeout))
        .map_err(|e| ProbeError::Connect(e.to_string()))?;
    stream
        .set_write_timeout(Some(timeout))
        .map_err(|e| ProbeError::Connect(e.to_string()))?;

    let connector = SslConnector::builder(SslMethod::tls())?.build();
    let tls = connector
        .connect(host, stream)
        .map_err(|e| ProbeError::Handshake(e.to_string()))?;
    let cert = tls
        .ssl()
        .peer_certificate()
        .ok_or_else(|| ProbeError::Handshake("server sent no certificate".to_string()))?;

    let serial_number = cert
        .serial_number()
        .to_bn()
        .and_then(|bn| bn.to_hex_str().map(|s| s.to_string()))?;
    let fingerprint = cert
        .digest(MessageDigest::sha256())
        .ok()
        .map(|bytes| hex_string(&bytes));

    Ok(CertificateInfo {
        issuer: name_field(cert.issuer_name()),
        subject: name_field(cert.subject_name()),
        serial_number,
        not_before: asn1_to_datetime(cert.not_before())?,
        not_after: asn1_to_datetime(cert.not_after())?,
        fingerprint,
    })
}

/// Prefer the common name, falling back to the organization.
fn name_field(name: &X509NameRef) -> String {
    for nid in [Nid::COMMONNAME, Nid::ORGANIZATIONNAME] {
        if let Some(entry) = name.entries_by_nid(nid).next() {
            if let Ok(text) = entry.data().to_string() {
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }
    "unknown".to_string()
}

fn asn1_to_datetime(time: &Asn1TimeRef) -> Result<DateTime<Utc>, ProbeError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let secs = diff.days as i64 * 86_400 + diff.secs as i64;
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| ProbeError::Internal("certificate timestamp out of range".to_string()))
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn asn1_round_trip() {
        let asn1 = Asn1Time::from_unix(1_750_000_000).unwrap();
        let parsed = asn1_to_datetime(&asn1).unwrap();
        assert_eq!(parsed.timestamp(), 1_750_000_000);
    }

    #[test]
    fn hex_formatting() {
        assert_eq!(hex_string(&[0x00, 0xab, 0x10]), "00ab10");
    }
}

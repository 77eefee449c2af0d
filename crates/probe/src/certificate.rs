//! Certificate metadata and per-site check records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use certwatch_core::Website;

/// Raw metadata extracted from a server's leaf certificate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    pub issuer: String,
    pub subject: String,
    pub serial_number: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslStatus {
    Valid,
    Invalid,
    Expired,
    Revoked,
    Unknown,
}

impl SslStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Expired => "expired",
            Self::Revoked => "revoked",
            Self::Unknown => "unknown",
        }
    }
}

/// How loudly to notify about a certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Critical,
    Warning,
    Info,
    None,
}

/// Outcome of checking one site, successful or not. The latest record
/// per site is what the expiry and health logic works from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub website_id: Uuid,
    pub domain: String,
    pub status: SslStatus,
    pub issuer: Option<String>,
    pub subject: Option<String>,
    pub serial_number: Option<String>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl CertificateRecord {
    pub fn from_probe(site: &Website, info: &CertificateInfo) -> Self {
        let now = Utc::now();
        let status = if now > info.not_after {
            SslStatus::Expired
        } else if now < info.not_before {
            SslStatus::Invalid
        } else {
            SslStatus::Valid
        };
        Self {
            website_id: site.id,
            domain: site.hostname().to_string(),
            status,
            issuer: Some(info.issuer.clone()),
            subject: Some(info.subject.clone()),
            serial_number: Some(info.serial_number.clone()),
            valid_from: Some(info.not_before),
            valid_until: Some(info.not_after),
            error_message: None,
            checked_at: now,
        }
    }

    /// Placeholder record for a failed probe.
    pub fn from_error(site: &Website, message: impl Into<String>) -> Self {
        Self {
            website_id: site.id,
            domain: site.hostname().to_string(),
            status: SslStatus::Invalid,
            issuer: None,
            subject: None,
            serial_number: None,
            valid_from: None,
            valid_until: None,
            error_message: Some(message.into()),
            checked_at: Utc::now(),
        }
    }

    pub fn days_until_expiry(&self) -> Option<i64> {
        self.valid_until.map(|until| (until - Utc::now()).num_days())
    }

    pub fn is_expiring_soon(&self, within_days: i64) -> bool {
        self.status == SslStatus::Valid
            && self
                .days_until_expiry()
                .map_or(false, |days| days <= within_days)
    }

    pub fn urgency(&self) -> Urgency {
        if self.status != SslStatus::Valid {
            return Urgency::Critical;
        }
        match self.days_until_expiry() {
            Some(days) if days <= 1 => Urgency::Critical,
            Some(days) if days <= 7 => Urgency::Warning,
            Some(days) if days <= 30 => Urgency::Info,
            _ => Urgency::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_expiring_in(days: i64) -> CertificateRecord {
        let site = Website::new("example", "example.com");
        let info = CertificateInfo {
            issuer: "Test CA".to_string(),
            subject: "example.com".to_string(),
            serial_number: "01".to_string(),
            not_before: Utc::now() - chrono::Duration::days(30),
            not_after: Utc::now() + chrono::Duration::days(days),
            fingerprint: None,
        };
        CertificateRecord::from_probe(&site, &info)
    }

    #[test]
    fn urgency_tiers() {
        assert_eq!(record_expiring_in(90).urgency(), Urgency::None);
        assert_eq!(record_expiring_in(20).urgency(), Urgency::Info);
        assert_eq!(record_expiring_in(5).urgency(), Urgency::Warning);
        assert_eq!(record_expiring_in(1).urgency(), Urgency::Critical);

        let site = Website::new("broken", "broken.example");
        let failed = CertificateRecord::from_error(&site, "handshake refused");
        assert_eq!(failed.status, SslStatus::Invalid);
        assert_eq!(failed.urgency(), Urgency::Critical);
    }

    #[test]
    fn expired_certificate_detected() {
        let site = Website::new("old", "old.example");
        let info = CertificateInfo {
            issuer: "Test CA".to_string(),
            subject: "old.example".to_string(),
            serial_number: "02".to_string(),
            not_before: Utc::now() - chrono::Duration::days(400),
            not_after: Utc::now() - chrono::Duration::days(10),
            fingerprint: None,
        };
        let record = CertificateRecord::from_probe(&site, &info);
        assert_eq!(record.status, SslStatus::Expired);
        assert!(!record.is_expiring_soon(30));
    }

    #[test]
    fn expiring_soon_window() {
        assert!(record_expiring_in(5).is_expiring_soon(7));
        assert!(!record_expiring_in(15).is_expiring_soon(7));
    }
}

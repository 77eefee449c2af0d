//! SSL certificate probing: metadata types, the prober seam, and the
//! fleet check service.

pub mod certificate;
pub mod prober;
pub mod service;

pub use certificate::{CertificateInfo, CertificateRecord, SslStatus, Urgency};
pub use prober::{CertificateProber, ProbeError, TlsProber};
pub use service::{
    BulkCheckReport, CertificateStore, HealthStatus, HealthSummary, MemoryCertificateStore,
    SslCheckService,
};

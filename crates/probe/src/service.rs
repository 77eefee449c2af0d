//! Fleet-level certificate checking: bounded-concurrency bulk probes,
//! expiring-certificate detection, and the health summary.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use certwatch_core::config::ProbeConfig;
use certwatch_core::Website;

use crate::certificate::{CertificateRecord, SslStatus};
use crate::prober::{CertificateProber, ProbeError};

/// Spacing between per-site retry attempts.
const RETRY_SPACING: Duration = Duration::from_secs(1);

/// Latest check result per website. A database-backed implementation
/// is a collaborator; the in-memory one backs the server and tests.
#[async_trait]
pub trait CertificateStore: Send + Sync {
    async fn upsert(&self, record: CertificateRecord);
    async fn latest(&self, website_id: Uuid) -> Option<CertificateRecord>;
    async fn all_latest(&self) -> Vec<CertificateRecord>;
}

#[derive(Default)]
pub struct MemoryCertificateStore {
    records: RwLock<HashMap<Uuid, CertificateRecord>>,
}

impl MemoryCertificateStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl CertificateStore for MemoryCertificateStore {
    async fn upsert(&self, record: CertificateRecord) {
        self.records.write().await.insert(record.website_id, record);
    }

    async fn latest(&self, website_id: Uuid) -> Option<CertificateRecord> {
        self.records.read().await.get(&website_id).cloned()
    }

    async fn all_latest(&self) -> Vec<CertificateRecord> {
        self.records.read().await.values().cloned().collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkCheckReport {
    pub total_sites: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_seconds: f64,
    pub checked_at: DateTime<Utc>,
    pub results: Vec<CertificateRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Excellent,
    Good,
    Warning,
    Critical,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: HealthStatus,
    pub total_certificates: usize,
    pub valid_count: usize,
    /// Valid certificates expiring within 7 days.
    pub expiring_critical: usize,
    /// Valid certificates expiring within 30 days.
    pub expiring_soon: usize,
    pub status_distribution: HashMap<String, usize>,
}

#[derive(Clone)]
pub struct SslCheckService {
    prober: Arc<dyn CertificateProber>,
    store: Arc<dyn CertificateStore>,
    config: ProbeConfig,
}

impl SslCheckService {
    pub fn new(
        prober: Arc<dyn CertificateProber>,
        store: Arc<dyn CertificateStore>,
        config: ProbeConfig,
    ) -> Self {
        Self {
            prober,
            store,
            config,
        }
    }

    pub fn store(&self) -> Arc<dyn CertificateStore> {
        Arc::clone(&self.store)
    }

    /// Check one site, with one retry when enabled. Probe failures are
    /// folded into an invalid placeholder record; the returned record
    /// is always persisted.
    pub async fn check_site(&self, site: &Website) -> CertificateRecord {
        let attempts = if self.config.retry_failed_checks { 2 } else { 1 };
        let mut last_error: Option<ProbeError> = None;
        for attempt in 1..=attempts {
            match self.prober.probe(site.hostname(), site.port()).await {
                Ok(info) => {
                    let record = CertificateRecord::from_probe(site, &info);
                    tracing::debug!(
                        domain = %record.domain,
                        status = record.status.as_str(),
                        days_left = ?record.days_until_expiry(),
                        "certificate checked"
                    );
                    self.store.upsert(record.clone()).await;
                    return record;
                }
                Err(err) => {
                    tracing::warn!(
                        domain = %site.hostname(),
                        attempt,
                        error = %err,
                        "certificate probe failed"
                    );
                    last_error = Some(err);
                    if attempt < attempts {
                        tokio::time::sleep(RETRY_SPACING).await;
                    }
                }
            }
        }
        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "probe failed".to_string());
        let record = CertificateRecord::from_error(site, message);
        self.store.upsert(record.clone()).await;
        record
    }

    /// Fan out over the given sites with bounded concurrency.
    pub async fn bulk_check(&self, sites: Vec<Website>) -> BulkCheckReport {
        let started = std::time::Instant::now();
        let checked_at = Utc::now();
        let total_sites = sites.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_checks.max(1)));
        let mut handles = Vec::with_capacity(total_sites);
        for site in sites {
            let service = self.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                service.check_site(&site).await
            }));
        }
        let mut results = Vec::with_capacity(total_sites);
        for handle in handles {
            match handle.await {
                Ok(record) => results.push(record),
                Err(err) => tracing::error!(error = %err, "site check task failed"),
            }
        }
        let successful = results
            .iter()
            .filter(|r| r.status == SslStatus::Valid)
            .count();
        let report = BulkCheckReport {
            total_sites,
            successful,
            failed: total_sites - successful,
            duration_seconds: started.elapsed().as_secs_f64(),
            checked_at,
            results,
        };
        tracing::info!(
            total = report.total_sites,
            successful = report.successful,
            failed = report.failed,
            "bulk certificate check finished"
        );
        report
    }

    /// Bucket valid certificates by days-until-expiry. Each certificate
    /// lands in the smallest configured threshold that covers it;
    /// anything beyond the largest threshold is ignored.
    pub async fn detect_expiring(&self, days: &[i64]) -> BTreeMap<i64, Vec<CertificateRecord>> {
        let mut thresholds: Vec<i64> = days.to_vec();
        thresholds.sort_unstable();
        let mut buckets: BTreeMap<i64, Vec<CertificateRecord>> =
            thresholds.iter().map(|d| (*d, Vec::new())).collect();
        for record in self.store.all_latest().await {
            if record.status != SslStatus::Valid {
                continue;
            }
            let Some(left) = record.days_until_expiry() else { continue };
            if left < 0 {
                continue;
            }
            if let Some(threshold) = thresholds.iter().find(|t| left <= **t) {
                if let Some(bucket) = buckets.get_mut(threshold) {
                    bucket.push(record);
                }
            }
        }
        buckets
    }

    pub async fn health_summary(&self) -> HealthSummary {
        let records = self.store.all_latest().await;
        let total = records.len();
        let mut distribution: HashMap<String, usize> = HashMap::new();
        for record in &records {
            *distribution
                .entry(record.status.as_str().to_string())
                .or_default() += 1;
        }
        let valid: Vec<&CertificateRecord> = records
            .iter()
            .filter(|r| r.status == SslStatus::Valid)
            .collect();
        let expiring_critical = valid.iter().filter(|r| r.is_expiring_soon(7)).count();
        let expiring_soon = valid.iter().filter(|r| r.is_expiring_soon(30)).count();
        let status = if total == 0 {
            HealthStatus::Unknown
        } else {
            let valid_ratio = valid.len() as f64 / total as f64;
            let critical_ratio = expiring_critical as f64 / total as f64;
            let warning_ratio = expiring_soon as f64 / total as f64;
            if critical_ratio > 0.1 || valid_ratio < 0.7 {
                HealthStatus::Critical
            } else if warning_ratio > 0.2 || valid_ratio < 0.85 {
                HealthStatus::Warning
            } else if valid_ratio >= 0.95 {
                HealthStatus::Excellent
            } else {
                HealthStatus::Good
            }
        };
        HealthSummary {
            status,
            total_certificates: total,
            valid_count: valid.len(),
            expiring_critical,
            expiring_soon,
            status_distribution: distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::CertificateInfo;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted prober: per-host outcome sequences (`Ok(days until
    /// expiry)` or `Err(message)`), the last outcome repeating.
    struct MockProber {
        plan: HashMap<String, Vec<Result<i64, String>>>,
        calls: Mutex<HashMap<String, usize>>,
        delay: Duration,
        current: AtomicUsize,
        observed_max: AtomicUsize,
    }

    impl MockProber {
        fn new(plan: HashMap<String, Vec<Result<i64, String>>>) -> Arc<Self> {
            Arc::new(Self {
                plan,
                calls: Mutex::new(HashMap::new()),
                delay: Duration::from_millis(50),
                current: AtomicUsize::new(0),
                observed_max: AtomicUsize::new(0),
            })
        }
    }

    fn info_expiring_in(days: i64) -> CertificateInfo {
        CertificateInfo {
            issuer: "Test CA".to_string(),
            subject: "test".to_string(),
            serial_number: "01".to_string(),
            not_before: Utc::now() - chrono::Duration::days(1),
            not_after: Utc::now() + chrono::Duration::days(days),
            fingerprint: None,
        }
    }

    #[async_trait]
    impl CertificateProber for MockProber {
        async fn probe(&self, host: &str, _port: u16) -> Result<CertificateInfo, ProbeError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.observed_max.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            let index = {
                let mut calls = self.calls.lock().unwrap();
                let entry = calls.entry(host.to_string()).or_insert(0);
                let index = *entry;
                *entry += 1;
                index
            };
            let outcomes = self.plan.get(host).expect("unplanned host");
            match &outcomes[index.min(outcomes.len() - 1)] {
                Ok(days) => Ok(info_expiring_in(*days)),
                Err(msg) => Err(ProbeError::Connect(msg.clone())),
            }
        }
    }

    fn service_with(
        prober: Arc<MockProber>,
        config: ProbeConfig,
    ) -> (SslCheckService, Arc<MemoryCertificateStore>) {
        let store = MemoryCertificateStore::new();
        (
            SslCheckService::new(prober, Arc::clone(&store) as _, config),
            store,
        )
    }

    #[tokio::test]
    async fn bulk_check_counts_and_persists_failures() {
        let plan = HashMap::from([
            ("a.example".to_string(), vec![Ok(60)]),
            ("b.example".to_string(), vec![Ok(10)]),
            ("c.example".to_string(), vec![Err("refused".to_string())]),
        ]);
        let (service, store) = service_with(
            MockProber::new(plan),
            ProbeConfig {
                retry_failed_checks: false,
                ..ProbeConfig::default()
            },
        );
        let sites = vec![
            Website::new("a", "a.example"),
            Website::new("b", "b.example"),
            Website::new("c", "c.example"),
        ];
        let bad_id = sites[2].id;
        let report = service.bulk_check(sites).await;
        assert_eq!(report.total_sites, 3);
        assert_eq!(report.successful, 2);
        assert_eq!(report.failed, 1);
        assert!(report.duration_seconds > 0.0);

        let failed = store.latest(bad_id).await.unwrap();
        assert_eq!(failed.status, SslStatus::Invalid);
        assert!(failed.error_message.unwrap().contains("refused"));
    }

    #[tokio::test]
    async fn bulk_check_respects_concurrency_bound() {
        let mut plan = HashMap::new();
        let mut sites = Vec::new();
        for i in 0..6 {
            let host = format!("site{i}.example");
            plan.insert(host.clone(), vec![Ok(90)]);
            sites.push(Website::new(format!("site{i}"), host));
        }
        let prober = MockProber::new(plan);
        let (service, _) = service_with(
            Arc::clone(&prober),
            ProbeConfig {
                max_concurrent_checks: 2,
                ..ProbeConfig::default()
            },
        );
        let report = service.bulk_check(sites).await;
        assert_eq!(report.successful, 6);
        assert!(prober.observed_max.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn retry_recovers_transient_failure() {
        let plan = HashMap::from([(
            "flaky.example".to_string(),
            vec![Err("reset".to_string()), Ok(45)],
        )]);
        let (service, _) = service_with(MockProber::new(plan), ProbeConfig::default());
        let record = service.check_site(&Website::new("flaky", "flaky.example")).await;
        assert_eq!(record.status, SslStatus::Valid);
    }

    #[tokio::test]
    async fn retry_disabled_records_first_failure() {
        let plan = HashMap::from([(
            "flaky.example".to_string(),
            vec![Err("reset".to_string()), Ok(45)],
        )]);
        let (service, _) = service_with(
            MockProber::new(plan),
            ProbeConfig {
                retry_failed_checks: false,
                ..ProbeConfig::default()
            },
        );
        let record = service.check_site(&Website::new("flaky", "flaky.example")).await;
        assert_eq!(record.status, SslStatus::Invalid);
    }

    #[tokio::test]
    async fn detect_expiring_buckets_by_smallest_covering_threshold() {
        let (service, store) = service_with(
            MockProber::new(HashMap::new()),
            ProbeConfig::default(),
        );
        for (name, days) in [("five", 5), ("ten", 10), ("twenty", 20), ("forty", 40)] {
            let site = Website::new(name, format!("{name}.example"));
            store
                .upsert(CertificateRecord::from_probe(&site, &info_expiring_in(days)))
                .await;
        }
        let broken = Website::new("broken", "broken.example");
        store
            .upsert(CertificateRecord::from_error(&broken, "no route"))
            .await;

        let buckets = service.detect_expiring(&[30, 14, 7]).await;
        let names = |day: i64| -> Vec<String> {
            buckets[&day].iter().map(|r| r.domain.clone()).collect()
        };
        assert_eq!(names(7), vec!["five.example"]);
        assert_eq!(names(14), vec!["ten.example"]);
        assert_eq!(names(30), vec!["twenty.example"]);
    }

    #[tokio::test]
    async fn health_summary_scores() {
        let (service, store) = service_with(
            MockProber::new(HashMap::new()),
            ProbeConfig::default(),
        );
        assert_eq!(service.health_summary().await.status, HealthStatus::Unknown);

        for i in 0..20 {
            let site = Website::new(format!("s{i}"), format!("s{i}.example"));
            store
                .upsert(CertificateRecord::from_probe(&site, &info_expiring_in(90)))
                .await;
        }
        let summary = service.health_summary().await;
        assert_eq!(summary.status, HealthStatus::Excellent);
        assert_eq!(summary.total_certificates, 20);
        assert_eq!(summary.valid_count, 20);

        for i in 0..7 {
            let site = Website::new(format!("bad{i}"), format!("bad{i}.example"));
            store
                .upsert(CertificateRecord::from_error(&site, "handshake failed"))
                .await;
        }
        // 20 valid of 27 is below the 0.85 valid-ratio floor.
        assert_eq!(service.health_summary().await.status, HealthStatus::Warning);

        for i in 0..10 {
            let site = Website::new(format!("worse{i}"), format!("worse{i}.example"));
            store
                .upsert(CertificateRecord::from_error(&site, "handshake failed"))
                .await;
        }
        assert_eq!(service.health_summary().await.status, HealthStatus::Critical);
    }
}

//! Expiry notification sweep: grouped expiry warnings per
//! days-until-expiry bucket, plus error alerts for sites whose latest
//! check failed, with a per-site dedupe window.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use certwatch_core::config::NotifyConfig;
use certwatch_probe::{CertificateRecord, SslCheckService, SslStatus};

use crate::templating::{
    ErrorContext, ExpiryContext, SiteContext, TemplateRenderer, DEFAULT_ERROR_BODY,
    DEFAULT_ERROR_SUBJECT, DEFAULT_EXPIRY_BODY, DEFAULT_EXPIRY_SUBJECT,
};
use crate::traits::{Notification, Notifier};

/// A site only gets one error alert per window.
const ERROR_ALERT_DEDUPE_HOURS: i64 = 24;

/// Error alerts only cover checks that happened recently.
const ERROR_ALERT_RECENT_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct NotificationReport {
    pub expiry_notifications: usize,
    pub error_notifications: usize,
    pub total_notifications_sent: usize,
}

pub struct ExpiryNotificationService {
    ssl: SslCheckService,
    notifier: Option<Arc<dyn Notifier>>,
    renderer: TemplateRenderer,
    config: NotifyConfig,
    error_alerts_sent: RwLock<HashMap<Uuid, DateTime<Utc>>>,
}

impl ExpiryNotificationService {
    pub fn new(
        ssl: SslCheckService,
        notifier: Option<Arc<dyn Notifier>>,
        config: NotifyConfig,
    ) -> Self {
        if notifier.is_none() {
            tracing::info!("no notification channel configured, sweeps will be dry runs");
        }
        Self {
            ssl,
            notifier,
            renderer: TemplateRenderer::new(),
            config,
            error_alerts_sent: RwLock::new(HashMap::new()),
        }
    }

    /// One full sweep: grouped expiry notifications for every
    /// configured day bucket, then error alerts for freshly failed
    /// sites.
    pub async fn check_notifications(
        &self,
        days_override: Option<Vec<i64>>,
    ) -> NotificationReport {
        let days = days_override.unwrap_or_else(|| self.config.notification_days.clone());
        let mut expiry_notifications = 0;
        for (days_left, mut records) in self.ssl.detect_expiring(&days).await {
            if records.is_empty() {
                continue;
            }
            records.sort_by(|a, b| a.domain.cmp(&b.domain));
            let ctx = expiry_context(days_left, &records);
            let mut metadata = HashMap::from([
                ("urgency".to_string(), ctx.urgency.clone()),
                ("days_left".to_string(), days_left.to_string()),
            ]);
            metadata.insert(
                "domains".to_string(),
                records
                    .iter()
                    .map(|r| r.domain.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            );
            if self
                .dispatch(DEFAULT_EXPIRY_SUBJECT, DEFAULT_EXPIRY_BODY, &ctx, metadata)
                .await
            {
                expiry_notifications += 1;
            }
        }

        let error_notifications = self.send_error_alerts().await;
        let report = NotificationReport {
            expiry_notifications,
            error_notifications,
            total_notifications_sent: expiry_notifications + error_notifications,
        };
        tracing::info!(
            expiry = report.expiry_notifications,
            errors = report.error_notifications,
            "notification sweep finished"
        );
        report
    }

    /// Alert on sites whose latest check failed within the last hour,
    /// at most once per site per dedupe window.
    async fn send_error_alerts(&self) -> usize {
        let now = Utc::now();
        let mut sent = 0;
        for record in self.ssl.store().all_latest().await {
            if record.status == SslStatus::Valid {
                continue;
            }
            if now - record.checked_at > chrono::Duration::hours(ERROR_ALERT_RECENT_HOURS) {
                continue;
            }
            {
                let alerts = self.error_alerts_sent.read().await;
                if let Some(last) = alerts.get(&record.website_id) {
                    if now - *last < chrono::Duration::hours(ERROR_ALERT_DEDUPE_HOURS) {
                        continue;
                    }
                }
            }
            let ctx = ErrorContext {
                domain: record.domain.clone(),
                error: record
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("certificate is {}", record.status.as_str())),
                checked_at: record.checked_at.to_rfc3339(),
                now: now.to_rfc3339(),
            };
            let metadata = HashMap::from([
                ("urgency".to_string(), "critical".to_string()),
                ("domain".to_string(), record.domain.clone()),
            ]);
            if self
                .dispatch(DEFAULT_ERROR_SUBJECT, DEFAULT_ERROR_BODY, &ctx, metadata)
                .await
            {
                self.error_alerts_sent
                    .write()
                    .await
                    .insert(record.website_id, now);
                sent += 1;
            }
        }
        sent
    }

    /// Render and deliver. Returns whether a notification went out;
    /// render and delivery failures are logged, never propagated.
    async fn dispatch<C: Serialize>(
        &self,
        subject_template: &str,
        body_template: &str,
        ctx: &C,
        metadata: HashMap<String, String>,
    ) -> bool {
        let Some(notifier) = &self.notifier else {
            tracing::debug!("skipping notification, no channel configured");
            return false;
        };
        let rendered = self
            .renderer
            .render(subject_template, ctx)
            .and_then(|subject| {
                self.renderer
                    .render(body_template, ctx)
                    .map(|body| (subject, body))
            });
        let (subject, body) = match rendered {
            Ok(parts) => parts,
            Err(err) => {
                tracing::error!(error = %err, "failed to render notification");
                return false;
            }
        };
        let notification = Notification {
            subject,
            body,
            metadata,
        };
        match notifier.send(&notification).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    channel = notifier.channel_name(),
                    error = %err,
                    "notification delivery failed"
                );
                false
            }
        }
    }
}

fn expiry_context(days_left: i64, records: &[CertificateRecord]) -> ExpiryContext {
    ExpiryContext {
        days_left,
        urgency: urgency_for_bucket(days_left).to_string(),
        site_count: records.len(),
        sites: records
            .iter()
            .map(|r| SiteContext {
                domain: r.domain.clone(),
                issuer: r.issuer.clone(),
                valid_until: r.valid_until.map(|t| t.to_rfc3339()),
                days_left: r.days_until_expiry(),
            })
            .collect(),
        now: Utc::now().to_rfc3339(),
    }
}

fn urgency_for_bucket(days_left: i64) -> &'static str {
    if days_left <= 1 {
        "critical"
    } else if days_left <= 7 {
        "warning"
    } else {
        "info"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::NotifyError;
    use async_trait::async_trait;
    use certwatch_core::config::ProbeConfig;
    use certwatch_core::Website;
    use certwatch_probe::{
        CertificateInfo, CertificateProber, CertificateStore, MemoryCertificateStore, ProbeError,
    };
    use std::sync::Mutex;

    struct MockNotifier {
        sent: Mutex<Vec<Notification>>,
    }

    impl MockNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        fn subjects(&self) -> Vec<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.subject.clone())
                .collect()
        }
    }

    #[async_trait]
    impl Notifier for MockNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(notification.clone());
            Ok(())
        }

        fn channel_name(&self) -> &str {
            "mock"
        }
    }

    struct UnreachableProber;

    #[async_trait]
    impl CertificateProber for UnreachableProber {
        async fn probe(&self, _: &str, _: u16) -> Result<CertificateInfo, ProbeError> {
            Err(ProbeError::Connect("not under test".to_string()))
        }
    }

    fn service_with_store() -> (SslCheckService, Arc<MemoryCertificateStore>) {
        let store = MemoryCertificateStore::new();
        (
            SslCheckService::new(
                Arc::new(UnreachableProber),
                Arc::clone(&store) as _,
                ProbeConfig::default(),
            ),
            store,
        )
    }

    fn valid_record(name: &str, days: i64) -> CertificateRecord {
        let site = Website::new(name, format!("{name}.example"));
        CertificateRecord::from_probe(
            &site,
            &CertificateInfo {
                issuer: "Test CA".to_string(),
                subject: format!("{name}.example"),
                serial_number: "01".to_string(),
                not_before: Utc::now() - chrono::Duration::days(1),
                not_after: Utc::now() + chrono::Duration::days(days),
                fingerprint: None,
            },
        )
    }

    #[tokio::test]
    async fn groups_one_notification_per_bucket() {
        let (ssl, store) = service_with_store();
        store.upsert(valid_record("five", 5)).await;
        store.upsert(valid_record("six", 6)).await;
        store.upsert(valid_record("twenty", 20)).await;
        store.upsert(valid_record("faraway", 200)).await;

        let notifier = MockNotifier::new();
        let service = ExpiryNotificationService::new(
            ssl,
            Some(Arc::clone(&notifier) as _),
            NotifyConfig::default(),
        );
        let report = service.check_notifications(None).await;
        assert_eq!(report.expiry_notifications, 2);
        assert_eq!(report.error_notifications, 0);
        assert_eq!(report.total_notifications_sent, 2);

        let subjects = notifier.subjects();
        assert!(subjects.iter().any(|s| s.contains("within 7 days")));
        assert!(subjects.iter().any(|s| s.contains("within 30 days")));
        let grouped = notifier
            .sent
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.subject.contains("within 7 days"))
            .unwrap()
            .clone();
        assert!(grouped.body.contains("five.example"));
        assert!(grouped.body.contains("six.example"));
        assert_eq!(grouped.metadata["urgency"], "warning");
    }

    #[tokio::test]
    async fn error_alerts_are_deduped_per_site() {
        let (ssl, store) = service_with_store();
        let site = Website::new("down", "down.example");
        store
            .upsert(CertificateRecord::from_error(&site, "connection refused"))
            .await;
        let stale_site = Website::new("stale", "stale.example");
        let mut stale = CertificateRecord::from_error(&stale_site, "old failure");
        stale.checked_at = Utc::now() - chrono::Duration::hours(3);
        store.upsert(stale).await;

        let notifier = MockNotifier::new();
        let service = ExpiryNotificationService::new(
            ssl,
            Some(Arc::clone(&notifier) as _),
            NotifyConfig::default(),
        );

        let first = service.check_notifications(None).await;
        assert_eq!(first.error_notifications, 1);
        assert!(notifier.subjects()[0].contains("down.example"));

        // A second sweep within the dedupe window stays quiet.
        let second = service.check_notifications(None).await;
        assert_eq!(second.error_notifications, 0);
    }

    #[tokio::test]
    async fn no_channel_means_dry_run() {
        let (ssl, store) = service_with_store();
        store.upsert(valid_record("soon", 3)).await;
        let service = ExpiryNotificationService::new(ssl, None, NotifyConfig::default());
        let report = service.check_notifications(None).await;
        assert_eq!(report.total_notifications_sent, 0);
    }

    #[tokio::test]
    async fn day_override_narrows_buckets() {
        let (ssl, store) = service_with_store();
        store.upsert(valid_record("five", 5)).await;
        store.upsert(valid_record("twenty", 20)).await;

        let notifier = MockNotifier::new();
        let service = ExpiryNotificationService::new(
            ssl,
            Some(Arc::clone(&notifier) as _),
            NotifyConfig::default(),
        );
        let report = service.check_notifications(Some(vec![7])).await;
        assert_eq!(report.expiry_notifications, 1);
        assert!(notifier.subjects()[0].contains("within 7 days"));
    }
}

//! Shared application state.
//!
//! All long-lived components are constructed once in `main` and
//! injected here, so handlers and jobs see the same executor,
//! scheduler, and stores.

use std::sync::Arc;

use certwatch_core::{Config, MemoryWebsiteStore, WebsiteStore};
use certwatch_executor::TaskExecutor;
use certwatch_notify::{ExpiryNotificationService, Notifier, WebhookNotifier};
use certwatch_probe::{
    CertificateProber, CertificateStore, MemoryCertificateStore, SslCheckService, TlsProber,
};
use certwatch_scheduler::JobScheduler;

pub struct AppState {
    pub config: Config,
    pub executor: TaskExecutor,
    pub scheduler: JobScheduler,
    pub ssl: SslCheckService,
    pub notifications: Arc<ExpiryNotificationService>,
    pub websites: Arc<dyn WebsiteStore>,
}

impl AppState {
    pub fn build(config: Config) -> anyhow::Result<Arc<Self>> {
        let websites: Arc<dyn WebsiteStore> = MemoryWebsiteStore::new();
        let prober: Arc<dyn CertificateProber> =
            Arc::new(TlsProber::new(config.probe.timeout_secs));
        let cert_store: Arc<dyn CertificateStore> = MemoryCertificateStore::new();
        let ssl = SslCheckService::new(prober, cert_store, config.probe.clone());

        let notifier = match &config.notify.webhook_url {
            Some(url) => {
                let webhook = WebhookNotifier::from_config(url.clone(), None, None)?;
                Some(Arc::new(webhook) as Arc<dyn Notifier>)
            }
            None => None,
        };
        let notifications = Arc::new(ExpiryNotificationService::new(
            ssl.clone(),
            notifier,
            config.notify.clone(),
        ));

        let executor = TaskExecutor::new(config.executor.clone());
        let scheduler = JobScheduler::new(config.scheduler.clone());

        Ok(Arc::new(Self {
            config,
            executor,
            scheduler,
            ssl,
            notifications,
            websites,
        }))
    }
}

//! The standard scheduled jobs and the background-task submit helpers
//! the API uses.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use certwatch_core::{Result, WebsiteStore};
use certwatch_executor::{SubmitOptions, TaskPriority};
use certwatch_notify::ExpiryNotificationService;
use certwatch_probe::SslCheckService;
use certwatch_scheduler::{Job, JobScheduler, JobTrigger};

use crate::state::AppState;

pub const WEEKLY_SSL_CHECK: &str = "weekly_ssl_check";
pub const EXPIRY_NOTIFICATIONS: &str = "expiry_notifications";
pub const SCHEDULER_HEALTH_CHECK: &str = "scheduler_health_check";

/// Bulk-probe every active website.
struct WeeklySslCheckJob {
    ssl: SslCheckService,
    websites: Arc<dyn WebsiteStore>,
}

#[async_trait]
impl Job for WeeklySslCheckJob {
    async fn run(&self) -> anyhow::Result<Value> {
        let sites = self.websites.list_active().await;
        let report = self.ssl.bulk_check(sites).await;
        Ok(serde_json::to_value(report)?)
    }
}

/// Expiry notification sweep over the latest check results.
struct ExpiryNotificationsJob {
    notifications: Arc<ExpiryNotificationService>,
}

#[async_trait]
impl Job for ExpiryNotificationsJob {
    async fn run(&self) -> anyhow::Result<Value> {
        let report = self.notifications.check_notifications(None).await;
        Ok(serde_json::to_value(report)?)
    }
}

/// Snapshot of the scheduler's own registry, kept as a job so the
/// snapshot lands in the job-result history like everything else.
struct SchedulerHealthJob {
    scheduler: JobScheduler,
}

#[async_trait]
impl Job for SchedulerHealthJob {
    async fn run(&self) -> anyhow::Result<Value> {
        Ok(self.scheduler.get_job_status().await)
    }
}

pub async fn register_standard_jobs(state: &Arc<AppState>) -> Result<()> {
    let cfg = &state.config.scheduler;
    state
        .scheduler
        .register(
            WEEKLY_SSL_CHECK,
            "Weekly SSL certificate check",
            JobTrigger::weekly(cfg.weekly_check_day, &cfg.weekly_check_time)?,
            Arc::new(WeeklySslCheckJob {
                ssl: state.ssl.clone(),
                websites: Arc::clone(&state.websites),
            }),
        )
        .await?;
    state
        .scheduler
        .register(
            EXPIRY_NOTIFICATIONS,
            "Certificate expiry notifications",
            JobTrigger::interval_secs(cfg.notification_interval_hours * 3600)?,
            Arc::new(ExpiryNotificationsJob {
                notifications: Arc::clone(&state.notifications),
            }),
        )
        .await?;
    state
        .scheduler
        .register(
            SCHEDULER_HEALTH_CHECK,
            "Scheduler health check",
            JobTrigger::interval_secs(3600)?,
            Arc::new(SchedulerHealthJob {
                scheduler: state.scheduler.clone(),
            }),
        )
        .await?;
    Ok(())
}

/// Submit a bulk certificate check as a background task. An explicit
/// id list narrows the sweep; otherwise every active site is checked.
pub async fn submit_ssl_check_task(
    state: &Arc<AppState>,
    website_ids: Option<Vec<Uuid>>,
    priority: TaskPriority,
) -> String {
    let ssl = state.ssl.clone();
    let websites = Arc::clone(&state.websites);
    state
        .executor
        .submit_fn(
            move || {
                let ssl = ssl.clone();
                let websites = Arc::clone(&websites);
                let ids = website_ids.clone();
                async move {
                    let sites = match ids {
                        Some(ids) => {
                            let mut sites = Vec::with_capacity(ids.len());
                            for id in ids {
                                sites.push(websites.get(id).await?);
                            }
                            sites
                        }
                        None => websites.list_active().await,
                    };
                    let report = ssl.bulk_check(sites).await;
                    Ok(serde_json::to_value(report)?)
                }
            },
            SubmitOptions::named("ssl_check_all_websites")
                .priority(priority)
                .timeout_secs(600),
        )
        .await
}

/// Submit a notification sweep as a background task.
pub async fn submit_notification_task(
    state: &Arc<AppState>,
    days: Option<Vec<i64>>,
    priority: TaskPriority,
) -> String {
    let notifications = Arc::clone(&state.notifications);
    state
        .executor
        .submit_fn(
            move || {
                let notifications = Arc::clone(&notifications);
                let days = days.clone();
                async move {
                    let report = notifications.check_notifications(days).await;
                    Ok(serde_json::to_value(report)?)
                }
            },
            SubmitOptions::named("expiry_notification_sweep")
                .priority(priority)
                .timeout_secs(300),
        )
        .await
}

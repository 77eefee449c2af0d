//! Environment-driven configuration.
//!
//! Every knob is read from the process environment with a sensible
//! default, so the binary runs with zero configuration in development
//! while staying tunable in deployment. `.env` files are honored via
//! [`load_dotenv`].

use crate::error::{CertwatchError, Result};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CertwatchError::config(format!("invalid value for {key}: {raw:?}"))),
        Err(_) => Ok(default),
    }
}

/// Load a `.env` file if one exists. Missing files are fine; malformed
/// ones are reported.
pub fn load_dotenv() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::debug!(path = %path.display(), "loaded .env file");
            Ok(())
        }
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(CertwatchError::config(format!("failed to load .env: {err}"))),
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 3001)?,
            cors_origin: env_or("CORS_ORIGIN", "*"),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            cors_origin: "*".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub max_concurrent_tasks: usize,
    pub default_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub max_result_age_secs: u64,
}

impl ExecutorConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            max_concurrent_tasks: env_parse("MAX_CONCURRENT_TASKS", 5)?,
            default_timeout_secs: env_parse("TASK_DEFAULT_TIMEOUT_SECS", 300)?,
            cleanup_interval_secs: env_parse("TASK_CLEANUP_INTERVAL_SECS", 3600)?,
            max_result_age_secs: env_parse("TASK_MAX_RESULT_AGE_SECS", 86_400)?,
        })
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 5,
            default_timeout_secs: 300,
            cleanup_interval_secs: 3600,
            max_result_age_secs: 86_400,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Descriptive label only; all cron evaluation happens in UTC.
    pub timezone: String,
    /// Day of week for the weekly certificate sweep, 0 = Sunday.
    pub weekly_check_day: u8,
    /// Time of day for the weekly sweep, `HH:MM`.
    pub weekly_check_time: String,
    pub notification_interval_hours: u64,
    pub misfire_grace_secs: u64,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            timezone: env_or("SCHEDULER_TIMEZONE", "Asia/Seoul"),
            weekly_check_day: env_parse("WEEKLY_CHECK_DAY", 1)?,
            weekly_check_time: env_or("WEEKLY_CHECK_TIME", "09:00"),
            notification_interval_hours: env_parse("NOTIFICATION_CHECK_INTERVAL_HOURS", 24)?,
            misfire_grace_secs: env_parse("MISFIRE_GRACE_SECS", 30)?,
        };
        if cfg.weekly_check_day > 6 {
            return Err(CertwatchError::config(format!(
                "WEEKLY_CHECK_DAY must be 0-6, got {}",
                cfg.weekly_check_day
            )));
        }
        if cfg.notification_interval_hours == 0 {
            return Err(CertwatchError::config(
                "NOTIFICATION_CHECK_INTERVAL_HOURS must be positive",
            ));
        }
        Ok(cfg)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Seoul".to_string(),
            weekly_check_day: 1,
            weekly_check_time: "09:00".to_string(),
            notification_interval_hours: 24,
            misfire_grace_secs: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub timeout_secs: u64,
    pub max_concurrent_checks: usize,
    pub retry_failed_checks: bool,
}

impl ProbeConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            timeout_secs: env_parse("SSL_PROBE_TIMEOUT_SECS", 10)?,
            max_concurrent_checks: env_parse("SSL_MAX_CONCURRENT_CHECKS", 5)?,
            retry_failed_checks: env_parse("SSL_RETRY_FAILED_CHECKS", true)?,
        })
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_concurrent_checks: 5,
            retry_failed_checks: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_url: Option<String>,
    /// Days-until-expiry thresholds that trigger a notification,
    /// descending.
    pub notification_days: Vec<i64>,
}

impl NotifyConfig {
    pub fn from_env() -> Result<Self> {
        let days = match env_opt("NOTIFICATION_DAYS") {
            Some(raw) => parse_day_list(&raw)?,
            None => vec![30, 14, 7, 3, 1],
        };
        Ok(Self {
            webhook_url: env_opt("TEAMS_WEBHOOK_URL"),
            notification_days: days,
        })
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            notification_days: vec![30, 14, 7, 3, 1],
        }
    }
}

/// Parse a comma-separated day list, deduplicated and sorted descending.
pub fn parse_day_list(raw: &str) -> Result<Vec<i64>> {
    let mut days = Vec::new();
    for part in raw.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let day: i64 = part.parse().map_err(|_| {
            CertwatchError::config(format!("invalid notification day: {part:?}"))
        })?;
        if !days.contains(&day) {
            days.push(day);
        }
    }
    days.sort_unstable_by(|a, b| b.cmp(a));
    Ok(days)
}

/// Full application configuration, assembled from the environment.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub executor: ExecutorConfig,
    pub scheduler: SchedulerConfig,
    pub probe: ProbeConfig,
    pub notify: NotifyConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            executor: ExecutorConfig::from_env()?,
            scheduler: SchedulerConfig::from_env()?,
            probe: ProbeConfig::from_env()?,
            notify: NotifyConfig::from_env()?,
        })
    }

    /// One-line-per-section summary at startup. Secrets stay out.
    pub fn log_summary(&self) {
        tracing::info!(
            host = %self.server.host,
            port = self.server.port,
            cors_origin = %self.server.cors_origin,
            "server config"
        );
        tracing::info!(
            max_concurrent = self.executor.max_concurrent_tasks,
            default_timeout_secs = self.executor.default_timeout_secs,
            cleanup_interval_secs = self.executor.cleanup_interval_secs,
            max_result_age_secs = self.executor.max_result_age_secs,
            "executor config"
        );
        tracing::info!(
            timezone = %self.scheduler.timezone,
            weekly_check_day = self.scheduler.weekly_check_day,
            weekly_check_time = %self.scheduler.weekly_check_time,
            notification_interval_hours = self.scheduler.notification_interval_hours,
            misfire_grace_secs = self.scheduler.misfire_grace_secs,
            "scheduler config"
        );
        tracing::info!(
            probe_timeout_secs = self.probe.timeout_secs,
            max_concurrent_checks = self.probe.max_concurrent_checks,
            retry_failed_checks = self.probe.retry_failed_checks,
            webhook_configured = self.notify.webhook_url.is_some(),
            notification_days = ?self.notify.notification_days,
            "probe/notify config"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_env() {
        let cfg = ExecutorConfig::default();
        assert_eq!(cfg.max_concurrent_tasks, 5);
        assert_eq!(cfg.default_timeout_secs, 300);
        assert_eq!(cfg.max_result_age_secs, 86_400);
        assert_eq!(SchedulerConfig::default().misfire_grace_secs, 30);
        assert_eq!(ServerConfig::default().port, 3001);
    }

    #[test]
    fn day_list_parses_dedupes_and_sorts() {
        assert_eq!(parse_day_list("7, 30,1,7").unwrap(), vec![30, 7, 1]);
        assert!(parse_day_list("30,x").is_err());
        assert!(parse_day_list("").unwrap().is_empty());
    }

    #[test]
    fn invalid_day_of_week_rejected() {
        std::env::set_var("WEEKLY_CHECK_DAY", "9");
        let err = SchedulerConfig::from_env().unwrap_err();
        std::env::remove_var("WEEKLY_CHECK_DAY");
        assert!(err.to_string().contains("WEEKLY_CHECK_DAY"));
    }
}

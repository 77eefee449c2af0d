//! Notification delivery for certificate monitoring.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook notifier implementation
//! - Minijinja template rendering for notification messages
//! - The expiry notification sweep with per-site error-alert dedupe

pub mod expiry;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use expiry::{ExpiryNotificationService, NotificationReport};
pub use templating::TemplateRenderer;
pub use traits::{Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;

//! Minijinja template rendering for notification messages.
//!
//! Templates are arbitrary strings (not pre-registered files), so a
//! fresh [`minijinja::Environment`] is created per render call.

use serde::Serialize;

use crate::traits::NotifyError;

/// Default subject for a grouped expiry notification.
pub const DEFAULT_EXPIRY_SUBJECT: &str =
    "[{{ urgency | upper }}] {{ site_count }} certificate(s) expiring within {{ days_left }} days";

/// Default body for a grouped expiry notification: one line per site.
pub const DEFAULT_EXPIRY_BODY: &str = "{% for s in sites %}{{ s.domain }} expires {{ s.valid_until }} ({{ s.days_left }} days left){% if not loop.last %}\n{% endif %}{% endfor %}";

/// Default subject for an SSL error alert.
pub const DEFAULT_ERROR_SUBJECT: &str = "[CRITICAL] SSL check failed for {{ domain }}";

/// Default body for an SSL error alert.
pub const DEFAULT_ERROR_BODY: &str =
    "Certificate check for {{ domain }} failed at {{ checked_at }}: {{ error }}";

/// One site inside a grouped expiry notification.
#[derive(Debug, Clone, Serialize)]
pub struct SiteContext {
    pub domain: String,
    pub issuer: Option<String>,
    pub valid_until: Option<String>,
    pub days_left: Option<i64>,
}

/// Context for a grouped expiry notification.
#[derive(Debug, Clone, Serialize)]
pub struct ExpiryContext {
    /// The days-until-expiry bucket being reported.
    pub days_left: i64,
    /// `critical`, `warning`, or `info`, derived from the bucket.
    pub urgency: String,
    pub site_count: usize,
    pub sites: Vec<SiteContext>,
    /// Current timestamp in ISO 8601 format.
    pub now: String,
}

/// Context for an SSL error alert.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorContext {
    pub domain: String,
    pub error: String,
    pub checked_at: String,
    pub now: String,
}

/// Renders notification templates using minijinja.
#[derive(Debug, Default)]
pub struct TemplateRenderer {
    _private: (),
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self { _private: () }
    }

    fn build_env() -> minijinja::Environment<'static> {
        let mut env = minijinja::Environment::new();
        // `lower`/`upper` are built in with the "builtins" feature, but
        // explicit registration guarantees availability.
        env.add_filter("lower", |value: String| value.to_lowercase());
        env.add_filter("upper", |value: String| value.to_uppercase());
        env.add_function("env", env_function);
        env
    }

    /// Render a template string with the given context.
    pub fn render<C: Serialize>(&self, template_str: &str, ctx: &C) -> Result<String, NotifyError> {
        let env = Self::build_env();
        env.render_str(template_str, ctx)
            .map_err(|e| NotifyError::Template(e.to_string()))
    }

    /// Check template syntax without evaluating it.
    pub fn validate(&self, template_str: &str) -> Result<(), NotifyError> {
        let env = Self::build_env();
        env.template_from_str(template_str)
            .map_err(|e| NotifyError::Template(e.to_string()))?;
        Ok(())
    }
}

/// Global function: read an environment variable by name, empty when
/// unset.
fn env_function(name: String) -> String {
    match std::env::var(&name) {
        Ok(val) => val,
        Err(_) => {
            tracing::warn!(var = %name, "environment variable not found, returning empty string");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expiry_context() -> ExpiryContext {
        ExpiryContext {
            days_left: 7,
            urgency: "warning".to_string(),
            site_count: 2,
            sites: vec![
                SiteContext {
                    domain: "a.example".to_string(),
                    issuer: Some("Test CA".to_string()),
                    valid_until: Some("2026-09-01T00:00:00Z".to_string()),
                    days_left: Some(6),
                },
                SiteContext {
                    domain: "b.example".to_string(),
                    issuer: None,
                    valid_until: Some("2026-09-02T00:00:00Z".to_string()),
                    days_left: Some(7),
                },
            ],
            now: "2026-08-26T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn default_expiry_templates_render() {
        let renderer = TemplateRenderer::new();
        let ctx = expiry_context();
        let subject = renderer.render(DEFAULT_EXPIRY_SUBJECT, &ctx).unwrap();
        assert_eq!(
            subject,
            "[WARNING] 2 certificate(s) expiring within 7 days"
        );
        let body = renderer.render(DEFAULT_EXPIRY_BODY, &ctx).unwrap();
        assert!(body.contains("a.example expires 2026-09-01T00:00:00Z (6 days left)"));
        assert!(body.contains("b.example"));
    }

    #[test]
    fn default_error_templates_render() {
        let renderer = TemplateRenderer::new();
        let ctx = ErrorContext {
            domain: "down.example".to_string(),
            error: "connection refused".to_string(),
            checked_at: "2026-08-26T01:00:00Z".to_string(),
            now: "2026-08-26T01:05:00Z".to_string(),
        };
        let subject = renderer.render(DEFAULT_ERROR_SUBJECT, &ctx).unwrap();
        assert_eq!(subject, "[CRITICAL] SSL check failed for down.example");
        let body = renderer.render(DEFAULT_ERROR_BODY, &ctx).unwrap();
        assert!(body.contains("connection refused"));
    }

    #[test]
    fn env_function_resolves() {
        std::env::set_var("CW_TEMPLATE_TEST_VAR", "ops-team");
        let renderer = TemplateRenderer::new();
        let ctx = expiry_context();
        let out = renderer
            .render("cc: {{ env('CW_TEMPLATE_TEST_VAR') }}", &ctx)
            .unwrap();
        assert_eq!(out, "cc: ops-team");
        std::env::remove_var("CW_TEMPLATE_TEST_VAR");
    }

    #[test]
    fn invalid_template_is_rejected() {
        let renderer = TemplateRenderer::new();
        assert!(renderer.validate("{{ ok }}").is_ok());
        assert!(renderer.validate("{% for x in %}").is_err());
        assert!(renderer.render("{{ unclosed", &expiry_context()).is_err());
    }
}

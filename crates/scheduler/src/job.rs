//! Job trait and the result envelope every invocation produces.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A schedulable unit of work. Implementations must be re-runnable.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self) -> anyhow::Result<Value>;
}

/// Adapter so plain async closures can be registered as jobs.
pub struct FnJob<F>(pub F);

#[async_trait]
impl<F, Fut> Job for FnJob<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send,
{
    async fn run(&self) -> anyhow::Result<Value> {
        (self.0)().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Completed,
    Failed,
}

/// Uniform record of one job invocation, successful or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_type: String,
    pub status: JobOutcome,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobEnvelope {
    pub fn succeeded(&self) -> bool {
        self.status == JobOutcome::Completed
    }
}

/// Emitted to listeners after every invocation.
#[derive(Debug, Clone)]
pub struct JobEvent {
    pub job_id: String,
    pub envelope: JobEnvelope,
}

pub type JobListener = Arc<dyn Fn(&JobEvent) + Send + Sync>;

/// Run the job once and wrap the outcome. Errors are captured, never
/// propagated; the scheduler treats the envelope as the result.
pub async fn run_enveloped(job: &dyn Job, job_type: &str) -> JobEnvelope {
    let start_time = Utc::now();
    let outcome = job.run().await;
    let end_time = Utc::now();
    let duration_seconds = (end_time - start_time).num_milliseconds() as f64 / 1000.0;
    match outcome {
        Ok(value) => JobEnvelope {
            job_type: job_type.to_string(),
            status: JobOutcome::Completed,
            start_time,
            end_time,
            duration_seconds,
            result: Some(value),
            error: None,
        },
        Err(err) => JobEnvelope {
            job_type: job_type.to_string(),
            status: JobOutcome::Failed,
            start_time,
            end_time,
            duration_seconds,
            result: None,
            error: Some(err.to_string()),
        },
    }
}

//! Recurring job scheduler.
//!
//! A one-second clock loop fires jobs whose `next_run` has arrived.
//! Policies, in order of application:
//!   - a run that is later than the misfire grace window is skipped;
//!   - at most one instance of a job runs at a time, an overlapping
//!     fire is skipped;
//!   - the next run is always computed from the current tick, so
//!     missed runs are never coalesced into a burst.
//! `stop` is graceful: in-flight invocations finish before it returns.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use certwatch_core::config::SchedulerConfig;
use certwatch_core::error::{CertwatchError, Result};

use crate::job::{run_enveloped, Job, JobEnvelope, JobEvent, JobListener};
use crate::trigger::JobTrigger;

const CLOCK_TICK: Duration = Duration::from_secs(1);

struct JobEntry {
    id: String,
    name: String,
    trigger: JobTrigger,
    job: Arc<dyn Job>,
    next_run: Option<DateTime<Utc>>,
    running: Arc<AtomicBool>,
    last_result: Option<JobEnvelope>,
}

struct Inner {
    config: SchedulerConfig,
    jobs: RwLock<HashMap<String, JobEntry>>,
    listeners: RwLock<Vec<JobListener>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
    shutdown: Mutex<Option<CancellationToken>>,
    clock: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct JobScheduler {
    inner: Arc<Inner>,
}

impl JobScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                jobs: RwLock::new(HashMap::new()),
                listeners: RwLock::new(Vec::new()),
                in_flight: Mutex::new(Vec::new()),
                is_running: AtomicBool::new(false),
                shutdown: Mutex::new(None),
                clock: Mutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    pub fn timezone(&self) -> &str {
        &self.inner.config.timezone
    }

    /// Register a job, replacing any existing job with the same id.
    /// The first run is computed from now; jobs can be added before or
    /// after `start`.
    pub async fn register(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        trigger: JobTrigger,
        job: Arc<dyn Job>,
    ) -> Result<()> {
        let id = id.into();
        let mut jobs = self.inner.jobs.write().await;
        let next_run = trigger.next_run_after(Utc::now());
        if next_run.is_none() {
            return Err(CertwatchError::InvalidSchedule(format!(
                "trigger for {id} never fires: {}",
                trigger.describe()
            )));
        }
        let replaced = jobs.remove(&id).is_some();
        tracing::info!(
            job_id = %id,
            trigger = %trigger.describe(),
            next_run = ?next_run,
            replaced,
            "job registered"
        );
        jobs.insert(
            id.clone(),
            JobEntry {
                id,
                name: name.into(),
                trigger,
                job,
                next_run,
                running: Arc::new(AtomicBool::new(false)),
                last_result: None,
            },
        );
        Ok(())
    }

    /// Invoked after every job run, on top of the built-in logging.
    pub async fn add_listener(&self, listener: JobListener) {
        self.inner.listeners.write().await.push(listener);
    }

    /// Start the clock loop. Calling twice is a no-op.
    pub async fn start(&self) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            tracing::warn!("scheduler already running");
            return;
        }
        let token = CancellationToken::new();
        *self.inner.shutdown.lock().await = Some(token.clone());
        let inner = Arc::clone(&self.inner);
        *self.inner.clock.lock().await = Some(tokio::spawn(clock_loop(inner, token)));
        tracing::info!(
            timezone = %self.inner.config.timezone,
            misfire_grace_secs = self.inner.config.misfire_grace_secs,
            "scheduler started"
        );
    }

    /// Stop the clock, wait for in-flight runs to finish, and clear
    /// the job table. Calling twice is a no-op.
    pub async fn stop(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.inner.shutdown.lock().await.take() {
            token.cancel();
        }
        if let Some(handle) = self.inner.clock.lock().await.take() {
            let _ = handle.await;
        }
        let in_flight: Vec<JoinHandle<()>> = self.inner.in_flight.lock().await.drain(..).collect();
        let waited = in_flight.len();
        for handle in in_flight {
            let _ = handle.await;
        }
        self.inner.jobs.write().await.clear();
        tracing::info!(waited_for = waited, "scheduler stopped");
    }

    /// Run a job immediately, outside its schedule and without touching
    /// its overlap flag or next run time.
    pub async fn trigger_job_now(&self, id: &str) -> Value {
        let found = {
            let jobs = self.inner.jobs.read().await;
            jobs.get(id).map(|e| (Arc::clone(&e.job), e.name.clone()))
        };
        let Some((job, name)) = found else {
            return json!({
                "triggered": false,
                "error": format!("job not found: {id}"),
            });
        };
        tracing::info!(job_id = %id, "job triggered manually");
        let envelope = run_enveloped(job.as_ref(), &name).await;
        finish_invocation(&self.inner, id, envelope.clone()).await;
        let mut body = serde_json::Map::new();
        body.insert("triggered".to_string(), json!(true));
        body.insert("job_id".to_string(), json!(id));
        if let Ok(Value::Object(fields)) = serde_json::to_value(&envelope) {
            for (key, value) in fields {
                body.insert(key, value);
            }
        }
        Value::Object(body)
    }

    pub async fn get_job_status(&self) -> Value {
        let jobs = self.inner.jobs.read().await;
        let mut entries: Vec<&JobEntry> = jobs.values().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        let listed: Vec<Value> = entries
            .iter()
            .map(|e| {
                json!({
                    "id": e.id,
                    "name": e.name,
                    "next_run_time": e.next_run.map(|t| t.to_rfc3339()),
                    "trigger": e.trigger.describe(),
                    "running": e.running.load(Ordering::SeqCst),
                })
            })
            .collect();
        json!({
            "scheduler_running": self.is_running(),
            "total_jobs": listed.len(),
            "jobs": listed,
        })
    }

    pub async fn last_result(&self, id: &str) -> Option<JobEnvelope> {
        self.inner.jobs.read().await.get(id)?.last_result.clone()
    }
}

async fn clock_loop(inner: Arc<Inner>, token: CancellationToken) {
    let mut tick = tokio::time::interval(CLOCK_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => fire_due_jobs(&inner).await,
        }
    }
    tracing::debug!("scheduler clock exited");
}

async fn fire_due_jobs(inner: &Arc<Inner>) {
    let now = Utc::now();
    let grace = chrono::Duration::seconds(inner.config.misfire_grace_secs as i64);
    let mut due: Vec<(String, String, Arc<dyn Job>, Arc<AtomicBool>)> = Vec::new();
    {
        let mut jobs = inner.jobs.write().await;
        for entry in jobs.values_mut() {
            let Some(next_run) = entry.next_run else { continue };
            if next_run > now {
                continue;
            }
            // Always advance from the current tick.
            entry.next_run = entry.trigger.next_run_after(now);
            if now - next_run > grace {
                tracing::warn!(
                    job_id = %entry.id,
                    scheduled_for = %next_run,
                    "run missed its grace window, skipping"
                );
                continue;
            }
            if entry.running.load(Ordering::SeqCst) {
                tracing::warn!(job_id = %entry.id, "previous run still in progress, skipping");
                continue;
            }
            entry.running.store(true, Ordering::SeqCst);
            due.push((
                entry.id.clone(),
                entry.name.clone(),
                Arc::clone(&entry.job),
                Arc::clone(&entry.running),
            ));
        }
    }
    for (id, name, job, running) in due {
        let run_inner = Arc::clone(inner);
        let handle = tokio::spawn(async move {
            let envelope = run_enveloped(job.as_ref(), &name).await;
            running.store(false, Ordering::SeqCst);
            finish_invocation(&run_inner, &id, envelope).await;
        });
        inner.in_flight.lock().await.push(handle);
    }
    inner.in_flight.lock().await.retain(|h| !h.is_finished());
}

async fn finish_invocation(inner: &Arc<Inner>, id: &str, envelope: JobEnvelope) {
    if envelope.succeeded() {
        tracing::info!(
            job_id = %id,
            duration_secs = envelope.duration_seconds,
            "job completed"
        );
    } else {
        tracing::error!(
            job_id = %id,
            error = envelope.error.as_deref().unwrap_or("unknown"),
            "job failed"
        );
    }
    {
        let mut jobs = inner.jobs.write().await;
        if let Some(entry) = jobs.get_mut(id) {
            entry.last_result = Some(envelope.clone());
        }
    }
    let event = JobEvent {
        job_id: id.to_string(),
        envelope,
    };
    for listener in inner.listeners.read().await.iter() {
        listener(&event);
    }
}

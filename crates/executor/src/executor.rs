//! Priority-ordered async task executor with bounded concurrency.
//!
//! Tasks are submitted as re-invocable closures and tracked through a
//! small state machine (`Pending -> Running -> Completed | Failed |
//! Cancelled | Retrying`). A one-second dispatch loop fills the free
//! concurrency slots with the highest-priority eligible tasks; what
//! does not fit stays in the backlog and is re-sorted on the next
//! pass. Failures and timeouts go through the
//! same retry path; terminal records are kept around for querying and
//! swept by a periodic cleanup loop.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use certwatch_core::config::ExecutorConfig;
use certwatch_core::error::{CertwatchError, Result};

use crate::task::{SubmitOptions, TaskFn, TaskRecord, TaskStatus};

const DISPATCH_TICK: Duration = Duration::from_secs(1);

/// Snapshot of executor state for the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStats {
    pub is_running: bool,
    pub total_tasks: usize,
    pub pending_tasks: usize,
    pub running_tasks: usize,
    pub max_concurrent_tasks: usize,
    pub status_distribution: HashMap<String, usize>,
    pub semaphore_available: usize,
    pub last_cleanup: Option<DateTime<Utc>>,
}

struct Inner {
    config: ExecutorConfig,
    tasks: RwLock<HashMap<String, TaskRecord>>,
    funcs: Mutex<HashMap<String, TaskFn>>,
    running: Mutex<HashMap<String, JoinHandle<()>>>,
    semaphore: Arc<Semaphore>,
    is_running: AtomicBool,
    last_cleanup: RwLock<Option<DateTime<Utc>>>,
    shutdown: Mutex<Option<CancellationToken>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

#[derive(Clone)]
pub struct TaskExecutor {
    inner: Arc<Inner>,
}

impl TaskExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Self {
            inner: Arc::new(Inner {
                config,
                tasks: RwLock::new(HashMap::new()),
                funcs: Mutex::new(HashMap::new()),
                running: Mutex::new(HashMap::new()),
                semaphore,
                is_running: AtomicBool::new(false),
                last_cleanup: RwLock::new(None),
                shutdown: Mutex::new(None),
                loops: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.is_running.load(Ordering::SeqCst)
    }

    /// Register a task. Always succeeds and returns immediately; the
    /// dispatch loop picks the task up on its next pass.
    pub async fn submit(&self, func: TaskFn, opts: SubmitOptions) -> String {
        let id = Uuid::new_v4().to_string();
        let name = opts.name.unwrap_or_else(|| format!("task_{}", &id[..8]));
        let now = Utc::now();
        let mut metadata = HashMap::new();
        metadata.insert("submitted_at".to_string(), Value::String(now.to_rfc3339()));
        let record = TaskRecord {
            id: id.clone(),
            name,
            priority: opts.priority,
            status: TaskStatus::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            scheduled_at: opts.scheduled_at,
            retry_count: 0,
            max_retries: opts.max_retries.unwrap_or(3),
            retry_delay_secs: opts.retry_delay_secs.unwrap_or(5),
            timeout_secs: opts
                .timeout_secs
                .unwrap_or(self.inner.config.default_timeout_secs),
            result: None,
            error: None,
            metadata,
        };
        tracing::debug!(
            task_id = %id,
            name = %record.name,
            priority = ?record.priority,
            "task submitted"
        );
        self.inner.tasks.write().await.insert(id.clone(), record);
        self.inner.funcs.lock().await.insert(id.clone(), func);
        id
    }

    /// Convenience wrapper that boxes a plain async closure.
    pub async fn submit_fn<F, Fut>(&self, func: F, opts: SubmitOptions) -> String
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.submit(Arc::new(move || func().boxed()), opts).await
    }

    /// Start the dispatch and cleanup loops. Calling twice is a no-op.
    pub async fn start(&self) {
        if self.inner.is_running.swap(true, Ordering::SeqCst) {
            tracing::warn!("task executor already running");
            return;
        }
        let token = CancellationToken::new();
        *self.inner.shutdown.lock().await = Some(token.clone());
        let mut loops = self.inner.loops.lock().await;
        loops.push(tokio::spawn(dispatch_loop(
            Arc::clone(&self.inner),
            token.clone(),
        )));
        loops.push(tokio::spawn(cleanup_loop(Arc::clone(&self.inner), token)));
        tracing::info!(
            max_concurrent = self.inner.config.max_concurrent_tasks,
            "task executor started"
        );
    }

    /// Stop the loops, abort running tasks, and cancel the backlog.
    /// Terminal records stay queryable. Calling twice is a no-op.
    pub async fn stop(&self) {
        if !self.inner.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(token) = self.inner.shutdown.lock().await.take() {
            token.cancel();
        }
        let running: Vec<(String, JoinHandle<()>)> =
            self.inner.running.lock().await.drain().collect();
        for (_, handle) in &running {
            handle.abort();
        }
        let now = Utc::now();
        {
            let mut tasks = self.inner.tasks.write().await;
            for task in tasks.values_mut() {
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Cancelled;
                    task.completed_at = Some(now);
                }
            }
        }
        let loops: Vec<JoinHandle<()>> = self.inner.loops.lock().await.drain(..).collect();
        for handle in loops {
            let _ = handle.await;
        }
        // The backlog of task bodies is gone; records stay queryable.
        self.inner.funcs.lock().await.clear();
        tracing::info!(aborted = running.len(), "task executor stopped");
    }

    pub async fn get_task(&self, id: &str) -> Option<TaskRecord> {
        self.inner.tasks.read().await.get(id).cloned()
    }

    pub async fn task_status(&self, id: &str) -> Option<TaskStatus> {
        self.inner.tasks.read().await.get(id).map(|t| t.status)
    }

    /// Cancel one task. Returns `Ok(false)` if it already reached a
    /// terminal state.
    pub async fn cancel_task(&self, id: &str) -> Result<bool> {
        let handle = self.inner.running.lock().await.remove(id);
        if let Some(handle) = handle {
            handle.abort();
        }
        let mut tasks = self.inner.tasks.write().await;
        let task = tasks
            .get_mut(id)
            .ok_or_else(|| CertwatchError::TaskNotFound(id.to_string()))?;
        if task.status.is_terminal() {
            return Ok(false);
        }
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());
        tracing::info!(task_id = %id, "task cancelled");
        Ok(true)
    }

    /// Records sorted newest first, optionally filtered by status.
    pub async fn list_tasks(
        &self,
        status: Option<TaskStatus>,
        limit: Option<usize>,
    ) -> Vec<TaskRecord> {
        let tasks = self.inner.tasks.read().await;
        let mut records: Vec<TaskRecord> = tasks
            .values()
            .filter(|t| status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = limit {
            records.truncate(limit);
        }
        records
    }

    pub async fn stats(&self) -> ExecutorStats {
        let tasks = self.inner.tasks.read().await;
        let mut distribution: HashMap<String, usize> = HashMap::new();
        for task in tasks.values() {
            *distribution.entry(task.status.as_str().to_string()).or_default() += 1;
        }
        ExecutorStats {
            is_running: self.is_running(),
            total_tasks: tasks.len(),
            pending_tasks: tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending)
                .count(),
            running_tasks: tasks
                .values()
                .filter(|t| t.status == TaskStatus::Running)
                .count(),
            max_concurrent_tasks: self.inner.config.max_concurrent_tasks,
            status_distribution: distribution,
            semaphore_available: self.inner.semaphore.available_permits(),
            last_cleanup: *self.inner.last_cleanup.read().await,
        }
    }
}

async fn dispatch_loop(inner: Arc<Inner>, token: CancellationToken) {
    let mut tick = tokio::time::interval(DISPATCH_TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => dispatch_ready(&inner).await,
        }
    }
    tracing::debug!("dispatch loop exited");
}

/// One dispatch pass: fill the free slots with the highest-priority
/// ready tasks, oldest first within a priority. Everything past the
/// concurrency bound stays in the backlog, so a later high-priority
/// submission is re-sorted ahead of queued work on the next tick.
async fn dispatch_ready(inner: &Arc<Inner>) {
    let now = Utc::now();
    let max = inner.config.max_concurrent_tasks;
    let mut ready: Vec<(String, crate::task::TaskPriority, DateTime<Utc>)> = Vec::new();
    {
        let tasks = inner.tasks.read().await;
        let running = inner.running.lock().await;
        if running.len() >= max {
            return;
        }
        for task in tasks.values() {
            if task.is_ready(now) && !running.contains_key(&task.id) {
                ready.push((task.id.clone(), task.priority, task.created_at));
            }
        }
    }
    ready.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
    for (id, _, _) in ready {
        let func = inner.funcs.lock().await.get(&id).cloned();
        let Some(func) = func else { continue };
        let runner_inner = Arc::clone(inner);
        let runner_id = id.clone();
        // Hold the running-map lock across spawn + insert so the runner
        // cannot observe (and try to remove) a not-yet-inserted entry.
        let mut running = inner.running.lock().await;
        if running.len() >= max {
            break;
        }
        let handle = tokio::spawn(async move {
            run_task(runner_inner, runner_id, func).await;
        });
        running.insert(id, handle);
    }
}

async fn run_task(inner: Arc<Inner>, id: String, func: TaskFn) {
    // The permit is held for the whole run and released on drop, which
    // also covers aborts.
    let permit = match Arc::clone(&inner.semaphore).acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };

    // The task may have been cancelled while queued for a slot.
    let timeout_secs = {
        let mut tasks = inner.tasks.write().await;
        match tasks.get_mut(&id) {
            Some(task) if matches!(task.status, TaskStatus::Pending | TaskStatus::Retrying) => {
                task.status = TaskStatus::Running;
                task.started_at = Some(Utc::now());
                task.scheduled_at = None;
                task.timeout_secs
            }
            _ => {
                drop(permit);
                inner.running.lock().await.remove(&id);
                return;
            }
        }
    };

    let outcome = tokio::time::timeout(Duration::from_secs(timeout_secs), func()).await;
    drop(permit);

    match outcome {
        Ok(Ok(value)) => {
            let mut tasks = inner.tasks.write().await;
            if let Some(task) = tasks.get_mut(&id) {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(Utc::now());
                task.result = Some(value);
                task.error = None;
                tracing::debug!(task_id = %id, name = %task.name, "task completed");
            }
        }
        Ok(Err(err)) => handle_failure(&inner, &id, err.to_string()).await,
        Err(_) => {
            handle_failure(&inner, &id, format!("timed out after {timeout_secs}s")).await
        }
    }

    inner.running.lock().await.remove(&id);
}

/// Failures and timeouts share the retry path: bump the counter and
/// either reschedule or go terminal.
async fn handle_failure(inner: &Arc<Inner>, id: &str, message: String) {
    let mut tasks = inner.tasks.write().await;
    let Some(task) = tasks.get_mut(id) else { return };
    task.retry_count += 1;
    task.error = Some(message.clone());
    if task.retry_count <= task.max_retries {
        task.status = TaskStatus::Retrying;
        task.scheduled_at =
            Some(Utc::now() + chrono::Duration::seconds(task.retry_delay_secs as i64));
        tracing::warn!(
            task_id = %id,
            name = %task.name,
            attempt = task.retry_count,
            max_retries = task.max_retries,
            error = %message,
            "task failed, retry scheduled"
        );
    } else {
        task.status = TaskStatus::Failed;
        task.completed_at = Some(Utc::now());
        tracing::error!(
            task_id = %id,
            name = %task.name,
            attempts = task.retry_count,
            error = %message,
            "task failed permanently"
        );
    }
}

async fn cleanup_loop(inner: Arc<Inner>, token: CancellationToken) {
    let mut tick =
        tokio::time::interval(Duration::from_secs(inner.config.cleanup_interval_secs.max(1)));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => cleanup_old_tasks(&inner).await,
        }
    }
}

/// Drop terminal records older than the configured retention window.
async fn cleanup_old_tasks(inner: &Arc<Inner>) {
    let cutoff = Utc::now() - chrono::Duration::seconds(inner.config.max_result_age_secs as i64);
    let mut removed = Vec::new();
    {
        let mut tasks = inner.tasks.write().await;
        tasks.retain(|id, task| {
            let expired =
                task.status.is_terminal() && task.completed_at.map_or(false, |at| at < cutoff);
            if expired {
                removed.push(id.clone());
            }
            !expired
        });
    }
    if !removed.is_empty() {
        let mut funcs = inner.funcs.lock().await;
        for id in &removed {
            funcs.remove(id);
        }
        tracing::info!(removed = removed.len(), "cleaned up old task records");
    }
    *inner.last_cleanup.write().await = Some(Utc::now());
}

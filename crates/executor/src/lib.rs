//! Bounded-concurrency background task execution.

pub mod executor;
pub mod task;

pub use executor::{ExecutorStats, TaskExecutor};
pub use task::{SubmitOptions, TaskFn, TaskFuture, TaskPriority, TaskRecord, TaskStatus};

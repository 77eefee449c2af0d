//! Recurring job scheduling: triggers, job envelopes, and the
//! clock-driven scheduler service.

pub mod job;
pub mod service;
pub mod trigger;

pub use job::{FnJob, Job, JobEnvelope, JobEvent, JobListener, JobOutcome};
pub use service::JobScheduler;
pub use trigger::JobTrigger;

//! Shared building blocks for the certwatch workspace: configuration,
//! the common error type, and the monitored-website registry.

pub mod config;
pub mod error;
pub mod site;

pub use config::Config;
pub use error::{CertwatchError, Result};
pub use site::{MemoryWebsiteStore, Website, WebsiteStore};

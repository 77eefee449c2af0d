//! HTTP server wiring: shared state, scheduled jobs, and the axum router.

pub mod api;
pub mod jobs;
pub mod router;
pub mod state;

pub use router::build_router;
pub use state::AppState;

//! HTTP API server for external control
//!
//! This module provides a REST API for controlling recording sessions:
//! - POST /meetings/record/start - Start a new recording
//! - POST /meetings/:id/pause, /meetings/:id/resume - Suspend or continue
//! - POST /meetings/record/stop/:id - Stop a recording and write it out
//! - DELETE /meetings/:id - Discard a recording
//! - GET /meetings/:id/status - Query session status
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{status_label, validate_meeting_id};
pub use routes::create_router;
pub use state::{AppState, ManagedSession, Reservation, SinkForwarder};

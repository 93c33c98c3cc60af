//! Client-side core for the SentryView CCTV detection service.
//!
//! Three subsystems, layered bottom-up:
//! - [`session`]: credential storage, single-flight token refresh, and the
//!   authenticated request pipeline (401 -> refresh -> retry once).
//! - [`detection`]: upload a video and track it through
//!   queued/processing/completed with a cancellable poll loop.
//! - [`monitoring`]: camera-stream CRUD with at most one in-flight lifecycle
//!   operation per stream.
//!
//! The rendering layer and the backend itself live elsewhere; this crate only
//! speaks the backend's HTTP contract and exposes observable state.

pub mod auth;
pub mod config;
pub mod detection;
pub mod errors;
pub mod monitoring;
pub mod security;
pub mod session;

pub use auth::AuthService;
pub use config::ClientConfig;
pub use detection::{Detection, JobPhase, JobState, JobTracker};
pub use errors::{ApiError, ApiResult};
pub use monitoring::{StreamManager, StreamResource};
pub use session::{ApiClient, CredentialStore, SessionStatus, TokenPair};

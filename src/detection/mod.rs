//! Video upload and detection-job tracking.

pub mod state;
pub mod tracker;

pub use state::{Detection, JobPhase, JobState};
pub use tracker::JobTracker;

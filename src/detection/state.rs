use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::{Arc, Mutex};

/// Lifecycle of one upload-through-detection job. Transitions are strictly
/// forward; `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    NotStarted,
    Uploading,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobPhase {
    fn rank(self) -> u8 {
        match self {
            JobPhase::NotStarted => 0,
            JobPhase::Uploading => 1,
            JobPhase::Queued => 2,
            JobPhase::Processing => 3,
            JobPhase::Completed | JobPhase::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::Failed)
    }
}

/// One detection hit, immutable once received from the server.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Detection {
    pub labels: String,
    #[serde(rename = "confidence")]
    pub confidence_score: f64,
    pub timestamp: String,
    pub frame_path: String,
    #[serde(default)]
    pub frame_name: String,
}

#[derive(Debug, Clone)]
pub struct JobState {
    pub job_id: Option<String>,
    pub result_id: Option<String>,
    pub display_name: Option<String>,
    pub phase: JobPhase,
    pub upload_progress: u8,
    pub processing_progress: u8,
    pub results: Vec<Detection>,
    /// Secondary failure (e.g. the results fetch after completion); the phase
    /// itself stays authoritative.
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for JobState {
    fn default() -> Self {
        Self {
            job_id: None,
            result_id: None,
            display_name: None,
            phase: JobPhase::NotStarted,
            upload_progress: 0,
            processing_progress: 0,
            results: Vec::new(),
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }
}

/// Shared handle to one job's observable state.
pub type JobStateHandle = Arc<Mutex<JobState>>;

pub fn new_state_handle() -> JobStateHandle {
    Arc::new(Mutex::new(JobState::default()))
}

/// Mutate job state under the lock. Lock poisoning is recovered: job state is
/// plain data and a stalled tracker is worse than a stale field.
pub fn update_job<F>(handle: &JobStateHandle, operation: &str, f: F)
where
    F: FnOnce(&mut JobState),
{
    let mut guard = match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::error!("Job state lock poisoned during {} (recovering)", operation);
            poisoned.into_inner()
        }
    };
    f(&mut guard);
}

pub fn read_job<F, R>(handle: &JobStateHandle, operation: &str, f: F) -> R
where
    F: FnOnce(&JobState) -> R,
{
    let guard = match handle.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::error!("Job state lock poisoned during {} (recovering)", operation);
            poisoned.into_inner()
        }
    };
    f(&guard)
}

/// Advance the phase, refusing skips backwards and transitions out of a
/// terminal phase. Returns whether the transition was applied.
pub fn advance_phase(state: &mut JobState, next: JobPhase) -> bool {
    if state.phase.is_terminal() {
        log::warn!(
            "Ignoring phase transition {:?} -> {:?} (terminal)",
            state.phase,
            next
        );
        return false;
    }

    if next.rank() < state.phase.rank() {
        log::warn!(
            "Ignoring backwards phase transition {:?} -> {:?}",
            state.phase,
            next
        );
        return false;
    }

    if state.phase != next {
        log::info!("Job phase {:?} -> {:?}", state.phase, next);
        if state.phase == JobPhase::NotStarted {
            state.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            state.finished_at = Some(Utc::now());
        }
        state.phase = next;
    }
    true
}

use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::errors::{ApiError, ApiResult};
use crate::security::InputValidator;
use crate::session::transport::{ApiRequest, Method, ProgressFn, RequestBody};
use crate::session::ApiClient;

use super::state::{
    advance_phase, new_state_handle, read_job, update_job, Detection, JobPhase, JobState,
    JobStateHandle,
};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    /// Opaque job id used for status polling. The legacy spelling is accepted
    /// for servers that still send `videoId`.
    #[serde(alias = "videoId")]
    video_id: String,
    /// Explicit id for the results fetch. Servers that use one id for both
    /// omit this.
    #[serde(default)]
    result_id: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    progress: f64,
}

#[derive(Debug, Deserialize)]
struct ResultsResponse {
    results: Vec<Detection>,
}

/// Drives one video through upload, status polling and the final results
/// fetch. Owns a cancellable poll loop; dropping the tracker stops polling
/// before the next tick.
pub struct JobTracker {
    client: ApiClient,
    state: JobStateHandle,
    cancel: CancellationToken,
    poll_interval: Duration,
    max_upload_bytes: u64,
}

impl JobTracker {
    pub fn new(client: ApiClient, poll_interval: Duration, max_upload_bytes: u64) -> Self {
        Self {
            client,
            state: new_state_handle(),
            cancel: CancellationToken::new(),
            poll_interval,
            max_upload_bytes,
        }
    }

    /// Current observable state of the job.
    pub fn snapshot(&self) -> JobState {
        read_job(&self.state, "snapshot", |s| s.clone())
    }

    /// Cooperative cancellation: takes effect before the next scheduled poll
    /// tick, after which no further status requests are issued.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Validate and upload a video, then start the status poll loop.
    ///
    /// Validation failures return before any network call and leave the job
    /// in `NotStarted`. Upload failures leave it in `Failed` with no poll
    /// loop. On success the job is `Queued` and polling runs until a terminal
    /// phase or [`JobTracker::stop`].
    pub async fn submit(&self, file_path: &str) -> ApiResult<()> {
        let already_started =
            read_job(&self.state, "submit guard", |s| s.phase != JobPhase::NotStarted);
        if already_started {
            return Err(ApiError::busy("job"));
        }

        InputValidator::validate_video_file(file_path, self.max_upload_bytes)?;

        let file_name = Path::new(file_path)
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let file_name = InputValidator::sanitize_filename(&file_name);

        update_job(&self.state, "submit", |s| {
            s.display_name = Some(file_name.clone());
            s.upload_progress = 0;
            advance_phase(s, JobPhase::Uploading);
        });

        log::info!("Uploading {} for detection", file_name);

        // Streamed from disk by the transport; only the size is needed here.
        let size = tokio::fs::metadata(file_path).await?.len();
        let progress_state = self.state.clone();
        let progress: ProgressFn = Arc::new(move |sent, total| {
            let percent = if total == 0 {
                100
            } else {
                ((sent * 100) / total).min(100) as u8
            };
            update_job(&progress_state, "upload progress", |s| {
                s.upload_progress = percent;
            });
        });

        let request = ApiRequest {
            method: Method::Post,
            path: "/detection/upload".to_string(),
            body: RequestBody::VideoUpload {
                field: "video".to_string(),
                file_name: file_name.clone(),
                mime: InputValidator::video_mime_for(file_path),
                path: Path::new(file_path).to_path_buf(),
                size,
                progress: Some(progress),
            },
            auth_override: None,
        };

        let upload: UploadResponse = match self.client.send(request).await {
            Ok(response) => match response.json() {
                Ok(parsed) => parsed,
                Err(e) => {
                    self.fail_submit(format!("Malformed upload response: {}", e));
                    return Err(e);
                }
            },
            Err(e) => {
                self.fail_submit(e.to_string());
                return Err(e);
            }
        };

        update_job(&self.state, "upload accepted", |s| {
            s.upload_progress = 100;
            s.job_id = Some(upload.video_id.clone());
            s.result_id = upload.result_id.clone();
            if let Some(server_name) = &upload.filename {
                s.display_name = Some(server_name.clone());
            }
            advance_phase(s, JobPhase::Queued);
        });

        log::info!("Upload accepted, job id {}", upload.video_id);

        self.spawn_poll_loop(upload.video_id, upload.result_id);
        Ok(())
    }

    fn fail_submit(&self, error: String) {
        log::error!("Upload failed: {}", error);
        update_job(&self.state, "upload failed", |s| {
            s.last_error = Some(error.clone());
            advance_phase(s, JobPhase::Failed);
        });
    }

    fn spawn_poll_loop(&self, job_id: String, result_id: Option<String>) {
        let client = self.client.clone();
        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let interval = self.poll_interval;

        tokio::spawn(async move {
            run_poll_loop(client, state, cancel, interval, job_id, result_id).await;
        });
    }
}

impl Drop for JobTracker {
    fn drop(&mut self) {
        // Orphaned polling outlives no one.
        self.cancel.cancel();
    }
}

/// Sequential status polling: each tick waits for the previous request to
/// resolve before the next timer is armed. Transient poll errors keep the
/// loop alive; only an explicit terminal status or cancellation ends it.
async fn run_poll_loop(
    client: ApiClient,
    state: JobStateHandle,
    cancel: CancellationToken,
    interval: Duration,
    job_id: String,
    result_id: Option<String>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                log::info!("Polling cancelled for job {}", job_id);
                return;
            }
            _ = sleep(interval) => {}
        }

        let response = client
            .get_json::<StatusResponse>(&format!("/detection/status/{}", job_id))
            .await;

        // A tracker cancelled mid-poll mutates nothing further.
        if cancel.is_cancelled() {
            log::info!("Polling cancelled for job {} (mid-poll)", job_id);
            return;
        }

        let status = match response {
            Ok(status) => status,
            Err(e) => {
                if e.is_permanent() {
                    log::error!("Polling aborted for job {}: {}", job_id, e);
                    update_job(&state, "poll aborted", |s| {
                        s.last_error = Some(e.to_string());
                        advance_phase(s, JobPhase::Failed);
                    });
                    return;
                }
                log::warn!("Transient poll error for job {}: {}", job_id, e);
                continue;
            }
        };

        let progress = status.progress.clamp(0.0, 100.0) as u8;

        match status.status.as_str() {
            "queued" => {
                update_job(&state, "poll queued", |s| {
                    s.processing_progress = progress;
                    advance_phase(s, JobPhase::Queued);
                });
            }
            "processing" => {
                update_job(&state, "poll processing", |s| {
                    s.processing_progress = progress;
                    advance_phase(s, JobPhase::Processing);
                });
            }
            "completed" => {
                finish_completed(&client, &state, &cancel, &job_id, result_id.as_deref()).await;
                return;
            }
            "failed" => {
                log::error!("Server reported job {} failed", job_id);
                update_job(&state, "poll failed", |s| {
                    s.processing_progress = progress;
                    s.last_error = Some("Video processing failed".to_string());
                    advance_phase(s, JobPhase::Failed);
                });
                return;
            }
            other => {
                // Unknown status from a newer/older server; treat like a
                // transient condition and keep polling.
                log::warn!("Unrecognized status '{}' for job {}", other, job_id);
            }
        }
    }
}

/// One results fetch after the server reports completion. A failed fetch
/// still leaves the job `Completed` (with empty results and a secondary
/// error); it never reverts to `Processing`.
async fn finish_completed(
    client: &ApiClient,
    state: &JobStateHandle,
    cancel: &CancellationToken,
    job_id: &str,
    result_id: Option<&str>,
) {
    let fetch_id = result_id.unwrap_or(job_id);

    let fetched = client
        .get_json::<ResultsResponse>(&format!("/detection/{}", fetch_id))
        .await;

    if cancel.is_cancelled() {
        return;
    }

    match fetched {
        Ok(parsed) => {
            log::info!(
                "Job {} completed with {} detections",
                job_id,
                parsed.results.len()
            );
            update_job(state, "results fetched", |s| {
                s.processing_progress = 100;
                if advance_phase(s, JobPhase::Completed) {
                    s.results = parsed.results;
                }
            });
        }
        Err(e) => {
            log::error!("Results fetch failed for job {}: {}", job_id, e);
            update_job(state, "results fetch failed", |s| {
                s.processing_progress = 100;
                s.last_error = Some(format!("Failed to fetch detection results: {}", e));
                advance_phase(s, JobPhase::Completed);
            });
        }
    }
}

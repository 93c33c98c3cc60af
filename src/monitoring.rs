use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::errors::{ApiError, ApiResult};
use crate::security::InputValidator;
use crate::session::ApiClient;

/// One named camera stream as last confirmed by the server. `is_active` never
/// flips optimistically; it reflects the last acknowledged start/stop.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamResource {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub is_active: bool,
    pub operation_pending: bool,
}

#[derive(Debug, Deserialize)]
struct StreamRecord {
    id: i64,
    name: String,
    url: String,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct StreamListResponse {
    streams: Vec<StreamRecord>,
}

#[derive(Debug, Deserialize)]
struct CreateStreamResponse {
    stream_id: i64,
}

#[derive(Default)]
struct MonitorState {
    /// Insertion order is display order.
    streams: Vec<StreamResource>,
    pending_ids: HashSet<i64>,
    pending_names: HashSet<String>,
}

/// Manages the collection of camera streams: create, start, stop, remove.
/// At most one lifecycle operation runs per stream at a time; a conflicting
/// call gets `Busy` instead of being queued or dropped.
#[derive(Clone)]
pub struct StreamManager {
    client: ApiClient,
    state: Arc<Mutex<MonitorState>>,
}

impl StreamManager {
    pub fn new(client: ApiClient) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(MonitorState::default())),
        }
    }

    /// Replace the local collection with the server's, preserving its order.
    pub async fn load(&self) -> ApiResult<Vec<StreamResource>> {
        let response: StreamListResponse = self.client.get_json("/live/livestreams").await?;

        let streams: Vec<StreamResource> = response
            .streams
            .into_iter()
            .map(|s| StreamResource {
                id: s.id,
                name: s.name,
                url: s.url,
                is_active: s.is_active,
                operation_pending: false,
            })
            .collect();

        log::info!("Loaded {} streams", streams.len());

        let mut state = self.lock_state();
        state.streams = streams.clone();
        state.pending_ids.clear();
        state.pending_names.clear();
        Ok(streams)
    }

    /// Ordered snapshot of the collection.
    pub fn list(&self) -> Vec<StreamResource> {
        let state = self.lock_state();
        state
            .streams
            .iter()
            .map(|s| StreamResource {
                operation_pending: state.pending_ids.contains(&s.id),
                ..s.clone()
            })
            .collect()
    }

    /// Register a new stream. The server assigns the id; the resource joins
    /// the local list only after acknowledgment, inactive.
    pub async fn create(&self, name: &str, url: &str) -> ApiResult<StreamResource> {
        InputValidator::validate_stream_name(name)?;
        InputValidator::validate_stream_url(url)?;

        let name = name.trim().to_string();
        let url = url.trim().to_string();

        // The id does not exist yet, so in-flight creates are keyed by name.
        {
            let mut state = self.lock_state();
            if state.pending_names.contains(&name) {
                return Err(ApiError::busy(format!("stream \"{}\"", name)));
            }
            state.pending_names.insert(name.clone());
        }

        let result: ApiResult<CreateStreamResponse> = self
            .client
            .post_json(
                "/live/livestreams",
                json!({ "stream_name": name, "stream_url": url }),
            )
            .await;

        let mut state = self.lock_state();
        state.pending_names.remove(&name);

        match result {
            Ok(created) => {
                let resource = StreamResource {
                    id: created.stream_id,
                    name: name.clone(),
                    url,
                    is_active: false,
                    operation_pending: false,
                };
                state.streams.push(resource.clone());
                log::info!("Stream \"{}\" created with id {}", name, created.stream_id);
                Ok(resource)
            }
            Err(e) => {
                log::error!("Failed to create stream \"{}\": {}", name, e);
                Err(e)
            }
        }
    }

    /// Start monitoring. `is_active` flips only after the server confirms.
    pub async fn start(&self, id: i64) -> ApiResult<()> {
        let (name, url) = self.begin_operation(id)?;

        let result = self
            .client
            .post_json::<serde_json::Value>(
                "/live/start",
                json!({ "stream_name": name, "stream_url": url }),
            )
            .await;

        self.end_operation(id, &result, |stream| stream.is_active = true);

        match result {
            Ok(_) => {
                log::info!("Monitoring started for stream {}", id);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to start stream {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Stop monitoring. As with `start`, state follows the acknowledgment.
    pub async fn stop(&self, id: i64) -> ApiResult<()> {
        let (name, _url) = self.begin_operation(id)?;

        let result = self
            .client
            .post_json::<serde_json::Value>("/live/stop", json!({ "stream_name": name }))
            .await;

        self.end_operation(id, &result, |stream| stream.is_active = false);

        match result {
            Ok(_) => {
                log::info!("Monitoring stopped for stream {}", id);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to stop stream {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Delete the stream server-side, then drop it locally. On failure the
    /// resource stays listed with pending cleared.
    pub async fn remove(&self, id: i64) -> ApiResult<()> {
        self.begin_operation(id)?;

        let result = self.client.delete(&format!("/live/livestreams/{}", id)).await;

        let mut state = self.lock_state();
        state.pending_ids.remove(&id);

        match result {
            Ok(_) => {
                state.streams.retain(|s| s.id != id);
                log::info!("Stream {} removed", id);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to remove stream {}: {}", id, e);
                Err(e)
            }
        }
    }

    /// Mark the stream busy before its network call. Rejects unknown ids and
    /// ids with an operation already in flight.
    fn begin_operation(&self, id: i64) -> ApiResult<(String, String)> {
        let mut state = self.lock_state();

        let stream = state
            .streams
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| ApiError::validation("id", "Stream not found"))?;
        let name = stream.name.clone();
        let url = stream.url.clone();

        if !state.pending_ids.insert(id) {
            log::warn!("Rejecting concurrent operation on stream {}", id);
            return Err(ApiError::busy(format!("stream {}", id)));
        }

        Ok((name, url))
    }

    /// Clear the pending flag on every exit path; apply `on_success` to the
    /// stream only when the server acknowledged.
    fn end_operation<F>(&self, id: i64, result: &ApiResult<serde_json::Value>, on_success: F)
    where
        F: FnOnce(&mut StreamResource),
    {
        let mut state = self.lock_state();
        state.pending_ids.remove(&id);

        if result.is_ok() {
            if let Some(stream) = state.streams.iter_mut().find(|s| s.id == id) {
                on_success(stream);
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::error!("Stream state lock poisoned (recovering)");
                poisoned.into_inner()
            }
        }
    }
}

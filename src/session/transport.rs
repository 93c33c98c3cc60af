use async_trait::async_trait;
use reqwest::multipart;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::errors::{ApiError, ApiResult};

/// Fractional progress callback: (bytes sent, total bytes).
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Outbound request body. Bodies are rebuildable so the pipeline can resend a
/// request once after a token refresh; uploads carry the file path and are
/// re-opened per attempt rather than buffered.
#[derive(Clone)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    VideoUpload {
        field: String,
        file_name: String,
        mime: &'static str,
        path: PathBuf,
        size: u64,
        progress: Option<ProgressFn>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

/// Description of one logical API call. The pipeline attaches credentials and
/// an explicit attempt counter; nothing here mutates between attempts.
#[derive(Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    /// Bearer credential override. `Some` bypasses the access token (the
    /// refresh call authenticates with the refresh token this way).
    pub auth_override: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: RequestBody::Empty,
            auth_override: None,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: RequestBody::Empty,
            auth_override: None,
        }
    }

    pub fn post_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: RequestBody::Json(body),
            auth_override: None,
        }
    }

    pub fn patch_json(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            method: Method::Patch,
            path: path.into(),
            body: RequestBody::Json(body),
            auth_override: None,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: RequestBody::Empty,
            auth_override: None,
        }
    }

    pub fn with_auth_override(mut self, token: impl Into<String>) -> Self {
        self.auth_override = Some(token.into());
        self
    }

    /// Prepare one attempt with the bearer the pipeline selected. The request
    /// itself stays untouched so a post-refresh resend starts from the same
    /// description.
    pub fn prepare_with(&self, bearer: Option<String>) -> PreparedRequest {
        PreparedRequest {
            method: self.method,
            path: self.path.clone(),
            body: self.body.clone(),
            bearer,
        }
    }

    /// Prepare using the auth override only (the refresh call authenticates
    /// with the refresh token and must never fall back to the access token).
    pub fn into_prepared(self) -> PreparedRequest {
        PreparedRequest {
            method: self.method,
            path: self.path,
            bearer: self.auth_override,
            body: self.body,
        }
    }
}

/// A fully prepared request: description plus the bearer token chosen by the
/// pipeline for this attempt.
#[derive(Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
    pub bearer: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> ApiResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Wire boundary. Production uses [`HttpTransport`]; tests script responses
/// through their own implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: PreparedRequest) -> ApiResult<RawResponse>;
}

/// `reqwest`-backed transport against the configured base URL.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Chunk size for streamed upload bodies; small enough that progress updates
/// are useful on slow links.
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Read the file in chunks as the body is consumed, reporting cumulative
/// progress per chunk. The file is never fully buffered; the configured
/// upload ceiling only bounds what the server accepts, not client memory.
fn upload_chunk_stream(
    path: PathBuf,
    total: u64,
    progress: Option<ProgressFn>,
) -> impl futures::Stream<Item = Result<Vec<u8>, std::io::Error>> {
    struct ReadState {
        file: Option<tokio::fs::File>,
        path: PathBuf,
        sent: u64,
        total: u64,
        progress: Option<ProgressFn>,
    }

    futures::stream::try_unfold(
        ReadState {
            file: None,
            path,
            sent: 0,
            total,
            progress,
        },
        |mut state| async move {
            let mut file = match state.file.take() {
                Some(file) => file,
                None => tokio::fs::File::open(&state.path).await?,
            };

            let mut chunk = vec![0u8; UPLOAD_CHUNK_BYTES];
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                return Ok(None);
            }
            chunk.truncate(read);

            state.sent += read as u64;
            if let Some(progress) = &state.progress {
                progress(state.sent, state.total);
            }

            state.file = Some(file);
            Ok(Some((chunk, state)))
        },
    )
}

fn upload_body(path: PathBuf, size: u64, progress: Option<ProgressFn>) -> reqwest::Body {
    reqwest::Body::wrap_stream(upload_chunk_stream(path, size, progress))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: PreparedRequest) -> ApiResult<RawResponse> {
        let url = self.url(&request.path);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Patch => self.client.patch(&url),
            Method::Delete => self.client.delete(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::VideoUpload {
                field,
                file_name,
                mime,
                path,
                size,
                progress,
            } => {
                let part =
                    multipart::Part::stream_with_length(upload_body(path, size, progress), size)
                        .file_name(file_name)
                        .mime_str(mime)?;
                builder.multipart(multipart::Form::new().part(field, part))
            }
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();

        log::debug!("{:?} {} -> {}", request.method, url, status);

        Ok(RawResponse { status, body })
    }
}

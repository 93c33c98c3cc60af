#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sentryview_client::errors::{ApiError, ApiResult};
use sentryview_client::session::transport::{
    Method, PreparedRequest, RawResponse, RequestBody, Transport,
};

/// What one scripted reply looks like.
enum Scripted {
    Response(u16, Value),
    /// Simulated connection failure (no response at all).
    NetworkError,
}

#[derive(Debug, Clone)]
pub struct CallRecord {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
}

type Handler = Box<dyn Fn(&CallRecord) -> (u16, Value) + Send + Sync>;

#[derive(Default)]
struct Inner {
    queues: HashMap<String, VecDeque<Scripted>>,
    handlers: HashMap<String, Handler>,
    delays: HashMap<String, Duration>,
    calls: Vec<CallRecord>,
}

/// In-process transport scripted per path. One-shot replies queue up via
/// [`MockTransport::enqueue`]; [`MockTransport::handle`] installs a repeatable
/// responder (and may key off the bearer, which is how token-rotation tests
/// stay deterministic under concurrency).
pub struct MockTransport {
    inner: Mutex<Inner>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        let _ = env_logger::builder().is_test(true).try_init();
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
        })
    }

    pub fn enqueue(&self, path: &str, status: u16, body: Value) {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted::Response(status, body));
    }

    pub fn enqueue_network_error(&self, path: &str) {
        self.inner
            .lock()
            .unwrap()
            .queues
            .entry(path.to_string())
            .or_default()
            .push_back(Scripted::NetworkError);
    }

    pub fn handle<F>(&self, path: &str, handler: F)
    where
        F: Fn(&CallRecord) -> (u16, Value) + Send + Sync + 'static,
    {
        self.inner
            .lock()
            .unwrap()
            .handlers
            .insert(path.to_string(), Box::new(handler));
    }

    /// Hold responses for `path` long enough that a test can overlap a second
    /// call with the first.
    pub fn set_delay(&self, path: &str, delay: Duration) {
        self.inner
            .lock()
            .unwrap()
            .delays
            .insert(path.to_string(), delay);
    }

    pub fn calls(&self) -> Vec<CallRecord> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: PreparedRequest) -> ApiResult<RawResponse> {
        let record = CallRecord {
            method: request.method,
            path: request.path.clone(),
            bearer: request.bearer.clone(),
        };

        // Uploads report completion the way a real send would.
        if let RequestBody::VideoUpload {
            size,
            progress: Some(progress),
            ..
        } = &request.body
        {
            progress(*size, *size);
        }

        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(record.clone());
            inner.delays.get(&request.path).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = {
            let mut inner = self.inner.lock().unwrap();
            match inner
                .queues
                .get_mut(&request.path)
                .and_then(|q| q.pop_front())
            {
                Some(scripted) => Some(scripted),
                None => inner
                    .handlers
                    .get(&request.path)
                    .map(|h| h(&record))
                    .map(|(status, body)| Scripted::Response(status, body)),
            }
        };

        match scripted {
            Some(Scripted::Response(status, body)) => Ok(RawResponse {
                status,
                body: serde_json::to_vec(&body).unwrap(),
            }),
            Some(Scripted::NetworkError) => Err(ApiError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "simulated connection failure",
            ))),
            None => Ok(RawResponse {
                status: 404,
                body: br#"{"error": "unscripted path"}"#.to_vec(),
            }),
        }
    }
}

/// Poll `predicate` until it holds or `timeout` elapses.
pub async fn wait_for<F>(timeout: Duration, mut predicate: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !predicate() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not reached within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

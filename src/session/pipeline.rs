use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::errors::{ApiError, ApiResult};
use crate::session::refresh::RefreshCoordinator;
use crate::session::store::CredentialStore;
use crate::session::transport::{ApiRequest, HttpTransport, RawResponse, Transport};

/// Authenticated request pipeline. Attaches the current access token, and on
/// the first 401 runs the single-flight refresh and resends exactly once.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    store: CredentialStore,
    refresher: RefreshCoordinator,
}

impl ApiClient {
    pub fn new(config: &ClientConfig, store: CredentialStore) -> ApiResult<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(
            &config.base_url,
            Duration::from_secs(config.request_timeout_secs),
        )?);
        Ok(Self::with_transport(transport, store))
    }

    /// Build the pipeline over an explicit transport. Tests script responses
    /// through this seam.
    pub fn with_transport(transport: Arc<dyn Transport>, store: CredentialStore) -> Self {
        let refresher = RefreshCoordinator::new(store.clone(), transport.clone());
        Self {
            transport,
            store,
            refresher,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub async fn send(&self, request: ApiRequest) -> ApiResult<RawResponse> {
        // Explicit attempt counter: one initial dispatch, at most one resend
        // after a successful refresh.
        let mut attempt: u8 = 0;

        loop {
            let bearer = request
                .auth_override
                .clone()
                .or_else(|| self.store.access_token());
            let prepared = request.prepare_with(bearer);

            let response = self.transport.execute(prepared).await?;

            if response.status == 401 && request.auth_override.is_none() {
                if attempt == 0 && self.store.refresh_token().is_some() {
                    attempt += 1;
                    log::info!(
                        "401 on {} - refreshing credentials and retrying once",
                        request.path
                    );
                    // Refresh failure clears the session and signals Expired;
                    // surface it unchanged.
                    self.refresher.refresh().await?;
                    continue;
                }

                if attempt > 0 {
                    // The refreshed token was rejected too; the session is gone.
                    log::warn!("401 after refresh on {} - session expired", request.path);
                    self.store.clear_expired();
                    return Err(ApiError::SessionExpired);
                }
            }

            if !response.is_success() {
                return Err(ApiError::from_response(response.status, &response.body));
            }

            return Ok(response);
        }
    }

    /// `GET` returning a decoded JSON body.
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> ApiResult<T> {
        self.send(ApiRequest::post_json(path, body)).await?.json()
    }

    pub async fn delete(&self, path: &str) -> ApiResult<RawResponse> {
        self.send(ApiRequest::delete(path)).await
    }
}

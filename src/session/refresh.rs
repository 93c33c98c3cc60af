use serde::Deserialize;
use std::sync::Arc;

use crate::errors::{ApiError, ApiResult};
use crate::session::store::CredentialStore;
use crate::session::transport::{ApiRequest, Transport};

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Single-flight token refresh. A burst of concurrent 401s funnels through
/// one gate: the first caller issues the network refresh, everyone queued
/// behind it adopts the outcome without a second call.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    gate: tokio::sync::Mutex<()>,
    store: CredentialStore,
    transport: Arc<dyn Transport>,
}

impl RefreshCoordinator {
    pub fn new(store: CredentialStore, transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                gate: tokio::sync::Mutex::new(()),
                store,
                transport,
            }),
        }
    }

    /// Obtain a fresh access token. Safe to call concurrently; failure is
    /// terminal for the attempt and clears the session.
    pub async fn refresh(&self) -> ApiResult<String> {
        let observed = self.inner.store.generation();
        let _gate = self.inner.gate.lock().await;

        // Another caller finished a refresh (or cleared the session) while we
        // waited on the gate; adopt that outcome.
        if self.inner.store.generation() != observed {
            return match self.inner.store.access_token() {
                Some(token) => {
                    log::debug!("Adopting refresh result from a concurrent caller");
                    Ok(token)
                }
                None => Err(ApiError::SessionExpired),
            };
        }

        let Some(refresh_token) = self.inner.store.refresh_token() else {
            return Err(ApiError::SessionExpired);
        };

        log::info!("Refreshing access token");

        let request = ApiRequest::post("/refresh")
            .with_auth_override(refresh_token)
            .into_prepared();

        match self.inner.transport.execute(request).await {
            Ok(response) if response.is_success() => {
                let parsed: RefreshResponse = response.json()?;
                self.inner.store.rotate_access(parsed.access_token.clone());
                log::info!("Access token refreshed");
                Ok(parsed.access_token)
            }
            Ok(response) => {
                log::warn!("Refresh rejected with status {}", response.status);
                self.inner.store.clear_expired();
                Err(ApiError::SessionExpired)
            }
            Err(e) => {
                log::error!("Refresh request failed: {}", e);
                self.inner.store.clear_expired();
                Err(ApiError::SessionExpired)
            }
        }
    }
}

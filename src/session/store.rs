use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use crate::errors::ApiResult;

/// Access/refresh credential pair. Both tokens live and die together; the
/// store never holds one without the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Observable session lifecycle, consumed by the presentation layer. `Expired`
/// is the signal to navigate back to the login entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    SignedOut,
    Active,
    Expired,
}

struct StoreInner {
    tokens: Mutex<Option<TokenPair>>,
    /// Bumped on every write. Callers queued behind the refresh gate compare
    /// generations to detect that another caller already rotated or cleared
    /// the pair while they waited.
    generation: AtomicU64,
    status_tx: watch::Sender<SessionStatus>,
    persist_path: Option<PathBuf>,
}

/// Process-wide credential state with explicit init and teardown. Writers are
/// the refresh path and explicit login/logout only; everything else reads.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

impl CredentialStore {
    /// Open the store backed by a JSON file, loading a persisted pair if one
    /// exists. A pair that fails to decode is discarded along with the file.
    pub fn open(path: PathBuf) -> ApiResult<Self> {
        let tokens = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<TokenPair>(&raw) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    log::warn!("Discarding undecodable session file: {}", e);
                    let _ = fs::remove_file(&path);
                    None
                }
            }
        } else {
            None
        };

        let status = if tokens.is_some() {
            SessionStatus::Active
        } else {
            SessionStatus::SignedOut
        };

        log::info!(
            "Credential store opened at {} ({})",
            path.display(),
            if tokens.is_some() {
                "session restored"
            } else {
                "no session"
            }
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                tokens: Mutex::new(tokens),
                generation: AtomicU64::new(0),
                status_tx: watch::channel(status).0,
                persist_path: Some(path),
            }),
        })
    }

    /// Open the store in the default data directory.
    pub fn open_default() -> ApiResult<Self> {
        let path = crate::config::get_data_directory()?.join("session.json");
        Self::open(path)
    }

    /// Non-persisted store, for tests and embedders that manage their own
    /// storage.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                tokens: Mutex::new(None),
                generation: AtomicU64::new(0),
                status_tx: watch::channel(SessionStatus::SignedOut).0,
                persist_path: None,
            }),
        }
    }

    /// Install a fresh pair after login or OTP verification.
    pub fn set(&self, pair: TokenPair) {
        self.write(Some(pair), SessionStatus::Active);
        log::info!("Session credentials installed");
    }

    /// Swap in a new access token after a successful refresh, keeping the
    /// current refresh token.
    pub fn rotate_access(&self, access_token: String) {
        let rotated = {
            let guard = self.lock_tokens();
            guard.as_ref().map(|pair| TokenPair {
                access_token,
                refresh_token: pair.refresh_token.clone(),
            })
        };

        match rotated {
            Some(pair) => {
                self.write(Some(pair), SessionStatus::Active);
                log::debug!("Access token rotated");
            }
            None => log::warn!("Refresh completed but the session was already cleared"),
        }
    }

    /// Explicit logout.
    pub fn clear(&self) {
        self.write(None, SessionStatus::SignedOut);
        log::info!("Session credentials cleared");
    }

    /// Teardown after an auth or refresh failure; signals the presentation
    /// layer to return to login.
    pub fn clear_expired(&self) {
        self.write(None, SessionStatus::Expired);
        log::warn!("Session expired; credentials cleared");
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock_tokens().as_ref().map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock_tokens().as_ref().map(|p| p.refresh_token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_tokens().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn status(&self) -> SessionStatus {
        *self.inner.status_tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    fn lock_tokens(&self) -> std::sync::MutexGuard<'_, Option<TokenPair>> {
        // A poisoned credential mutex means a writer panicked mid-store; the
        // data is a plain Option swap, so recover the guard.
        match self.inner.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self, tokens: Option<TokenPair>, status: SessionStatus) {
        {
            let mut guard = self.lock_tokens();
            *guard = tokens.clone();
        }
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
        let _ = self.inner.status_tx.send(status);
        self.persist(tokens.as_ref());
    }

    fn persist(&self, tokens: Option<&TokenPair>) {
        let Some(path) = &self.inner.persist_path else {
            return;
        };

        let result = match tokens {
            Some(pair) => serde_json::to_string(pair)
                .map_err(std::io::Error::other)
                .and_then(|raw| fs::write(path, raw)),
            None => {
                if path.exists() {
                    fs::remove_file(path)
                } else {
                    Ok(())
                }
            }
        };

        if let Err(e) = result {
            log::error!("Failed to persist session state (non-critical): {}", e);
        }
    }
}

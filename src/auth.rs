use serde::Deserialize;
use serde_json::json;

use crate::errors::ApiResult;
use crate::session::store::TokenPair;
use crate::session::ApiClient;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerMessage {
    pub message: String,
}

/// Account and session entry points. Successful login or OTP verification
/// installs the credential pair; everything downstream picks it up through
/// the pipeline.
#[derive(Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<()> {
        let response: TokenResponse = self
            .client
            .post_json(
                "/auth/login",
                json!({ "email": email, "password": password }),
            )
            .await?;

        self.client.store().set(TokenPair {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        });

        log::info!("Logged in as {}", email);
        Ok(())
    }

    /// Begin registration; the server mails an OTP which
    /// [`AuthService::verify_otp`] completes.
    pub async fn register(&self, name: &str, email: &str, password: &str) -> ApiResult<ServerMessage> {
        self.client
            .post_json(
                "/auth/register",
                json!({ "name": name, "email": email, "password": password }),
            )
            .await
    }

    pub async fn verify_otp(&self, email: &str, otp: &str) -> ApiResult<()> {
        let response: TokenResponse = self
            .client
            .post_json("/auth/verify-otp", json!({ "email": email, "otp": otp }))
            .await?;

        self.client.store().set(TokenPair {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        });

        log::info!("Registration verified for {}", email);
        Ok(())
    }

    /// Credentials are cleared locally even if the server call fails; a dead
    /// backend must not pin a user to a session they asked to leave.
    pub async fn logout(&self) -> ApiResult<()> {
        let result = self
            .client
            .send(crate::session::ApiRequest::post("/auth/logout"))
            .await;

        self.client.store().clear();

        if let Err(e) = result {
            log::warn!("Logout request failed (session cleared locally): {}", e);
        }
        Ok(())
    }

    pub async fn change_password(&self, old_password: &str, new_password: &str) -> ApiResult<ServerMessage> {
        self.client
            .send(crate::session::ApiRequest::patch_json(
                "/auth/change-password",
                json!({ "old_password": old_password, "new_password": new_password }),
            ))
            .await?
            .json()
    }

    pub async fn reset_password(&self, email: &str, new_password: &str) -> ApiResult<ServerMessage> {
        self.client
            .post_json(
                "/auth/reset-password",
                json!({ "email": email, "new_password": new_password }),
            )
            .await
    }

    pub async fn verify_password_otp(&self, email: &str, otp: &str) -> ApiResult<ServerMessage> {
        self.client
            .post_json(
                "/auth/password-otp-verify",
                json!({ "email": email, "otp": otp }),
            )
            .await
    }
}

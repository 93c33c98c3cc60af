use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    #[error("Invalid file type: {path}. Only MP4, AVI and MOV videos are supported.")]
    InvalidFileType { path: String },

    #[error("File too large: {path}. Maximum size is {limit_mb}MB.")]
    FileTooLarge { path: String, limit_mb: u64 },

    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Session expired. Sign in again to continue.")]
    SessionExpired,

    #[error("Operation already in progress for {resource}")]
    Busy { resource: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Custom result type
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(field: &str, message: &str) -> Self {
        Self::Validation {
            field: field.to_string(),
            message: message.to_string(),
        }
    }

    pub fn file_not_found(path: &str) -> Self {
        Self::FileNotFound {
            path: path.to_string(),
        }
    }

    pub fn invalid_file_type(path: &str) -> Self {
        Self::InvalidFileType {
            path: path.to_string(),
        }
    }

    pub fn file_too_large(path: &str, limit_mb: u64) -> Self {
        Self::FileTooLarge {
            path: path.to_string(),
            limit_mb,
        }
    }

    pub fn busy(resource: impl Into<String>) -> Self {
        Self::Busy {
            resource: resource.into(),
        }
    }

    /// Build a `Server` error from a non-success response body. The backend
    /// reports failures as `{"error": ...}` or `{"message": ...}`; anything
    /// else gets a generic fallback so callers always have something to show.
    pub fn from_response(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("error")
                    .or_else(|| v.get("message"))
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| format!("Request failed with status {}", status));

        Self::Server { status, message }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Io(_) => true,
            ApiError::Server { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ApiError::Validation { .. }
                | ApiError::InvalidFileType { .. }
                | ApiError::FileTooLarge { .. }
                | ApiError::FileNotFound { .. }
                | ApiError::SessionExpired
                | ApiError::Config(_)
        )
    }
}

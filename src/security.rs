use crate::errors::{ApiError, ApiResult};
use regex::Regex;
use std::path::Path;

pub struct InputValidator;

impl InputValidator {
    pub fn validate_stream_name(name: &str) -> ApiResult<()> {
        let trimmed = name.trim();

        if trimmed.is_empty() {
            return Err(ApiError::validation("name", "Stream name cannot be empty"));
        }

        if trimmed.len() > 100 {
            return Err(ApiError::validation(
                "name",
                "Stream name too long (max 100 characters)",
            ));
        }

        let safe_chars = Regex::new(r"^[a-zA-Z0-9\s\-_\.]+$").unwrap();
        if !safe_chars.is_match(trimmed) {
            return Err(ApiError::validation(
                "name",
                "Stream name contains invalid characters",
            ));
        }

        Ok(())
    }

    /// Stream sources are either a capture URL or a bare device index
    /// ("0" selects the local webcam).
    pub fn validate_stream_url(url: &str) -> ApiResult<()> {
        let trimmed = url.trim();

        if trimmed.is_empty() {
            return Err(ApiError::validation("url", "Stream URL cannot be empty"));
        }

        if trimmed.len() > 500 {
            return Err(ApiError::validation("url", "Stream URL too long"));
        }

        let device_index = Regex::new(r"^\d{1,2}$").unwrap();
        if device_index.is_match(trimmed) {
            return Ok(());
        }

        let stream_pattern = Regex::new(r"^(rtsp|rtmp|https?)://\S+$").unwrap();
        if !stream_pattern.is_match(trimmed) {
            return Err(ApiError::validation(
                "url",
                "Stream URL must be an rtsp://, rtmp:// or http(s):// address",
            ));
        }

        Ok(())
    }

    pub fn validate_file_path(path: &str) -> ApiResult<()> {
        if path.trim().is_empty() {
            return Err(ApiError::validation("file_path", "File path cannot be empty"));
        }

        let path_obj = Path::new(path);

        // Check for path traversal attempts
        if path.contains("..") || path.contains('~') {
            return Err(ApiError::validation("file_path", "Invalid file path detected"));
        }

        if let Some(extension) = path_obj.extension() {
            let ext = extension.to_string_lossy().to_lowercase();
            if !matches!(ext.as_str(), "mp4" | "avi" | "mov") {
                return Err(ApiError::invalid_file_type(path));
            }
        } else {
            return Err(ApiError::validation("file_path", "File must have an extension"));
        }

        if !path_obj.exists() {
            return Err(ApiError::file_not_found(path));
        }

        if !path_obj.is_file() {
            return Err(ApiError::validation("file_path", "Path is not a file"));
        }

        Ok(())
    }

    /// Full pre-upload check: path, extension and the configured size ceiling.
    /// Runs entirely locally so an invalid file never reaches the network.
    pub fn validate_video_file(file_path: &str, max_bytes: u64) -> ApiResult<()> {
        Self::validate_file_path(file_path)?;

        let metadata = std::fs::metadata(file_path)?;
        if metadata.len() > max_bytes {
            return Err(ApiError::file_too_large(
                file_path,
                max_bytes / (1024 * 1024),
            ));
        }

        Ok(())
    }

    pub fn video_mime_for(file_path: &str) -> &'static str {
        match Path::new(file_path)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .as_deref()
        {
            Some("avi") => "video/avi",
            Some("mov") => "video/quicktime",
            _ => "video/mp4",
        }
    }

    pub fn sanitize_filename(filename: &str) -> String {
        let unsafe_chars = Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).unwrap();
        let sanitized = unsafe_chars.replace_all(filename.trim(), "_");

        if sanitized.len() > 255 {
            // Truncate on a character boundary; a byte slice can split a
            // multibyte character and panic.
            let mut head = String::with_capacity(252);
            for ch in sanitized.chars() {
                if head.len() + ch.len_utf8() > 252 {
                    break;
                }
                head.push(ch);
            }
            format!("{}...", head)
        } else {
            sanitized.to_string()
        }
    }
}

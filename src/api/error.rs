use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - credentials or token were rejected")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("{0}")]
    Validation(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            // The cutoff is a byte budget; back up to a char boundary so a
            // multi-byte character straddling it cannot split the slice.
            let mut cut = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..cut],
                body.len()
            )
        }
    }

    /// Flatten a DRF error body into one readable line.
    ///
    /// Handles `{"detail": "..."}`, `{"message": "..."}`, and per-field
    /// error maps like `{"otp_code": ["Invalid OTP code."]}`. Returns None
    /// when the body is not JSON in one of those shapes.
    fn flatten_error_body(body: &str) -> Option<String> {
        let value: Value = serde_json::from_str(body).ok()?;
        let map = value.as_object()?;

        if let Some(detail) = map.get("detail").and_then(Value::as_str) {
            return Some(detail.to_string());
        }
        if let Some(message) = map.get("message").and_then(Value::as_str) {
            return Some(message.to_string());
        }

        let mut parts = Vec::new();
        for (field, errors) in map {
            let label = if field == "non_field_errors" {
                None
            } else {
                Some(field.as_str())
            };
            match errors {
                Value::String(text) => parts.push(Self::labeled(label, text)),
                Value::Array(items) => {
                    for item in items {
                        if let Some(text) = item.as_str() {
                            parts.push(Self::labeled(label, text));
                        }
                    }
                }
                _ => {}
            }
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    fn labeled(label: Option<&str>, text: &str) -> String {
        match label {
            Some(field) => format!("{field}: {text}"),
            None => text.to_string(),
        }
    }

    fn flatten_or_truncate(body: &str) -> String {
        Self::flatten_error_body(body).unwrap_or_else(|| Self::truncate_body(body))
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            400 => ApiError::Validation(Self::flatten_or_truncate(body)),
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(Self::flatten_or_truncate(body)),
            404 => ApiError::NotFound(Self::flatten_or_truncate(body)),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(Self::truncate_body(body)),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, Self::truncate_body(body))),
        }
    }

    /// Whether the server itself rejected the request's authorization.
    ///
    /// A 4xx answer from the refresh endpoint, 429 aside, means the refresh
    /// token is no good and the session is over. Rate limiting is pressure
    /// rather than a verdict, and transport and 5xx failures carry no
    /// verdict either.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized
                | ApiError::AccessDenied(_)
                | ApiError::NotFound(_)
                | ApiError::Validation(_)
        )
    }
}

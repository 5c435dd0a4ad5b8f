use thiserror::Error;

/// Failures of the local key-value store. These never escape the snapshot and
/// queue layer; they are logged and treated as a cache miss.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Remote store is offline")]
    Offline,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl RemoteError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => RemoteError::Unauthorized,
            403 => RemoteError::AccessDenied(truncated),
            404 => RemoteError::NotFound(truncated),
            429 => RemoteError::RateLimited,
            500..=599 => RemoteError::ServerError(truncated),
            _ => RemoteError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }
}

/// Why replaying a single queue entry failed.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Failed to encode queued record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SyncError {
    /// Encoding failures are not retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Remote(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            RemoteError::from_status(StatusCode::UNAUTHORIZED, ""),
            RemoteError::Unauthorized
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::FORBIDDEN, "nope"),
            RemoteError::AccessDenied(ref b) if b == "nope"
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::NOT_FOUND, "missing"),
            RemoteError::NotFound(_)
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            RemoteError::RateLimited
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::BAD_GATEWAY, ""),
            RemoteError::ServerError(_)
        ));
        assert!(matches!(
            RemoteError::from_status(StatusCode::IM_A_TEAPOT, ""),
            RemoteError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match RemoteError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            RemoteError::ServerError(msg) => {
                assert!(msg.len() < 600);
                assert!(msg.ends_with("(truncated, 2000 total bytes)"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_encode_errors_are_not_retryable() {
        let encode: SyncError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(!encode.is_retryable());
        assert!(SyncError::from(RemoteError::Offline).is_retryable());
    }
}

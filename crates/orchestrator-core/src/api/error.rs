use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid username or password.")]
    InvalidCredentials,

    #[error("Session expired. Please log in again.")]
    SessionExpired,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Network unavailable: {0}. Check your connection and try again.")]
    Network(String),

    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session storage failed: {0}")]
    Storage(String),
}

/// Maximum length for error messages lifted from response bodies
const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// Error body shapes the backend produces (`{"detail": ...}` or `{"message": ...}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<serde_json::Value>,
}

impl ApiError {
    /// True when the caller must send the user back through login.
    pub fn requires_login(&self) -> bool {
        matches!(self, ApiError::SessionExpired | ApiError::InvalidCredentials)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::AccessDenied(_) => Some(403),
            _ => None,
        }
    }

    /// Generic message used when a body carries nothing usable.
    pub fn generic_http(status: u16) -> Self {
        ApiError::Http {
            status,
            message: format!("HTTP error, status {}", status),
        }
    }

    /// Build an error for a non-success status, preferring `detail` then
    /// `message` from a JSON body.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let code = status.as_u16();
        match (code, Self::extract_message(body)) {
            (403, Some(message)) => ApiError::AccessDenied(message),
            (403, None) => ApiError::AccessDenied(format!("HTTP error, status {}", code)),
            (_, Some(message)) => ApiError::Http { status: code, message },
            (_, None) => Self::generic_http(code),
        }
    }

    /// Pull a human-readable message out of a structured error body.
    pub fn extract_message(body: &str) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_str(body).ok()?;
        let value = parsed.detail.or(parsed.message)?;
        let text = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => return None,
            other => other.to_string(),
        };
        if text.trim().is_empty() {
            return None;
        }
        Some(Self::truncate(text))
    }

    fn truncate(mut text: String) -> String {
        if text.len() > MAX_ERROR_MESSAGE_LENGTH {
            let mut cut = MAX_ERROR_MESSAGE_LENGTH;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("...");
        }
        text
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Network("request timed out".to_string())
        } else if err.is_connect() {
            ApiError::Network("could not connect to the backend".to_string())
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_detail_preferred_over_message() {
        let err = ApiError::from_status(
            StatusCode::BAD_REQUEST,
            r#"{"detail": "Project not found", "message": "ignored"}"#,
        );
        assert_eq!(
            err,
            ApiError::Http {
                status: 400,
                message: "Project not found".to_string()
            }
        );
    }

    #[test]
    fn test_message_field_used_without_detail() {
        let err = ApiError::from_status(StatusCode::CONFLICT, r#"{"message": "Duplicate key"}"#);
        assert_eq!(err.to_string(), "Duplicate key");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_generic_message_for_unparseable_body() {
        let err = ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP error, status 500");

        let err = ApiError::from_status(StatusCode::BAD_REQUEST, r#"{"errors": []}"#);
        assert_eq!(err.to_string(), "HTTP error, status 400");
    }

    #[test]
    fn test_forbidden_maps_to_access_denied() {
        let err = ApiError::from_status(
            StatusCode::FORBIDDEN,
            r#"{"detail": "You do not have permission to perform this action."}"#,
        );
        assert!(matches!(err, ApiError::AccessDenied(_)));
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn test_non_string_detail_is_rendered() {
        let msg = ApiError::extract_message(r#"{"detail": ["field is required"]}"#);
        assert_eq!(msg.as_deref(), Some(r#"["field is required"]"#));
    }

    #[test]
    fn test_long_messages_are_truncated() {
        let body = format!(r#"{{"detail": "{}"}}"#, "x".repeat(2000));
        let msg = ApiError::extract_message(&body).unwrap();
        assert!(msg.len() <= MAX_ERROR_MESSAGE_LENGTH + 3);
        assert!(msg.ends_with("..."));
    }

    #[test]
    fn test_error_kinds_are_distinguishable() {
        assert!(ApiError::SessionExpired.requires_login());
        assert!(!ApiError::Network("down".into()).requires_login());
        assert!(ApiError::Network("down".into()).is_network());
        assert_ne!(
            ApiError::Network("x".into()).to_string(),
            ApiError::generic_http(500).to_string()
        );
    }
}

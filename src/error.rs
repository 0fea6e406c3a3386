//! Error types for the display client
//!
//! Each layer owns its error enum (transport, config, store); [`ClientError`]
//! unifies them for callers that cross layers. None of these ever reach the
//! host application directly: the facade converts them into `on_error`
//! notifications after running them through [`sanitize_error_message`].

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

pub use crate::config::ConfigError;
pub use crate::protocol::IdentityError;
pub use crate::store::StoreError;
pub use crate::transport::TransportError;

/// Main error type for client operations
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Config store error: {0}")]
    Store(#[from] StoreError),

    #[error("Device identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session closed: {message}")]
    SessionClosed { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ClientError {
    /// Create session closed error
    pub fn session_closed<S: Into<String>>(message: S) -> Self {
        Self::SessionClosed {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Message suitable for the application's `on_error` callback
    pub fn to_user_message(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SENSITIVE_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Redact credentials and sensitive paths, then cap the length
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN.replace_all(message, "${1}=***").to_string();
    sanitized = SENSITIVE_PATH_PATTERN
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_redacts_credentials() {
        let sanitized =
            sanitize_error_message("Broker refused: password=secret123 token=abc456");

        assert!(!sanitized.contains("secret123"));
        assert!(!sanitized.contains("abc456"));
        assert!(sanitized.contains("password=***"));
        assert!(sanitized.contains("token=***"));
    }

    #[test]
    fn test_sanitize_case_insensitive_and_colons() {
        let sanitized = sanitize_error_message("PASSWORD: hunter2 Key=xyz");
        assert!(!sanitized.contains("hunter2"));
        assert!(!sanitized.contains("xyz"));
    }

    #[test]
    fn test_sanitize_redacts_sensitive_paths() {
        let sanitized = sanitize_error_message("cannot read /home/pi/.ssh/id_rsa");
        assert!(sanitized.contains("/***REDACTED***/"));
        assert!(!sanitized.contains("id_rsa"));
    }

    #[test]
    fn test_long_message_truncation() {
        let sanitized = sanitize_error_message(&"x".repeat(600));
        assert!(sanitized.len() <= MAX_ERROR_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let sanitized = sanitize_error_message(&"连接失败".repeat(100));
        assert!(sanitized.len() <= MAX_ERROR_MESSAGE_LEN);
        assert!(sanitized.ends_with("...[truncated]"));
    }

    #[test]
    fn test_exactly_max_len_is_untouched() {
        let message = "x".repeat(MAX_ERROR_MESSAGE_LEN);
        assert_eq!(sanitize_error_message(&message), message);
    }

    #[test]
    fn test_client_error_constructors() {
        let error = ClientError::internal("unexpected state");
        assert_eq!(error.to_string(), "Internal error: unexpected state");

        let error = ClientError::session_closed("actor stopped");
        assert!(matches!(error, ClientError::SessionClosed { .. }));
    }

    #[test]
    fn test_transport_error_converts() {
        let error: ClientError = TransportError::NotConnected.into();
        assert!(error.to_user_message().contains("Not connected"));
    }
}

// src/infra/errors.rs - Error types for noveler

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NovelerError {
    // Surfaced to the user as an assistant message
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // Boundary validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Session '{0}' not found")]
    SessionNotFound(String),

    // Infra
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl NovelerError {
    /// Whether this error is reported to the user as a chat message.
    /// Everything else is logged and absorbed.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            NovelerError::Config(_)
                | NovelerError::Transport(_)
                | NovelerError::HttpStatus { .. }
        )
    }
}

impl From<reqwest::Error> for NovelerError {
    fn from(e: reqwest::Error) -> Self {
        NovelerError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible_classes() {
        assert!(NovelerError::Config("no provider".into()).is_user_visible());
        assert!(NovelerError::Transport("refused".into()).is_user_visible());
        assert!(NovelerError::HttpStatus {
            status: 401,
            body: "bad key".into()
        }
        .is_user_visible());
        assert!(!NovelerError::InvalidMessage("x".into()).is_user_visible());
        assert!(!NovelerError::SessionNotFound("s".into()).is_user_visible());
    }

    #[test]
    fn test_display_http_status() {
        let e = NovelerError::HttpStatus {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(e.to_string(), "Upstream returned HTTP 500: boom");
    }
}

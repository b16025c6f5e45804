//! Error types for the member roster client

use thiserror::Error;

/// Generic message shown when a request could not reach the record service.
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Não foi possível contactar o servidor. Tente novamente.";

/// Roster client error
///
/// Every variant is recoverable by retrying; nothing here is fatal to the
/// process.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Request could not complete (connection, timeout, body decode)
    #[error("Network error: {0}")]
    Network(String),

    /// Server answered with a non-success status
    #[error("Rejected by server ({}): {message}", status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()))]
    Rejected { status: Option<u16>, message: String },

    /// Local normalization produced an invalid value; nothing was sent
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Capability token payload could not be decoded
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RosterError {
    /// Message suitable for a user-facing notice.
    pub fn user_message(&self) -> String {
        match self {
            RosterError::Network(_) => NETWORK_FAILURE_MESSAGE.to_string(),
            RosterError::Rejected { message, .. } => message.clone(),
            RosterError::Validation(message) => message.clone(),
            RosterError::MalformedToken(_) => "Token inválido.".to_string(),
            RosterError::Config(message) => message.clone(),
            RosterError::Json(_) => "Resposta inválida do servidor.".to_string(),
        }
    }

    /// Whether the request never left the client.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            RosterError::Validation(_) | RosterError::MalformedToken(_) | RosterError::Config(_)
        )
    }

    /// HTTP status, when the server produced one
    pub fn status(&self) -> Option<u16> {
        match self {
            RosterError::Rejected { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RosterError {
    fn from(err: reqwest::Error) -> Self {
        RosterError::Network(err.to_string())
    }
}

/// Result type for roster operations
pub type Result<T> = std::result::Result<T, RosterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_errors() {
        assert!(RosterError::Validation("x".into()).is_local());
        assert!(RosterError::MalformedToken("x".into()).is_local());
        assert!(!RosterError::Network("down".into()).is_local());
        assert!(!RosterError::Rejected { status: Some(401), message: "no".into() }.is_local());
    }

    #[test]
    fn test_user_message_hides_transport_detail() {
        let err = RosterError::Network("tcp connect error: 10.0.0.1:8000".into());
        assert_eq!(err.user_message(), NETWORK_FAILURE_MESSAGE);

        let err = RosterError::Rejected { status: Some(404), message: "Membro não encontrado".into() };
        assert_eq!(err.user_message(), "Membro não encontrado");
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_display_without_status() {
        let err = RosterError::Rejected { status: None, message: "falhou".into() };
        assert_eq!(err.to_string(), "Rejected by server (-): falhou");
    }
}

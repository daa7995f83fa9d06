use thiserror::Error;

use dojo_core::DomainError;

use crate::backend::BackendError;

/// Uniform failure contract of the session gateway.
///
/// The auth variants display exactly the backend-provided message, so it can
/// be shown to the user verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Sign-in, user fetch or role fetch failed.
    #[error("{0}")]
    Authentication(String),

    /// The auth identity could not be created.
    #[error("{0}")]
    Registration(String),

    /// The backend rejected the sign-out.
    #[error("{0}")]
    Logout(String),

    /// Rejected locally before anything was sent.
    #[error(transparent)]
    InvalidInput(#[from] DomainError),
}

impl GatewayError {
    pub(crate) fn authentication(err: &BackendError) -> Self {
        Self::Authentication(message_or(err, "Erro ao fazer login"))
    }

    pub(crate) fn registration(err: &BackendError) -> Self {
        Self::Registration(message_or(err, "Erro ao registrar usuário"))
    }

    pub(crate) fn logout(err: &BackendError) -> Self {
        Self::Logout(message_or(err, "Erro ao fazer logout"))
    }
}

fn message_or(err: &BackendError, fallback: &str) -> String {
    let msg = err.to_string();
    if msg.trim().is_empty() {
        fallback.to_string()
    } else {
        msg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carries_backend_message_verbatim() {
        let err = GatewayError::authentication(&BackendError::rejected("Invalid login credentials"));
        assert_eq!(err.to_string(), "Invalid login credentials");
    }

    #[test]
    fn blank_backend_message_gets_fallback() {
        let err = GatewayError::registration(&BackendError::rejected(""));
        assert_eq!(err.to_string(), "Erro ao registrar usuário");

        let err = GatewayError::logout(&BackendError::rejected("  "));
        assert_eq!(err, GatewayError::Logout("Erro ao fazer logout".into()));
    }

    #[test]
    fn non_rejection_faults_keep_their_description() {
        let err = GatewayError::authentication(&BackendError::Network("connection refused".into()));
        assert_eq!(err.to_string(), "network error: connection refused");
    }
}

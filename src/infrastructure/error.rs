use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Credential store error: {0}")]
    Credential(String),
    #[error("missing credentials: username and password must be configured")]
    MissingCredentials,
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),
    #[error("invalid credentials: login was rejected")]
    InvalidCredentials,
    #[error("login token not found in login page")]
    TokenNotFound,
    #[error("session key not found in authenticated page")]
    SessionKeyNotFound,
    #[error("moodle api error: {0}")]
    ApiError(String),
    #[error("parse error: {0}")]
    ParseError(String),
    #[error("notification permission denied: {0}")]
    PermissionDenied(String),
}

impl InfraError {
    /// Failures of a single network run that the refresh pipeline logs and absorbs.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InfraError::NetworkUnreachable(_)
                | InfraError::InvalidCredentials
                | InfraError::TokenNotFound
                | InfraError::SessionKeyNotFound
                | InfraError::ApiError(_)
                | InfraError::ParseError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_failures_are_transient_and_setup_failures_are_not() {
        assert!(InfraError::InvalidCredentials.is_transient());
        assert!(InfraError::ApiError("expired".to_string()).is_transient());
        assert!(!InfraError::MissingCredentials.is_transient());
        assert!(!InfraError::Credential("locked".to_string()).is_transient());
        assert!(!InfraError::PermissionDenied("off".to_string()).is_transient());
    }
}

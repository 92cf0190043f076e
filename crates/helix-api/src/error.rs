use thiserror::Error;

/// Errors surfaced by the Helix client.
///
/// Rate limits and expired tokens are handled inside the client; what reaches the
/// caller is terminal for the request that produced it.
#[derive(Debug, Error)]
pub enum HelixError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("token request rejected ({status}): {message}")]
    TokenRejected { status: u16, message: String },
    #[error("access token rejected after refresh")]
    Unauthorized,
    #[error("rate limit exceeded after {retries} retries")]
    RateLimited { retries: u32 },
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl HelixError {
    /// Check if the failure may go away on a later attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if the configured client credentials need operator attention.
    pub fn requires_new_credentials(&self) -> bool {
        matches!(
            self,
            Self::MissingCredential(_) | Self::TokenRejected { .. } | Self::Unauthorized
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(HelixError::RateLimited { retries: 3 }.is_transient());
        assert!(
            HelixError::Api {
                status: 503,
                message: "unavailable".to_string()
            }
            .is_transient()
        );
        assert!(
            !HelixError::Api {
                status: 400,
                message: "bad request".to_string()
            }
            .is_transient()
        );
        assert!(HelixError::Unauthorized.requires_new_credentials());
        assert!(HelixError::MissingCredential("client_id").requires_new_credentials());
        assert!(!HelixError::RateLimited { retries: 1 }.requires_new_credentials());
    }
}

use thiserror::Error;

/// Errors surfaced by embedding providers.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmbedError {
    /// Configuration is inconsistent (e.g. api mode without an `api_url`).
    #[error("invalid embed config: {0}")]
    InvalidConfig(String),
    /// Nothing to embed after trimming and tokenizing.
    #[error("input text is empty")]
    EmptyInput,
    /// The request never produced a response (connect, TLS, reset).
    #[error("embedding request failed: {0}")]
    Request(String),
    /// The provider answered with a non-success status.
    #[error("embedding provider returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// The provider did not answer within the configured timeout.
    #[error("embedding request timed out after {0} ms")]
    Timeout(u64),
    /// The response body was not an embedding we understand.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbedError {
    /// Whether trying the same input again later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            EmbedError::Request(_) | EmbedError::Timeout(_) | EmbedError::InvalidResponse(_) => {
                true
            }
            EmbedError::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            EmbedError::InvalidConfig(_) | EmbedError::EmptyInput => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_details() {
        let err = EmbedError::Http {
            status: 503,
            body: "model loading".into(),
        };
        assert!(err.to_string().contains("HTTP 503"));
        assert!(err.to_string().contains("model loading"));

        let err = EmbedError::InvalidConfig("api_url is required".into());
        assert!(err.to_string().contains("invalid embed config"));
    }

    #[test]
    fn transient_failures_are_retryable() {
        assert!(EmbedError::Timeout(5000).is_retryable());
        assert!(EmbedError::Request("connection reset".into()).is_retryable());
        assert!(EmbedError::Http {
            status: 429,
            body: String::new()
        }
        .is_retryable());
        assert!(EmbedError::Http {
            status: 502,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn caller_mistakes_are_not_retryable() {
        assert!(!EmbedError::EmptyInput.is_retryable());
        assert!(!EmbedError::InvalidConfig("x".into()).is_retryable());
        assert!(!EmbedError::Http {
            status: 400,
            body: String::new()
        }
        .is_retryable());
    }
}

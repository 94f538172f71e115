use thiserror::Error;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Provider request failed: {0}")]
    ProviderRequest(String),

    #[error("Provider returned HTTP {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("Invalid provider response: {0}")]
    ProviderResponse(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown subscription status: {0}")]
    UnknownStatus(String),
}

impl BillingError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Errors raised while talking to the payment provider.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Self::ProviderRequest(_) | Self::ProviderStatus { .. } | Self::ProviderResponse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_classified() {
        assert!(BillingError::ProviderRequest("timeout".into()).is_provider());
        assert!(
            BillingError::ProviderStatus {
                status: 502,
                body: "bad gateway".into()
            }
            .is_provider()
        );
        assert!(!BillingError::store("connection refused").is_provider());
    }

    #[test]
    fn status_error_display() {
        let err = BillingError::ProviderStatus {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "Provider returned HTTP 503: unavailable");
    }
}

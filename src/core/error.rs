//! Error taxonomy shared by all provider adapters
//!
//! The retry policy keys off these variants: only `Transient` is ever
//! retried. Everything else reaches the caller on the first attempt so the
//! boundary layer can tell bad input from a dead provider from a declared
//! capability gap.

use thiserror::Error;

use crate::core::model::ProviderKind;

/// Result type for gateway and provider operations
pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Error, Debug)]
pub enum ProviderError {
    /// Caller input failed an adapter's required-field check. Raised before
    /// any network traffic.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The provider fundamentally cannot perform this operation.
    #[error("{operation} is not supported by {provider}")]
    Unsupported {
        provider: ProviderKind,
        operation: &'static str,
    },

    /// The provider answered with a shape this crate cannot parse. Signals
    /// an upstream contract change, not a transport problem.
    #[error("unexpected {provider} response: {detail}")]
    Contract {
        provider: ProviderKind,
        detail: String,
    },

    /// The provider rejected the request with a definite (non-5xx) error
    /// status.
    #[error("{provider} request failed with status {status}: {detail}")]
    Http {
        provider: ProviderKind,
        status: u16,
        detail: String,
    },

    /// Network failure, timeout, or a 5xx answer. Eligible for retry.
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// Orchestration fault inside the gateway itself.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether the retry policy may re-attempt the failed operation.
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }

    pub(crate) fn contract(provider: ProviderKind, detail: impl Into<String>) -> Self {
        ProviderError::Contract {
            provider,
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProviderError::Transient("connection reset".into()).is_transient());

        let terminal = [
            ProviderError::Validation("accessToken is required".into()),
            ProviderError::Unsupported {
                provider: ProviderKind::Stripe,
                operation: "get_institutions",
            },
            ProviderError::Contract {
                provider: ProviderKind::Plaid,
                detail: "missing field `accounts`".into(),
            },
            ProviderError::Http {
                provider: ProviderKind::Teller,
                status: 404,
                detail: "not found".into(),
            },
            ProviderError::Internal("health fan-out failed".into()),
        ];
        for err in terminal {
            assert!(!err.is_transient(), "{err} must not be retried");
        }
    }

    #[test]
    fn test_unsupported_message_names_provider_and_operation() {
        let err = ProviderError::Unsupported {
            provider: ProviderKind::Stripe,
            operation: "get_institutions",
        };
        assert_eq!(
            err.to_string(),
            "get_institutions is not supported by stripe"
        );
    }
}

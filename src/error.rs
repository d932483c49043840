//! Error types for riskmeter.

use thiserror::Error;

/// Errors produced by the rating pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum MeterError {
    /// The caller supplied an empty or unusable batch.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Prompt file unreadable, credential missing, or bad configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The generation service failed or returned nothing usable.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The generation service rejected the request with HTTP 429.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// The generation service rejected the credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Model output did not contain a well-formed verdict.
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MeterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_category() {
        let err = MeterError::Config("OPENAI_API_KEY is not set".into());
        assert_eq!(
            err.to_string(),
            "Configuration error: OPENAI_API_KEY is not set"
        );
    }

    #[test]
    fn test_provider_errors_keep_detail() {
        let err = MeterError::RateLimited("Rate limit reached for gpt-4o".into());
        assert_eq!(err.to_string(), "Rate limited: Rate limit reached for gpt-4o");
    }
}

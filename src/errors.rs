//! Domain error types.
//!
//! Typed errors at the model-client and storage boundaries. The CLI layer
//! wraps them in `anyhow::Error`; the evaluation pipeline matches on them
//! to decide what is retried, skipped, or reported.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Model client errors
// ---------------------------------------------------------------------------

/// Errors from answering a question with a model.
///
/// Every variant is treated as transient by the answer collector: a trial
/// retries on any of them until its attempt budget is spent.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Failed to read response body: {0}")]
    ResponseReadError(String),

    #[error("Model API returned status {status}: {message}")]
    StatusError { status: u16, message: String },

    #[error("Failed to parse response JSON: {0}")]
    JsonParseError(String),

    #[error("Response did not contain an answer")]
    MissingAnswer,

    #[error("Answer {answer:?} is not one of the presented options")]
    InvalidAnswer { answer: String },

    #[error("No client configured for model '{0}'")]
    NotConfigured(String),

    #[error("Environment variable {0} is not set")]
    MissingApiKey(String),
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from the answer store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The answer references a question the store has never seen.
    #[error("Unknown question '{0}'")]
    UnknownQuestion(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Blocking store task failed: {0}")]
    TaskJoin(String),
}

// ---------------------------------------------------------------------------
// Evaluation errors
// ---------------------------------------------------------------------------

/// Configuration errors that stop an evaluation run before any model call.
///
/// Trial failures and individual write failures are not errors at this
/// level; they are counted in the run summary instead.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Option style '{style}' has {prefixes} prefixes but question '{question}' has {options} options")]
    PrefixMismatch {
        style: String,
        question: String,
        prefixes: usize,
        options: usize,
    },

    #[error("Question '{0}' has no options")]
    NoOptions(String),

    #[error("Number of evaluations must be at least 1")]
    NoTrials,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_messages() {
        let err = ModelError::InvalidAnswer {
            answer: "C.".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Answer \"C.\" is not one of the presented options"
        );

        let err = ModelError::StatusError {
            status: 429,
            message: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "Model API returned status 429: rate limited");
    }

    #[test]
    fn test_store_error_from_serde() {
        let parse_err = serde_json::from_str::<Vec<String>>("not json").unwrap_err();
        let err: StoreError = parse_err.into();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}

/// Error taxonomy and retryability classification.
///
/// Errors are classified by kind, not by type: the pipeline reacts to the
/// kind (isolate, retry, abandon the record) and carries the original
/// error for the run log.
use anyhow::Error;
use sqlx::Error as SqlxError;

/// What a failure means for the record or the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Record malformed or missing a stable identifier after synthesis.
    /// Fatal for that record only.
    Input,
    /// Upstream source failure. Retried with backoff, then surfaced as a
    /// run-level warning.
    Source,
    /// Failure inside an enrichment stage. Captured at the stage boundary.
    Stage,
    /// Row-level persistence failure. The batch continues.
    Persistence,
    /// Paid-source cost limit reached. Further purchases are skipped.
    Budget,
    /// Cooperative cancellation.
    Cancelled,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Input => "input_error",
            ErrorKind::Source => "source_error",
            ErrorKind::Stage => "stage_error",
            ErrorKind::Persistence => "persistence_error",
            ErrorKind::Budget => "budget_exhausted",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Typed wrapper used when a component needs to force a specific kind onto
/// an underlying error before it crosses a boundary.
#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ClassifiedError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Classify an arbitrary error into a taxonomy kind.
///
/// A `ClassifiedError` anywhere in the chain wins; otherwise database
/// errors map to `Persistence`, timeouts to `Source`, and everything else
/// to `Stage` (the executor is the usual caller).
#[must_use]
pub fn classify(error: &Error) -> ErrorKind {
    for cause in error.chain() {
        if let Some(classified) = cause.downcast_ref::<ClassifiedError>() {
            return classified.kind;
        }
        if cause.downcast_ref::<SqlxError>().is_some() {
            return ErrorKind::Persistence;
        }
        if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return ErrorKind::Source;
        }
    }
    ErrorKind::Stage
}

/// Whether a source-call failure is worth another attempt.
///
/// Pool exhaustion, connection-level database failures and timeouts are
/// transient; configuration and row-shape problems are not.
#[must_use]
pub fn is_retryable(error: &Error) -> bool {
    for cause in error.chain() {
        if cause.downcast_ref::<tokio::time::error::Elapsed>().is_some() {
            return true;
        }
        if let Some(sqlx_err) = cause.downcast_ref::<SqlxError>() {
            return matches!(
                sqlx_err,
                SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_)
            );
        }
    }
    false
}

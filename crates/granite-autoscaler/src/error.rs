//! Error types for the autoscaler.

use thiserror::Error;

/// Result type for autoscaler operations.
pub type Result<T> = std::result::Result<T, AutoscalerError>;

/// Errors that can occur while processing a tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AutoscalerError {
    /// The snapshot payload could not be decoded or deserialized.
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot {
        /// Description of the decoding failure.
        reason: String,
    },

    /// The snapshot deserialized but violates a structural constraint.
    #[error("invalid snapshot: {reason}")]
    InvalidSnapshot {
        /// Description of the violated constraint.
        reason: String,
    },

    /// The resolved strategy exposes no sizing operation.
    #[error("scaling method '{method}' has no sizing operation")]
    NoSizingOperation {
        /// Name of the strategy that could not be used.
        method: String,
    },

    /// The state store could not be opened, read, or written.
    #[error("state store error: {reason}")]
    StateStore {
        /// Description of the store failure.
        reason: String,
    },

    /// The resize API rejected or failed the submission.
    #[error("resize submission failed: {reason}")]
    ResizeFailed {
        /// Description of the submission failure.
        reason: String,
    },

    /// The operation-status API could not be reached or answered with
    /// garbage.
    #[error("operation status unavailable: {reason}")]
    StatusUnavailable {
        /// Description of the status failure.
        reason: String,
    },

    /// The downstream publisher rejected the event.
    #[error("event publish failed: {reason}")]
    PublishFailed {
        /// Description of the publish failure.
        reason: String,
    },

    /// An external call exceeded its deadline.
    #[error("deadline exceeded after {millis} ms")]
    DeadlineExceeded {
        /// The deadline that was exceeded, in milliseconds.
        millis: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_malformed_snapshot() {
        let err = AutoscalerError::MalformedSnapshot {
            reason: "not base64".into(),
        };
        assert_eq!(err.to_string(), "malformed snapshot: not base64");
    }

    #[test]
    fn error_display_no_sizing_operation() {
        let err = AutoscalerError::NoSizingOperation {
            method: "STEPWISE".into(),
        };
        assert_eq!(
            err.to_string(),
            "scaling method 'STEPWISE' has no sizing operation"
        );
    }

    #[test]
    fn error_display_deadline() {
        let err = AutoscalerError::DeadlineExceeded { millis: 30_000 };
        assert_eq!(err.to_string(), "deadline exceeded after 30000 ms");
    }

    #[test]
    fn error_clone_and_eq() {
        let err1 = AutoscalerError::StateStore {
            reason: "disk full".into(),
        };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}

//! Controller error types.
//!
//! Job outcomes are never errors: a failed or cancelled build is data that
//! surfaces as a [`ControllerEvent`](super::events::ControllerEvent). The
//! types here cover misuse of the job index and failures of the controller
//! service itself.

use thiserror::Error;

use super::job::{JobKey, JobRunKey, JobState};

/// Errors raised by [`JobIndex`](super::index::JobIndex) state transitions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    /// A pending job for this key already exists; it must be cancelled first.
    #[error("job {0} is already pending")]
    DuplicatePending(JobKey),

    /// The run key is already registered.
    #[error("run key {0} is already registered")]
    DuplicateRunKey(JobRunKey),

    /// No live record carries this run key.
    #[error("unknown run key {0}")]
    UnknownRunKey(JobRunKey),

    /// The record is not in the state the transition requires.
    #[error("job {run_key} is {actual}, expected {expected}")]
    InvalidState {
        run_key: JobRunKey,
        expected: JobState,
        actual: JobState,
    },
}

/// Errors raised by the asynchronous controller service.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The service is no longer running.
    #[error("controller channel closed")]
    ChannelClosed,

    /// In-flight jobs did not acknowledge cancellation during shutdown.
    #[error("shutdown timed out after {polls} polls with {in_flight} job(s) in flight")]
    ShutdownTimeout { polls: u32, in_flight: usize },

    /// A job index transition failed.
    #[error(transparent)]
    Index(#[from] IndexError),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for ControllerError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        Self::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for ControllerError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        Self::ChannelClosed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_error_display() {
        let err = IndexError::DuplicatePending(JobKey::new("a.png", "pc", "tex"));
        assert_eq!(err.to_string(), "job [a.png, pc, tex] is already pending");

        let err = IndexError::InvalidState {
            run_key: JobRunKey::new(7),
            expected: JobState::Pending,
            actual: JobState::Processing,
        };
        assert_eq!(err.to_string(), "job 7 is processing, expected pending");
    }

    #[test]
    fn test_shutdown_timeout_display() {
        let err = ControllerError::ShutdownTimeout {
            polls: 3,
            in_flight: 2,
        };
        assert!(err.to_string().contains("2 job(s) in flight"));
    }

    #[test]
    fn test_index_error_converts() {
        let err: ControllerError = IndexError::UnknownRunKey(JobRunKey::new(1)).into();
        assert!(matches!(err, ControllerError::Index(_)));
    }
}

//! Error taxonomy for the continuation engine.
//!
//! `IllegalState` and `NotFound` surface synchronously to whoever made the
//! offending call. `Io`, `TaskFailure` and `HandlerFailure` are also returned,
//! but by the time the caller sees them the exchange has already been forced
//! toward completion with a failure status.

use crate::continuation::ContinuationState;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ContinuationError>;

/// Everything that can go wrong while driving an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContinuationError {
    /// The operation is not valid for the exchange's current state
    /// (double `start`, `dispatch` without `start`, any call after completion).
    #[error("illegal state: cannot {operation} while {state}")]
    IllegalState {
        operation: &'static str,
        state: ContinuationState,
    },
    /// No handler is registered for the requested path.
    #[error("no handler registered for path '{path}'")]
    NotFound { path: String },
    /// Write to a closed or broken response sink.
    #[error("response write failed: {reason}")]
    Io { reason: String },
    /// A scheduled task returned an error or panicked.
    #[error("scheduled task failed: {message}")]
    TaskFailure { message: String },
    /// A handler returned an error or panicked during a dispatch.
    #[error("handler for '{path}' failed: {message}")]
    HandlerFailure { path: String, message: String },
    /// The worker scheduler no longer accepts work.
    #[error("worker scheduler is not accepting work")]
    SchedulerUnavailable,
    /// The connector could not make sense of the raw request.
    #[error("malformed request: {reason}")]
    MalformedRequest { reason: String },
}

impl ContinuationError {
    pub(crate) fn illegal(operation: &'static str, state: ContinuationState) -> Self {
        Self::IllegalState { operation, state }
    }

    /// Status code an exchange is completed with when this error forces it closed.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::MalformedRequest { .. } => 400,
            Self::SchedulerUnavailable => 503,
            Self::IllegalState { .. }
            | Self::Io { .. }
            | Self::TaskFailure { .. }
            | Self::HandlerFailure { .. } => 500,
        }
    }

    #[must_use]
    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }
}

/// Render a `catch_unwind` payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ContinuationError::NotFound { path: "/x".into() }.status(), 404);
        assert_eq!(ContinuationError::SchedulerUnavailable.status(), 503);
        assert_eq!(
            ContinuationError::TaskFailure {
                message: "boom".into()
            }
            .status(),
            500
        );
    }

    #[test]
    fn test_display_names_operation_and_state() {
        let err = ContinuationError::illegal("dispatch", ContinuationState::Idle);
        assert_eq!(err.to_string(), "illegal state: cannot dispatch while IDLE");
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}

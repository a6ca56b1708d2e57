//! Error types for the reactive runtime.
//!
//! Most conditions in this crate are recoverable misuse: they are logged
//! through `tracing` and the offending operation becomes a no-op. The error
//! values below are what gets logged, and what is returned from the few
//! operations that have a result to report.

use thiserror::Error;

/// Errors raised by the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A watch source that is neither a ref, a reactive container, a getter
    /// nor a list of those. The source is watched as a constant.
    #[error("invalid watch source: {0}")]
    InvalidSource(String),

    /// Assignment to a computed cell that has no setter.
    #[error("write operation failed: computed value is readonly")]
    ReadOnly,

    /// A user cleanup callback panicked. The panic is swallowed.
    #[error("cleanup in {context} panicked: {message}")]
    Cleanup { context: String, message: String },

    /// A flush mode name that is not `pre`, `post` or `sync`.
    #[error("unknown flush mode `{0}`")]
    UnknownFlushMode(String),

    /// `run()` on an effect scope that has already been stopped.
    #[error("cannot run an inactive effect scope")]
    InactiveScope,
}

/// Convenience alias used across the crate.
pub type Result<T, E = ReactiveError> = std::result::Result<T, E>;

/// Extract a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run a user cleanup, swallowing and logging any panic.
///
/// Returns `false` if the cleanup panicked.
pub(crate) fn run_guarded<F: FnOnce()>(context: &str, cleanup: F) -> bool {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(cleanup)) {
        Ok(()) => true,
        Err(payload) => {
            let err = ReactiveError::Cleanup {
                context: context.to_string(),
                message: panic_message(payload.as_ref()),
            };
            tracing::error!(error = %err, "cleanup callback failed");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guarded_cleanup_reports_success() {
        assert!(run_guarded("test", || {}));
    }

    #[test]
    fn guarded_cleanup_swallows_panics() {
        assert!(!run_guarded("test", || panic!("boom")));
    }

    #[test]
    fn error_messages_are_readable() {
        let err = ReactiveError::UnknownFlushMode("later".into());
        assert_eq!(err.to_string(), "unknown flush mode `later`");

        let err = ReactiveError::Cleanup {
            context: "watch#3".into(),
            message: "boom".into(),
        };
        assert_eq!(err.to_string(), "cleanup in watch#3 panicked: boom");
    }
}

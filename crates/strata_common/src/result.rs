//! Common result and error types for the strata build core.

/// The standard result type for fallible internal operations.
///
/// `Err` indicates a broken internal invariant (a bug in strata), not a
/// user-facing problem. Problems with layer definitions, stale indexes, or
/// hand-edited generated files are reported through
/// [`DiagnosticSink`](strata_diagnostics) and the operation still returns `Ok`.
pub type StrataResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in strata, not a project problem.
#[derive(Debug, thiserror::Error)]
#[error("internal build error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("layer position out of range");
        assert_eq!(
            format!("{err}"),
            "internal build error: layer position out of range"
        );
    }

    #[test]
    fn err_path() {
        let r: StrataResult<i32> = Err(InternalError::new("test error"));
        let err = r.err().unwrap();
        assert_eq!(err.message, "test error");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}

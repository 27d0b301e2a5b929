//! Query error types
//!
//! Defines all error conditions that can occur during query parsing,
//! translation and execution.

use thiserror::Error;

/// Error surfaced by an execution collaborator, propagated unchanged
pub type ExecutionError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Query text could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Expression node, method call or result operator outside the supported set
    #[error("The expression '{construct}', type: '{kind}' is not supported.")]
    UnsupportedConstruct { construct: String, kind: String },

    /// Time-range comparison with an operator that cannot bound a range
    #[error("Unsupported time comparison: {0}")]
    UnsupportedTimeComparison(String),

    /// Execution path requested without the matching collaborator configured
    #[error("Executor misconfigured: {0}")]
    MisconfiguredExecutor(String),

    /// Error raised by the execution collaborator
    #[error("Execution error: {0}")]
    Execution(#[source] ExecutionError),

    /// Execution was cancelled before results were materialized
    #[error("Query execution cancelled")]
    Cancelled,

    /// A returned record could not be mapped to the requested type
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Scalar execution requested for a query without a scalar reduction
    #[error("Query does not produce a scalar result")]
    NotScalar,

    /// Single-result execution found no rows
    #[error("Sequence contains no elements")]
    NoElements,

    /// Single-result execution found more than one row
    #[error("Sequence contains more than one element")]
    MoreThanOneElement,
}

impl QueryError {
    /// Build an unsupported-construct error from anything displayable
    pub fn unsupported(construct: impl std::fmt::Display, kind: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            construct: construct.to_string(),
            kind: kind.into(),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::unsupported("s.host.Trim()", "Call");
        assert_eq!(
            err.to_string(),
            "The expression 's.host.Trim()', type: 'Call' is not supported."
        );

        let err = QueryError::NoElements;
        assert_eq!(err.to_string(), "Sequence contains no elements");
    }

    #[test]
    fn test_execution_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = QueryError::Execution(Box::new(io_err));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "reset");
    }
}

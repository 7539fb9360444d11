use thiserror::Error;

/// Boxed failure raised by a storage collaborator.
pub type StoreError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("BSON: {0}")]
    Bson(#[from] bson::error::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Malformed query method `{method}`: {reason}")]
    MalformedQueryName { method: String, reason: String },

    #[error("Query method `{method}`: no property `{token}` on entity `{entity}`")]
    UnresolvedProperty { method: String, entity: String, token: String },

    #[error("Query method `{method}`: property token `{token}` is ambiguous between {candidates:?}")]
    AmbiguousProperty { method: String, token: String, candidates: Vec<String> },

    #[error("Query method `{method}`: unsupported operator `{operator}`: {reason}")]
    UnsupportedOperator { method: String, operator: String, reason: String },

    #[error("Query method `{method}`: expected {expected} parameter(s), got {actual}")]
    ParameterCountMismatch { method: String, expected: usize, actual: usize },

    #[error("Query method `{method}`: {reason}")]
    ClauseTypeMismatch { method: String, reason: String },

    #[error("Query method `{method}`: invalid geospatial query shape: {reason}")]
    InvalidGeoQueryShape { method: String, reason: String },

    #[error("Query method not registered: {0}")]
    UnknownMethod(String),

    #[error("Query execution failed on collection `{collection}`: {source}")]
    QueryExecution {
        collection: String,
        #[source]
        source: StoreError,
    },
}

impl DbError {
    /// True for errors raised while compiling a method signature.
    #[must_use]
    pub const fn is_compile_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedQueryName { .. }
                | Self::UnresolvedProperty { .. }
                | Self::AmbiguousProperty { .. }
                | Self::UnsupportedOperator { .. }
                | Self::ParameterCountMismatch { .. }
                | Self::ClauseTypeMismatch { .. }
                | Self::InvalidGeoQueryShape { .. }
        )
    }

    pub(crate) fn malformed(method: &str, reason: impl Into<String>) -> Self {
        Self::MalformedQueryName { method: method.to_string(), reason: reason.into() }
    }

    pub(crate) fn mismatch(method: &str, reason: impl Into<String>) -> Self {
        Self::ClauseTypeMismatch { method: method.to_string(), reason: reason.into() }
    }

    pub(crate) fn geo_shape(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidGeoQueryShape { method: method.to_string(), reason: reason.into() }
    }

    pub(crate) fn unsupported(method: &str, operator: &str, reason: impl Into<String>) -> Self {
        Self::UnsupportedOperator {
            method: method.to_string(),
            operator: operator.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_preserves_cause() {
        let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "socket timeout");
        let err = DbError::QueryExecution { collection: "people".into(), source: Box::new(cause) };
        let src = std::error::Error::source(&err).expect("source");
        assert_eq!(src.to_string(), "socket timeout");
        assert!(!err.is_compile_error());
    }

    #[test]
    fn compile_errors_name_the_method() {
        let err = DbError::malformed("findBy", "empty predicate");
        assert!(err.is_compile_error());
        assert!(err.to_string().contains("findBy"));
    }
}

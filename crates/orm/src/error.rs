//! Error types for the model compiler
//!
//! Definition-time failures (bad schemas, conflicting system fields) and
//! runtime failures (missing records, broken relations, malformed
//! predicates, storage errors) share one error type so every public
//! operation returns `ModelResult<T>`.

use std::fmt;

/// Result type alias for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// ORM error type alias
pub type OrmError = ModelError;

/// ORM result type alias
pub type OrmResult<T> = ModelResult<T>;

/// Error types for ORM operations
#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    /// `find_or_fail` / `first_or_fail` matched zero rows
    RecordNotFound(String),
    /// A mandatory relation target is missing, or the relation is not declared
    RelationNotFound(String),
    /// Malformed predicate, rejected before storage is touched
    InvalidQueryCondition(String),
    /// Schema could not be compiled
    Definition(String),
    /// Attribute values failed declared validation rules
    Validation(String),
    /// Storage collaborator failure
    Database(String),
    /// A write succeeded but its re-select returned nothing
    Integrity(String),
    /// Operation needs a persisted primary key
    MissingPrimaryKey,
    /// Serialization/deserialization error
    Serialization(String),
    /// Transaction error
    Transaction(String),
    /// Configuration error
    Configuration(String),
    /// Payments collaborator failure
    Payments(String),
    /// Auth collaborator failure
    Auth(String),
}

impl ModelError {
    /// Error raised by `find_or_fail` for a specific key.
    pub fn record_not_found(model: &str, id: i64) -> Self {
        ModelError::RecordNotFound(format!("No {} results for {}", model, id))
    }

    /// Error raised by `first_or_fail` when the query is empty.
    pub fn empty_result(model: &str) -> Self {
        ModelError::RecordNotFound(format!("No {} results found for query", model))
    }

    /// Post-insert or post-update re-select came back empty.
    pub fn failed_to_retrieve(action: &str, model: &str) -> Self {
        ModelError::Integrity(format!("Failed to retrieve {} {}", action, model))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ModelError::RecordNotFound(_) | ModelError::RelationNotFound(_)
        )
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::RecordNotFound(msg) => write!(f, "Record not found: {}", msg),
            ModelError::RelationNotFound(msg) => write!(f, "Relation not found: {}", msg),
            ModelError::InvalidQueryCondition(msg) => {
                write!(f, "Invalid query condition: {}", msg)
            }
            ModelError::Definition(msg) => write!(f, "Model definition error: {}", msg),
            ModelError::Validation(msg) => write!(f, "Validation error: {}", msg),
            ModelError::Database(msg) => write!(f, "Database error: {}", msg),
            ModelError::Integrity(msg) => write!(f, "Integrity error: {}", msg),
            ModelError::MissingPrimaryKey => write!(f, "Primary key is missing or invalid"),
            ModelError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            ModelError::Transaction(msg) => write!(f, "Transaction error: {}", msg),
            ModelError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            ModelError::Payments(msg) => write!(f, "Payments error: {}", msg),
            ModelError::Auth(msg) => write!(f, "Auth error: {}", msg),
        }
    }
}

impl std::error::Error for ModelError {}

// Convert from sqlx errors
impl From<sqlx::Error> for ModelError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return ModelError::RecordNotFound(err.to_string());
        }
        ModelError::Database(err.to_string())
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for ModelError {
    fn from(err: serde_json::Error) -> Self {
        ModelError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ModelError {
    fn from(err: serde_yaml::Error) -> Self {
        ModelError::Definition(err.to_string())
    }
}

impl From<std::io::Error> for ModelError {
    fn from(err: std::io::Error) -> Self {
        ModelError::Definition(err.to_string())
    }
}

/// Error types for relation declarations and traversal
#[derive(Debug, Clone)]
pub enum RelationshipError {
    /// Relation name is not declared on the model
    Undeclared { model: String, relation: String },
    /// Target row of a mandatory relation is missing
    MissingTarget { relation: String, detail: String },
    /// Declaration cannot be resolved
    InvalidConfiguration(String),
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationshipError::Undeclared { model, relation } => {
                write!(f, "relation '{}' is not declared on {}", relation, model)
            }
            RelationshipError::MissingTarget { relation, detail } => {
                write!(f, "Model Relation Not Found: {} ({})", relation, detail)
            }
            RelationshipError::InvalidConfiguration(msg) => {
                write!(f, "invalid relation configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for RelationshipError {}

impl From<RelationshipError> for ModelError {
    fn from(err: RelationshipError) -> Self {
        match err {
            RelationshipError::InvalidConfiguration(_) => ModelError::Definition(err.to_string()),
            _ => ModelError::RelationNotFound(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_messages() {
        let err = ModelError::record_not_found("GiftCard", 7);
        assert_eq!(
            err.to_string(),
            "Record not found: No GiftCard results for 7"
        );
        assert!(err.is_not_found());

        let err = ModelError::empty_result("Order");
        assert!(err.to_string().contains("No Order results found for query"));
    }

    #[test]
    fn test_relationship_error_conversion() {
        let err: ModelError = RelationshipError::MissingTarget {
            relation: "customer".to_string(),
            detail: "customers.id = 1".to_string(),
        }
        .into();
        assert!(matches!(err, ModelError::RelationNotFound(_)));

        let err: ModelError =
            RelationshipError::InvalidConfiguration("missing through model".to_string()).into();
        assert!(matches!(err, ModelError::Definition(_)));
    }
}

use config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {

    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("serde error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{segment} is not a valid association or attribute name on {model}")]
    InvalidAssociationOrAttribute { model: String, segment: String },

    #[error("Path '{path}' on {model} does not end with an attribute")]
    IncompleteChain { model: String, path: String },

    #[error("Target column {column} is already mapped on {model}")]
    DuplicateTargetColumn { model: String, column: String },

    #[error("No mapping defined for {column} on {model}, defined columns are {defined:?}")]
    UnknownMapping { model: String, column: String, defined: Vec<String> },

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown column {column} on {model}")]
    UnknownColumn { model: String, column: String },

    #[error("Invalid mapping expression '{0}', expected 'a.b.column == target_column'")]
    InvalidExpression(String),

    #[error("Column {column} on {model} holds {found}, expected {expected}")]
    TypeMismatch { model: String, column: String, expected: &'static str, found: String },

    #[error("{model} record has not been persisted yet")]
    NotPersisted { model: String },

    #[error("{model} record {id} already exists")]
    DuplicateKey { model: String, id: u64 },

    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl AppError {
    pub fn new(msg: impl Into<String>) -> Self {
        AppError::Custom(msg.into())
    }

    /// Configuration errors are fatal to startup, everything else belongs to a single write.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::InvalidAssociationOrAttribute { .. }
                | AppError::IncompleteChain { .. }
                | AppError::DuplicateTargetColumn { .. }
                | AppError::UnknownModel(_)
                | AppError::InvalidExpression(_)
                | AppError::Config(_)
        )
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn invalid_segment_message_names_segment_and_model() {
        let err = AppError::InvalidAssociationOrAttribute { model: "employees".into(), segment: "brunch".into() };
        assert_eq!(err.to_string(), "brunch is not a valid association or attribute name on employees");
        assert!(err.is_configuration());
    }

    #[test]
    fn unknown_mapping_is_recoverable() {
        let err = AppError::UnknownMapping {
            model: "employees".into(),
            column: "nope".into(),
            defined: vec!["branch_company_name".into()],
        };
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("branch_company_name"));
    }
}

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use certmon_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "domain",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("domain"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// An insert operation did not return the newly created row.
    #[error("Storage: insert of {entity} succeeded but the row could not be read back")]
    InsertReadback { entity: &'static str },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (san / recipients columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A column held a value that does not map onto the domain type.
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidValue { column: &'static str, value: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

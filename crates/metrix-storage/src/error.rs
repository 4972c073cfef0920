/// Errors raised by storage backends.
///
/// # Examples
///
/// ```rust
/// use metrix_storage::error::StorageError;
///
/// let err = StorageError::NotFound("PollCount".to_string());
/// assert!(err.is_not_found());
/// assert!(err.to_string().contains("PollCount"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No record is stored under the name.
    #[error("Storage: record '{0}' not found")]
    NotFound(String),

    /// The backend lacks an optional capability.
    #[error("Storage: {0} is not supported by this backend")]
    NotSupported(&'static str),

    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot file encoding failure.
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A stored row cannot be turned back into a typed record.
    #[error("Storage: corrupt row '{name}': {reason}")]
    Corrupt { name: String, reason: String },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

//! Error types for tabula operations

use thiserror::Error;

/// Descriptor validation errors.
///
/// These are caller errors: the query descriptor itself is malformed and
/// no amount of retrying will make it resolvable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Invalid descriptor: {reason}")]
    Invalid { reason: String },
}

impl DescriptorError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Guid registry errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Guid not found: {guid}")]
    GuidNotFound { guid: String },

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

/// Errors surfaced by the relational backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Table already exists: {table}")]
    TableExists { table: String },

    #[error("Column {column} not found in table {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Type mismatch on column {column}: {reason}")]
    TypeMismatch { column: String, reason: String },

    #[error("Backend error: {reason}")]
    Backend { reason: String },
}

/// Cache-level failures wrapping an underlying store error.
///
/// `BuildFailed` leaves the cache entry invalid so a later call retries;
/// `ReadFailed` is only surfaced after the one-shot rebuild-and-retry has
/// also failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Build failed: {0}")]
    BuildFailed(#[source] StoreError),

    #[error("Read failed: {0}")]
    ReadFailed(#[source] StoreError),
}

/// Master error type for all tabula errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TabulaError {
    #[error("Descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

/// Result type alias for tabula operations.
pub type TabulaResult<T> = Result<T, TabulaError>;

// =============================================================================
// TESTS
// =============================================================================

use std::io;
use thiserror::Error;

/// Main error type for bucketfs operations
#[derive(Error, Debug)]
pub enum BucketFsError {
    #[error("Path not found: {0}")]
    NotFound(String),

    /// The store could not be reached or refused the request
    /// (network, credentials, throttling, timeout).
    #[error("Backend unavailable during {operation}: {cause}")]
    BackendUnavailable { operation: String, cause: String },

    /// A name is both a flat object key and a directory prefix.
    #[error("Ambiguous entry: {0} is both a file and a directory")]
    AmbiguousEntry(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Read-only filesystem")]
    ReadOnly,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BucketFsError {
    pub fn backend(operation: impl Into<String>, cause: impl ToString) -> Self {
        BucketFsError::BackendUnavailable {
            operation: operation.into(),
            cause: cause.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, BucketFsError::NotFound(_))
    }

    /// Convert error to libc errno for FUSE responses
    pub fn to_errno(&self) -> i32 {
        match self {
            BucketFsError::NotFound(_) => libc::ENOENT,
            BucketFsError::BackendUnavailable { .. } => libc::EIO,
            BucketFsError::AmbiguousEntry(_) => libc::EIO,
            BucketFsError::NotADirectory(_) => libc::ENOTDIR,
            BucketFsError::IsADirectory(_) => libc::EISDIR,
            BucketFsError::ReadOnly => libc::EROFS,
            BucketFsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
        }
    }

    /// Errno for name resolution. Lookup only reports absence, so every
    /// failure collapses to ENOENT; the cause is left to the logs.
    pub fn lookup_errno(&self) -> i32 {
        match self {
            BucketFsError::NotADirectory(_) => libc::ENOTDIR,
            _ => libc::ENOENT,
        }
    }
}

/// Result type alias for bucketfs operations
pub type Result<T> = std::result::Result<T, BucketFsError>;

//! Domain error taxonomy shared by the content store, the archive
//! ingestor, and the entitlement gate.
//!
//! The HTTP layer maps these onto status codes in `server::error`;
//! diagnostic detail stays server-side and is never echoed to clients.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the core components.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown slug, unresolved file, or a directory without an index file.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authenticated but not entitled, with no purchase page to offer.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Upload is not a ZIP archive (wrong extension or declared type).
    #[error("invalid archive: {0}")]
    InvalidArchive(String),

    /// The archive could not be opened or read as a ZIP.
    #[error("failed to open archive: {0}")]
    ArchiveOpenFailure(String),

    /// An archive entry or request sub-path escapes its root.
    #[error("path traversal detected: {0}")]
    TraversalDetected(String),

    /// The course has no content group (commerce product) configured.
    #[error("course has no content group configured: {0}")]
    MisconfiguredCourse(String),

    /// Filesystem I/O failure during extraction or read.
    #[error("storage failure: {0}")]
    StorageFailure(#[from] std::io::Error),
}

impl Error {
    /// Not-found error for a filesystem path. The path goes into the
    /// message for server-side logs; the HTTP layer replaces it with a
    /// generic body before anything reaches the client.
    pub fn not_found_path(path: impl Into<PathBuf>) -> Self {
        Self::NotFound(path.into().display().to_string())
    }

    /// Machine-readable category, used by the admin upload response so
    /// the caller can explain remediation.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidArchive(_) => "invalid_archive",
            Self::ArchiveOpenFailure(_) => "archive_open_failure",
            Self::TraversalDetected(_) => "traversal_detected",
            Self::MisconfiguredCourse(_) => "no_content_group",
            Self::StorageFailure(_) => "storage_failure",
        }
    }
}

/// Convenience alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the vestige memory-forensics core.
//!
//! One crate-wide enum covers the whole failure taxonomy: configuration
//! errors (profile/symbol mismatches) are fatal and surfaced immediately,
//! read-bounds conditions are recoverable and mostly handled as
//! `Option`-shaped "no data" close to the source, and a correlation miss
//! is fatal but distinct so callers can tell it apart from an empty
//! result set.

use thiserror::Error;

/// Main error type for vestige operations.
#[derive(Debug, Error)]
pub enum VestigeError {
    /// A symbol the analysis depends on is not present in the profile.
    #[error("unresolved symbol: {0}")]
    SymbolUnresolved(String),

    /// A type name has no entry in the profile's type table.
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// A (type, field) pair has no entry in the profile's field table.
    #[error("unknown field: {type_name}.{field}")]
    UnknownField { type_name: String, field: String },

    /// A field was accessed in a way its declared kind does not support.
    #[error("field access on non-struct overlay of type {0}")]
    NotAStruct(String),

    /// A read that must be total fell outside the backed image range.
    #[error("read of {length} bytes at {address:#x} is outside the image")]
    ReadOutOfBounds { address: u64, length: u64 },

    /// A socket's backing inode has no open-file table entry.
    #[error("socket inode {inode} has no open-file table entry")]
    InodeNotFound { inode: u64 },

    /// The image file exceeds the configured open-time limit.
    #[error("image of {found} bytes exceeds the maximum allowed size of {limit} bytes")]
    ImageTooLarge { limit: u64, found: u64 },

    /// Profile encoding or internal-consistency errors.
    #[error("invalid profile: {0}")]
    Profile(String),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for vestige operations.
pub type Result<T> = std::result::Result<T, VestigeError>;

impl VestigeError {
    /// True for profile/symbol mismatches, which abort a run before any
    /// traversal output is produced.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            VestigeError::SymbolUnresolved(_)
                | VestigeError::UnknownType(_)
                | VestigeError::UnknownField { .. }
                | VestigeError::NotAStruct(_)
                | VestigeError::Profile(_)
        )
    }
}

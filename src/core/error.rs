// This module defines the error types of the offload pass using the thiserror crate.
// OffloadError covers the failure surfaces that remain once ineligibility has been
// turned into warnings: malformed textual call graphs, malformed summary streams,
// object-file container problems and the two whole-program consistency violations
// met while reading a summary (an index outside the partition encoder, or an index
// naming a node that is not a definition). The consistency variants are fatal for
// the compilation; callers are expected to abort instead of recovering from them.
// OffloadResult<T> is the convenience alias used throughout the crate.

//! Error types for the offload pass.

use thiserror::Error;

/// Main error type of the offload pass.
#[derive(Error, Debug)]
pub enum OffloadError {
    #[error("Parse error at line {line}: {message}")]
    Parse {
        line: usize,
        message: String,
    },

    #[error("Malformed summary stream at byte {offset}: {reason}")]
    Codec {
        offset: usize,
        reason: String,
    },

    #[error("Summary index {index} is outside the partition encoder ({len} nodes)")]
    BadIndex {
        index: u64,
        len: usize,
    },

    #[error("Summary index {index} refers to '{name}', which is not a definition")]
    NotADefinition {
        index: u64,
        name: String,
    },

    #[error("Object file error: {0}")]
    Object(#[from] object::Error),

    #[error("Object file write error: {0}")]
    ObjectWrite(#[from] object::write::Error),
}

impl OffloadError {
    /// Whether the error is a whole-program consistency violation that must
    /// abort the compilation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, OffloadError::BadIndex { .. } | OffloadError::NotADefinition { .. })
    }
}

/// Result type alias for offload operations.
pub type OffloadResult<T> = Result<T, OffloadError>;

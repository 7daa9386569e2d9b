//! Central error types for unflag.
//!
//! Uses `thiserror` for ergonomic error definitions with automatic
//! `Display` implementations. Config errors split in two: `ConfigParse`
//! for text that fails to deserialize, `ConfigInvalid` for text that
//! deserializes but violates a semantic constraint.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Process exit codes for the unflag CLI.
///
/// Unix-style convention: 0 is success, non-zero indicates failure.
pub mod exit_code {
    /// Run completed (possibly with per-file warnings).
    pub const SUCCESS: i32 = 0;
    /// Invocation error or fatal failure (bad config, bad arguments).
    pub const FAILURE: i32 = 1;
}

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum UnflagError {
    /// IO operation failed, with path context for actionable messages
    #[error("IO error at {path}: {error}")]
    IoWithPath {
        error: std::io::Error,
        path: PathBuf,
    },

    /// Configuration text failed to deserialize
    #[error("{format} config parse error: {message}")]
    ConfigParse { format: String, message: String },

    /// Configuration deserialized but failed semantic validation;
    /// fatal to the run
    #[error("invalid configuration: {reason}")]
    ConfigInvalid { reason: String },

    /// Failed to parse source file; non-fatal, the file is skipped
    #[error("parse error in {file}: {message}")]
    Parse { file: String, message: String },

    /// An explicitly named target has an extension no grammar covers
    #[error("unsupported file type: {0}")]
    UnsupportedFile(String),

    /// Tree-sitter grammar loading error
    #[error("tree-sitter error: {0}")]
    TreeSitter(String),

    /// An edit fell outside the source text
    #[error("edit at offset {offset} (length {length}) exceeds source length {source_len}")]
    InvalidRange {
        offset: usize,
        length: usize,
        source_len: usize,
    },

    /// Two edits in one batch cover overlapping byte ranges.
    /// Always a planner bug; the file is left unchanged.
    #[error("overlapping edits: {first_offset}..{first_end} and {second_offset}..{second_end}")]
    OverlappingEdits {
        first_offset: usize,
        first_end: usize,
        second_offset: usize,
        second_end: usize,
    },

    /// External formatter failed; downgraded to a warning by the orchestrator
    #[error("formatter failed: {0}")]
    FormatFailed(String),
}

/// Convenience type alias for Results using UnflagError.
pub type Result<T> = std::result::Result<T, UnflagError>;

impl UnflagError {
    /// Create an IO error with path context.
    ///
    /// Use this when reading/writing files so the error message names the
    /// file that failed.
    #[inline]
    pub fn io_with_path(error: std::io::Error, path: impl AsRef<Path>) -> Self {
        UnflagError::IoWithPath {
            error,
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a ConfigInvalid error from any displayable reason.
    #[inline]
    pub fn config(reason: impl Into<String>) -> Self {
        UnflagError::ConfigInvalid {
            reason: reason.into(),
        }
    }
}

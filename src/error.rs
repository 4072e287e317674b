use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for promptcon operations.
///
/// These errors come from the collaborator layers (template store, file
/// access) and from import/export plumbing. The core engine (flatten, parse,
/// selection recompute, render) never returns them; per its contract it
/// degrades to warnings instead.
#[derive(Error, Debug)]
pub enum PromptconError {
    /// IO error when reading files or directories
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// File not found error with specific path
    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Directory not found error with specific path
    #[error("Directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Template name contains path separators or parent references
    #[error("Invalid template name (path components are not allowed): {name}")]
    InvalidTemplateName { name: String },

    /// A block group declares more than one lead block
    #[error("Block group {group_id} declares more than one lead block")]
    DuplicateGroupLead { group_id: String },

    /// A composition contains more than one block with the same id
    #[error("Block id {id} appears more than once in the composition")]
    DuplicateBlockId { id: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error while walking a directory with ignore rules applied
    #[error("Directory traversal error: {0}")]
    Ignore(#[from] ignore::Error),

    /// Invalid exclude glob pattern
    #[error("Glob error: {0}")]
    Glob(#[from] globset::Error),
}

pub type Result<T> = std::result::Result<T, PromptconError>;

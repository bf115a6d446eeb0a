/// Error types
use thiserror::Error;

/// Failures reported by a key-value store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage read failed: {0}")]
    Read(String),

    #[error("storage write failed: {0}")]
    Write(String),
}

/// Errors surfaced by tag operations
#[derive(Debug, Error)]
pub enum TagError {
    #[error("Tag \"{0}\" already exists")]
    AlreadyExists(String),

    #[error("Tag \"{0}\" does not exist")]
    NotFound(String),

    #[error("Invalid tag name {0:?}: {1}")]
    InvalidName(String, &'static str),

    #[error("Invalid move: destination \"{destination}\" is inside source subtree \"{source_path}\"")]
    MoveIntoSubtree {
        source_path: String,
        destination: String,
    },

    #[error("Cannot modify the virtual tag \"{0}\"")]
    VirtualTag(String),

    #[error("Corrupt data under storage key \"{key}\": {source}")]
    Corrupt {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error("Failed to serialize \"{key}\": {source}")]
    Serialize {
        key: &'static str,
        source: serde_json::Error,
    },

    #[error("Invalid settings: {0}")]
    InvalidSettings(#[source] serde_json::Error),

    #[error("Browser call failed: {0}")]
    Host(String),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

pub type Result<T, E = TagError> = std::result::Result<T, E>;

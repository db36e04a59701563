//! Error types for the git-odb crate.
//!
//! One enumeration covers index parsing, loose and packed object reads, delta
//! resolution, ref lookup and the external git boundary. It integrates with
//! `thiserror` to provide `Display` implementations and `io::Error` chaining.
//!
//! Notes:
//! - An unknown object id is not an error; lookups return `Ok(None)` or an
//!   invalid `ObjectId` so traversal can continue past a dangling entry.
//! - Every on-disk format violation surfaces as one of the `Corrupt*` variants.

use thiserror::Error;

use crate::delta::errors::GitDeltaError;

#[derive(Error, Debug)]
/// Unified error enumeration for the git-odb library.
pub enum GitError {
    /// Malformed pack index: bad signature or version, decreasing fan-out, truncated tables.
    #[error("Corrupt pack index: {0}")]
    CorruptIndex(String),

    /// Object payload does not match its declared header or cannot be inflated.
    #[error("Corrupt object: {0}")]
    CorruptObject(String),

    /// Delta instruction stream violates the patch format.
    #[error("Corrupt delta: {0}")]
    CorruptDelta(String),

    /// Recognised but unimplemented format (tag objects, over-long delta chains, v1 CRCs).
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Invalid pack header magic, version or object count.
    #[error("The `{0}` is not a valid pack header.")]
    InvalidPackHeader(String),

    /// Invalid or unsupported git object type name.
    #[error("The `{0}` is not a valid git object type.")]
    InvalidObjectType(String),

    /// Invalid tree entry (mode/name/hash).
    #[error("The `{0}` is not a valid git tree item.")]
    InvalidTreeItem(String),

    /// Commit author or committer zone offset in an unknown shape.
    #[error("The `{0}` is not a valid zone offset.")]
    InvalidZoneOffset(String),

    /// Invalid SHA1 hash formatting or value.
    #[error("The {0} is not a valid Hash value ")]
    InvalidHashValue(String),

    /// Object missing from every registered store.
    #[error("Can't find specific object: {0}")]
    ObjectNotFound(String),

    /// Named ref does not exist.
    #[error("Can't find ref: {0}")]
    RefNotFound(String),

    /// Ref file contents are neither an id nor a symbolic ref.
    #[error("Invalid ref `{0}`")]
    InvalidRef(String),

    /// Path is not a git repository, or the repository handle has been dropped.
    #[error("Repository not found")]
    RepoNotFound,

    /// External git executable exited unsuccessfully.
    #[error("git command failed: {0}")]
    CommandFailed(String),

    /// Output of a git command in a shape the parser does not know.
    #[error("Unexpected git output: {0}")]
    InvalidGitOutput(String),

    /// Configuration could not be parsed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid function argument.
    #[error("Argument parse failed: {0}")]
    InvalidArgument(String),

    /// I/O error from underlying reader or writer.
    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl From<GitDeltaError> for GitError {
    fn from(err: GitDeltaError) -> Self {
        match err {
            GitDeltaError::DeltaDecoderError(msg) => GitError::CorruptDelta(msg),
        }
    }
}

//! Object model for blobs, trees and commits read from a repository.
//!
//! Objects are created cheaply from the header a store reports (type and size) and
//! parse their payload on first field access. Each object carries a weak handle to
//! its repository, so a cached object never keeps a dropped repository alive.
//!
//! ```text
//! ObjectId text ──storage_for──▶ store ──object_type_for──▶ GitObject::from_header
//!                                                   │
//!                          first field access ──────┴──▶ repo.object_data_for ──▶ parse
//! ```

pub mod blob;
pub mod commit;
pub mod id;
pub mod signature;
pub mod tree;
pub mod types;

use std::{
    fmt::{self, Display},
    sync::{Arc, Mutex, PoisonError, Weak},
};

use bytes::Bytes;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{blob::Blob, commit::Commit, tree::Tree, types::ObjectType},
    repository::{RepoInner, Repository},
};

/// Identity and header data every object knows from construction on.
#[derive(Debug, Clone)]
pub struct ObjectHeader {
    pub id: ObjectHash,
    pub object_type: ObjectType,
    pub size: usize,
    repo: Weak<RepoInner>,
}

impl ObjectHeader {
    pub(crate) fn new(
        id: ObjectHash,
        object_type: ObjectType,
        size: usize,
        repo: Weak<RepoInner>,
    ) -> Self {
        ObjectHeader {
            id,
            object_type,
            size,
            repo,
        }
    }

    /// Header of an object that is not backed by any repository.
    pub fn detached(id: ObjectHash, object_type: ObjectType, size: usize) -> Self {
        Self::new(id, object_type, size, Weak::new())
    }

    pub fn repository(&self) -> Result<Repository, GitError> {
        self.repo
            .upgrade()
            .map(Repository::from_inner)
            .ok_or(GitError::RepoNotFound)
    }

    pub(crate) fn load_data(&self) -> Result<Bytes, GitError> {
        self.repository()?.object_data_for(&self.id)
    }
}

/// Lazy population state of an object's type-specific fields.
#[derive(Debug)]
pub enum PopulationState<T> {
    HeaderPopulated,
    FullyPopulated(Arc<T>),
}

/// Fields parsed at most once, on first access. Concurrent callers wait for the
/// first one; a failed parse leaves the object header-populated so it can be retried.
#[derive(Debug)]
pub(crate) struct Population<T> {
    state: Mutex<PopulationState<T>>,
}

impl<T> Population<T> {
    pub(crate) fn new() -> Self {
        Population {
            state: Mutex::new(PopulationState::HeaderPopulated),
        }
    }

    pub(crate) fn populated(value: T) -> Self {
        Population {
            state: Mutex::new(PopulationState::FullyPopulated(Arc::new(value))),
        }
    }

    pub(crate) fn is_populated(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        matches!(*state, PopulationState::FullyPopulated(_))
    }

    pub(crate) fn get_or_try_init(
        &self,
        init: impl FnOnce() -> Result<T, GitError>,
    ) -> Result<Arc<T>, GitError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let PopulationState::FullyPopulated(value) = &*state {
            return Ok(value.clone());
        }
        let value = Arc::new(init()?);
        *state = PopulationState::FullyPopulated(value.clone());
        Ok(value)
    }
}

/// **The Object Trait**
/// Defines the common interface for the reconstructed object kinds.
pub trait ObjectTrait: Send + Sync + Display {
    /// Creates a fully populated object from a payload, without a repository.
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError>
    where
        Self: Sized;

    fn header(&self) -> &ObjectHeader;

    fn id(&self) -> ObjectHash {
        self.header().id
    }

    /// Returns the type of the object.
    fn get_type(&self) -> ObjectType {
        self.header().object_type
    }

    /// Declared payload size.
    fn get_size(&self) -> usize {
        self.header().size
    }

    fn is_populated(&self) -> bool;

    /// Parse the payload if that has not happened yet; a no-op afterwards.
    fn populate(&self) -> Result<(), GitError>;

    fn repository(&self) -> Result<Repository, GitError> {
        self.header().repository()
    }
}

/// Closed set of objects a repository can hand out. Tags are recognised but
/// not reconstructed.
#[derive(Debug, Clone)]
pub enum GitObject {
    Blob(Arc<Blob>),
    Tree(Arc<Tree>),
    Commit(Arc<Commit>),
    Unsupported(Arc<ObjectHeader>),
}

impl GitObject {
    /// Build the variant matching the store-reported type. Nothing is parsed yet.
    pub(crate) fn from_header(header: ObjectHeader) -> GitObject {
        match header.object_type {
            ObjectType::Blob => GitObject::Blob(Arc::new(Blob::new(header))),
            ObjectType::Tree => GitObject::Tree(Arc::new(Tree::new(header))),
            ObjectType::Commit => GitObject::Commit(Arc::new(Commit::new(header))),
            ObjectType::Tag => GitObject::Unsupported(Arc::new(header)),
        }
    }

    pub fn header(&self) -> &ObjectHeader {
        match self {
            GitObject::Blob(blob) => blob.header(),
            GitObject::Tree(tree) => tree.header(),
            GitObject::Commit(commit) => commit.header(),
            GitObject::Unsupported(header) => header,
        }
    }

    pub fn id(&self) -> ObjectHash {
        self.header().id
    }

    pub fn object_type(&self) -> ObjectType {
        self.header().object_type
    }

    pub fn size(&self) -> usize {
        self.header().size
    }

    /// Raw payload, whatever the variant.
    pub fn data(&self) -> Result<Bytes, GitError> {
        match self {
            GitObject::Blob(blob) => blob.data(),
            other => other.header().load_data(),
        }
    }

    pub fn populate(&self) -> Result<(), GitError> {
        match self {
            GitObject::Blob(blob) => blob.populate(),
            GitObject::Tree(tree) => tree.populate(),
            GitObject::Commit(commit) => commit.populate(),
            GitObject::Unsupported(header) => Err(GitError::UnsupportedFormat(format!(
                "{} objects are not reconstructed ({})",
                header.object_type, header.id
            ))),
        }
    }

    pub fn as_blob(&self) -> Option<&Arc<Blob>> {
        match self {
            GitObject::Blob(blob) => Some(blob),
            _ => None,
        }
    }

    pub fn as_tree(&self) -> Option<&Arc<Tree>> {
        match self {
            GitObject::Tree(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_commit(&self) -> Option<&Arc<Commit>> {
        match self {
            GitObject::Commit(commit) => Some(commit),
            _ => None,
        }
    }
}

impl Display for GitObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitObject::Blob(blob) => write!(f, "{blob}"),
            GitObject::Tree(tree) => write!(f, "{tree}"),
            GitObject::Commit(commit) => write!(f, "{commit}"),
            GitObject::Unsupported(header) => {
                write!(f, "{} {} (unsupported)", header.object_type, header.id)
            }
        }
    }
}

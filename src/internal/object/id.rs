//! Object ids as users type them: full or abbreviated hex, resolved against a store.
//!
//! Resolution happens once, at construction. The id then remembers the store whose
//! listing matched, so later lookups go straight there. An id whose text matched nothing
//! or matched more than one object is invalid; that is a value, not an error.

use std::{
    cmp::Ordering,
    fmt::{self, Debug, Display},
    hash::{Hash, Hasher},
    sync::Arc,
};

use crate::{
    errors::GitError, hash::ObjectHash, internal::storage::ObjectStore, repository::Repository,
};

#[derive(Clone, Default)]
pub struct ObjectId {
    hash: Option<ObjectHash>,
    store: Option<Arc<dyn ObjectStore>>,
}

impl ObjectId {
    pub fn invalid() -> Self {
        ObjectId::default()
    }

    /// Resolve `text` against a single store.
    pub fn with_store(text: &str, store: Arc<dyn ObjectStore>) -> Result<Self, GitError> {
        Ok(match store.actual_id_for(text)? {
            Some(hash) => ObjectId {
                hash: Some(hash),
                store: Some(store),
            },
            None => ObjectId::invalid(),
        })
    }

    /// Resolve `text` against every store of `repo`, in registration order.
    pub fn with_repo(text: &str, repo: &Repository) -> Result<Self, GitError> {
        Ok(match repo.storage_for(text)? {
            Some((hash, store)) => ObjectId {
                hash: Some(hash),
                store: Some(store),
            },
            None => ObjectId::invalid(),
        })
    }

    pub fn is_valid(&self) -> bool {
        self.hash.is_some()
    }

    pub fn hash(&self) -> Option<ObjectHash> {
        self.hash
    }

    /// Store the id was resolved in; `None` for an invalid id.
    pub fn store(&self) -> Option<&Arc<dyn ObjectStore>> {
        self.store.as_ref()
    }

    /// Whether the id is valid and still listed by its store.
    pub fn exists(&self) -> Result<bool, GitError> {
        match (&self.hash, &self.store) {
            (Some(hash), Some(store)) => store.contains(hash),
            _ => Ok(false),
        }
    }

    /// Full 40-hex form, empty for an invalid id.
    pub fn to_sha1_string(&self) -> String {
        self.hash.map(|hash| hash.to_string()).unwrap_or_default()
    }

    /// First 7 hex characters, empty for an invalid id.
    pub fn to_short_sha1_string(&self) -> String {
        self.hash
            .map(|hash| hash.to_short_string())
            .unwrap_or_default()
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for ObjectId {}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.hash.cmp(&other.hash)
    }
}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_sha1_string())
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.hash, &self.store) {
            (Some(hash), Some(store)) => write!(f, "ObjectId({hash} in {})", store.name()),
            _ => write!(f, "ObjectId(invalid)"),
        }
    }
}

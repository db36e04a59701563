//! Git-ODB: a read-only Rust library for Git object databases: loose objects, pack
//! indices v1/v2, pack records with offset and ref deltas, and lazily populated blob,
//! tree and commit objects.
//!
//! Goals
//! - Resolve full or abbreviated object ids against one store or a whole repository.
//! - Read payloads from loose files and from packs, rebuilding delta chains iteratively.
//! - Reconstruct typed objects that parse their payload only when a field is first read.
//! - Read `HEAD`, loose refs and `packed-refs`; hand writes and history queries to `git`.
//!
//! Core Capabilities
//! - Pack index: fan-out bucketed binary search, 64-bit offsets, CRC32 and reverse lookup.
//! - Delta: validated copy/insert replay with bounded chains and cycle detection.
//! - Objects: `Blob`, `Tree` and `Commit` behind the closed [`GitObject`] enum; tags are
//!   recognised and reported as unsupported.
//! - Caching: per-store object, header and payload caches; `reset_*` drops them.
//!
//! Modules
//! - `internal::storage`: the [`ObjectStore`] trait with loose and packed implementations.
//! - `internal::pack`: `.idx` parsing and pack record headers.
//! - `internal::object`: object model, ids, signatures and the object factory.
//! - `internal::zlib`: inflate reader and helpers.
//! - `delta`: delta instruction decoder and varint readers.
//! - `repository`, `refs`, `runner`: repository handle, references, external git boundary.
//! - `status`: per-file work tree status built from `ls-files`, `diff-files` and `diff-index`.
//! - `config`, `errors`, `hash`, `utils`: tunables, error type, SHA-1 ids, I/O helpers.
//!
//! Typical Usage
//! - `Repository::open(path)?.commit("abc1234")?` then `commit.tree()?`, `commit.parents()?`.
//! - `Repository::commits(None)` walks history from `HEAD`, newest committer time first.

pub mod config;
pub mod delta;
pub mod errors;
pub mod hash;
pub mod internal;
pub mod refs;
pub mod repository;
pub mod runner;
pub mod status;
pub mod utils;

pub use config::OdbConfig;
pub use errors::GitError;
pub use hash::ObjectHash;
pub use internal::{
    object::{
        GitObject, ObjectTrait, blob::Blob, commit::Commit, id::ObjectId, signature::Signature,
        tree::Tree, types::ObjectType,
    },
    storage::{ObjectStore, loose::LooseObjectStore, packed::PackedObjectStore},
};
pub use refs::Ref;
pub use repository::{BlobSource, Repository};
pub use runner::{GitRunner, ProcessGitRunner};
pub use status::{FileStatus, Status, StatusFile};

//! Object stores: where payloads come from.
//!
//! A repository aggregates one [`loose::LooseObjectStore`] over `objects/xx/...` files and
//! one [`packed::PackedObjectStore`] per `objects/pack/*.idx`. Both answer the same
//! questions through [`ObjectStore`]: which ids exist, and the type, size and payload of
//! each. Stores cache what they read until [`ObjectStore::reset`].

pub mod loose;
pub mod packed;

use std::{fmt::Debug, sync::Arc};

use bytes::Bytes;
use dashmap::DashMap;

use crate::{
    errors::GitError,
    hash::{ObjectHash, SHA1_HEX_LEN, normalize_hex_prefix},
    internal::object::{GitObject, types::ObjectType},
};

pub trait ObjectStore: Send + Sync + Debug {
    /// Human readable location, for logs and errors.
    fn name(&self) -> String;

    /// Every id in the store, ascending.
    fn all_ids(&self) -> Result<Arc<Vec<ObjectHash>>, GitError>;

    /// Payload without the `"<type> <size>\0"` header.
    fn object_data_for(&self, id: &ObjectHash) -> Result<Bytes, GitError>;

    fn object_type_for(&self, id: &ObjectHash) -> Result<ObjectType, GitError>;

    fn object_size_for(&self, id: &ObjectHash) -> Result<usize, GitError>;

    fn contains(&self, id: &ObjectHash) -> Result<bool, GitError> {
        Ok(self.all_ids()?.binary_search(id).is_ok())
    }

    /// Resolve a full or abbreviated id against this store's listing. `None` when nothing
    /// or more than one id matches, or when `text` is not hex.
    fn actual_id_for(&self, text: &str) -> Result<Option<ObjectHash>, GitError> {
        let ids = self.all_ids()?;
        Ok(unique_prefix_match(&ids, text))
    }

    /// Drop every cache, including instantiated objects.
    fn reset(&self);

    /// Objects handed out for ids of this store, so repeated lookups share one instance.
    fn objects(&self) -> &DashMap<ObjectHash, GitObject>;
}

/// Find the single id in a sorted listing that starts with `text`.
pub fn unique_prefix_match(ids: &[ObjectHash], text: &str) -> Option<ObjectHash> {
    let prefix = normalize_hex_prefix(text)?;
    let start = ids.partition_point(|id| id.cmp_hex_prefix(&prefix).is_lt());
    let mut matches = ids[start..]
        .iter()
        .take_while(|id| id.starts_with_hex(&prefix));
    let first = *matches.next()?;
    if prefix.len() < SHA1_HEX_LEN && matches.next().is_some() {
        return None;
    }
    Some(first)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::str::FromStr;

    use tracing_subscriber::util::SubscriberInitExt;

    use super::unique_prefix_match;
    use crate::hash::ObjectHash;

    /// CAUTION: This two is same
    /// 1.
    /// tracing_subscriber::fmt().init();
    ///
    /// 2.
    /// env::set_var("RUST_LOG", "debug"); // must be set if use `fmt::init()`, or no output
    /// tracing_subscriber::fmt::init();
    pub(crate) fn init_logger() {
        let _ = tracing_subscriber::fmt::Subscriber::builder()
            .with_target(false)
            .without_time()
            .with_level(true)
            .with_max_level(tracing::Level::DEBUG)
            .finish()
            .try_init(); // avoid multi-init
    }

    fn ids() -> Vec<ObjectHash> {
        let mut ids: Vec<_> = [
            "0a1b2c3d4e5f60718293a4b5c6d7e8f901234567",
            "abc0000000000000000000000000000000000000",
            "abc1000000000000000000000000000000000000",
            "abd0000000000000000000000000000000000000",
            "ff00000000000000000000000000000000000000",
        ]
        .iter()
        .map(|s| ObjectHash::from_str(s).unwrap())
        .collect();
        ids.sort();
        ids
    }

    #[test]
    fn unique_prefix_resolves() {
        let ids = ids();
        assert_eq!(
            unique_prefix_match(&ids, "abd").map(|id| id.to_string()),
            Some("abd0000000000000000000000000000000000000".to_string())
        );
        assert_eq!(
            unique_prefix_match(&ids, "0A1B").map(|id| id.to_string()),
            Some("0a1b2c3d4e5f60718293a4b5c6d7e8f901234567".to_string())
        );
        assert!(unique_prefix_match(&ids, "ff00000000000000000000000000000000000000").is_some());
    }

    #[test]
    fn ambiguous_or_missing_prefix_is_none() {
        init_logger();
        let ids = ids();
        assert_eq!(unique_prefix_match(&ids, "abc"), None);
        assert_eq!(unique_prefix_match(&ids, "ab"), None);
        assert_eq!(unique_prefix_match(&ids, "123"), None);
        assert_eq!(unique_prefix_match(&ids, ""), None);
        assert_eq!(unique_prefix_match(&ids, "xyz"), None);
        assert_eq!(unique_prefix_match(&[], "abc"), None);
    }
}

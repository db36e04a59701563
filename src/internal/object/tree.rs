//! In Git, a tree object is used to represent the state of a directory at a specific point in
//! time. It stores the names, modes and ids of the files and sub-directories it contains.
//!
//! The payload is a plain sequence of records:
//!
//! ```text
//! <mode> <name>\0<20-byte id><mode> <name>\0<20-byte id>...
//! ```
//!
//! Every embedded id is resolved through the repository when entries are requested. A
//! dangling id yields an entry without an object instead of failing the whole listing.

use std::{collections::BTreeMap, fmt::Display, sync::Arc};

use bstr::ByteSlice;
use memchr::memchr;

use crate::{
    errors::GitError,
    hash::{ObjectHash, SHA1_SIZE},
    internal::object::{
        GitObject, ObjectHeader, ObjectTrait, Population, blob::Blob, types::ObjectType,
    },
};

/// File modes that can appear in a tree.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub enum TreeItemMode {
    Blob,
    BlobExecutable,
    Link,
    Tree,
    /// A submodule: the id names a commit in another repository.
    Commit,
}

impl TreeItemMode {
    pub fn from_bytes(mode: &[u8]) -> Result<TreeItemMode, GitError> {
        Ok(match mode {
            b"100644" | b"100664" | b"100640" => TreeItemMode::Blob,
            b"100755" => TreeItemMode::BlobExecutable,
            b"120000" => TreeItemMode::Link,
            b"40000" | b"040000" => TreeItemMode::Tree,
            b"160000" => TreeItemMode::Commit,
            _ => {
                return Err(GitError::InvalidTreeItem(format!(
                    "unknown mode {}",
                    mode.to_str_lossy()
                )));
            }
        })
    }

    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            TreeItemMode::Blob => b"100644",
            TreeItemMode::BlobExecutable => b"100755",
            TreeItemMode::Link => b"120000",
            TreeItemMode::Tree => b"40000",
            TreeItemMode::Commit => b"160000",
        }
    }

    /// Type of the object an item with this mode points at.
    pub fn object_type(self) -> ObjectType {
        match self {
            TreeItemMode::Tree => ObjectType::Tree,
            TreeItemMode::Commit => ObjectType::Commit,
            _ => ObjectType::Blob,
        }
    }
}

/// One record of a tree payload.
#[derive(PartialEq, Eq, Debug, Clone, Hash)]
pub struct TreeItem {
    pub mode: TreeItemMode,
    pub id: ObjectHash,
    pub name: String,
}

impl Display for TreeItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:0>6} {} {}\t{}",
            self.mode.to_bytes().to_str_lossy(),
            self.mode.object_type(),
            self.id,
            self.name
        )
    }
}

/// A tree item together with the object its id resolved to, if any.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub item: TreeItem,
    pub object: Option<GitObject>,
}

/// Parse a tree payload by sequential scan.
pub fn parse_tree_items(mut data: &[u8]) -> Result<Vec<TreeItem>, GitError> {
    let mut items = Vec::new();
    while !data.is_empty() {
        let space = memchr(b' ', data)
            .ok_or_else(|| GitError::InvalidTreeItem("missing space after mode".to_string()))?;
        let mode = TreeItemMode::from_bytes(&data[..space])?;
        let rest = &data[space + 1..];
        let nul = memchr(0, rest)
            .ok_or_else(|| GitError::InvalidTreeItem("unterminated name".to_string()))?;
        let name = rest[..nul].to_str_lossy().into_owned();
        let rest = &rest[nul + 1..];
        if rest.len() < SHA1_SIZE {
            return Err(GitError::InvalidTreeItem(format!("truncated id for `{name}`")));
        }
        let id = ObjectHash::from_bytes(&rest[..SHA1_SIZE])?;
        items.push(TreeItem { mode, id, name });
        data = &rest[SHA1_SIZE..];
    }
    Ok(items)
}

#[derive(Debug)]
pub struct Tree {
    header: ObjectHeader,
    items: Population<Vec<TreeItem>>,
}

impl Tree {
    pub(crate) fn new(header: ObjectHeader) -> Self {
        Tree {
            header,
            items: Population::new(),
        }
    }

    /// Raw records, in payload order.
    pub fn items(&self) -> Result<Arc<Vec<TreeItem>>, GitError> {
        self.items.get_or_try_init(|| {
            let data = self.header.load_data()?;
            parse_tree_items(&data)
        })
    }

    /// Records with their ids resolved through the repository.
    pub fn entries(&self) -> Result<Vec<TreeEntry>, GitError> {
        let items = self.items()?;
        let repo = self.header.repository()?;
        items
            .iter()
            .map(|item| {
                Ok(TreeEntry {
                    item: item.clone(),
                    object: repo.object_by_hash(&item.id)?,
                })
            })
            .collect()
    }

    pub fn entries_by_name(&self) -> Result<BTreeMap<String, TreeEntry>, GitError> {
        Ok(self
            .entries()?
            .into_iter()
            .map(|entry| (entry.item.name.clone(), entry))
            .collect())
    }

    pub fn blobs(&self) -> Result<Vec<Arc<Blob>>, GitError> {
        Ok(self.blobs_by_name()?.into_values().collect())
    }

    pub fn blobs_by_name(&self) -> Result<BTreeMap<String, Arc<Blob>>, GitError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry.object {
                Some(GitObject::Blob(blob)) => Some((entry.item.name, blob)),
                _ => None,
            })
            .collect())
    }

    pub fn trees(&self) -> Result<Vec<Arc<Tree>>, GitError> {
        Ok(self.trees_by_name()?.into_values().collect())
    }

    pub fn trees_by_name(&self) -> Result<BTreeMap<String, Arc<Tree>>, GitError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter_map(|entry| match entry.object {
                Some(GitObject::Tree(tree)) => Some((entry.item.name, tree)),
                _ => None,
            })
            .collect())
    }

    /// Name under which `id` is listed in this tree.
    pub fn name_for(&self, id: &ObjectHash) -> Result<Option<String>, GitError> {
        Ok(self
            .items()?
            .iter()
            .find(|item| item.id == *id)
            .map(|item| item.name.clone()))
    }
}

impl Display for Tree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "tree {}", self.header.id)?;
        match self.items() {
            Ok(items) => {
                for item in items.iter() {
                    writeln!(f, "{item}")?;
                }
                Ok(())
            }
            Err(e) => writeln!(f, "<unreadable: {e}>"),
        }
    }
}

impl ObjectTrait for Tree {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        Ok(Tree {
            header: ObjectHeader::detached(hash, ObjectType::Tree, data.len()),
            items: Population::populated(parse_tree_items(data)?),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn is_populated(&self) -> bool {
        self.items.is_populated()
    }

    fn populate(&self) -> Result<(), GitError> {
        self.items().map(|_| ())
    }
}

//! Object type enumeration shared by the loose and packed stores.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// In Git, each object type is assigned a unique integer value, which is used to identify the
/// type of the object in pack record headers.
///
/// * `Commit` (1): a snapshot with its tree, parents, author, committer and message.
/// * `Tree` (2): a directory listing of modes, names and ids.
/// * `Blob` (3): the content of a file.
/// * `Tag` (4): an annotated tag. Recognised but not reconstructed into a typed object.
///
/// The delta record kinds (6 and 7) only exist inside pack files and are modelled by
/// [`crate::internal::pack::entry::RecordKind`].
#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    Commit = 1,
    Tree,
    Blob,
    Tag,
}

const COMMIT_OBJECT_TYPE: &[u8] = b"commit";
const TREE_OBJECT_TYPE: &[u8] = b"tree";
const BLOB_OBJECT_TYPE: &[u8] = b"blob";
const TAG_OBJECT_TYPE: &[u8] = b"tag";

impl Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ObjectType::Blob => write!(f, "blob"),
            ObjectType::Tree => write!(f, "tree"),
            ObjectType::Commit => write!(f, "commit"),
            ObjectType::Tag => write!(f, "tag"),
        }
    }
}

impl FromStr for ObjectType {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectType::from_string(s)
    }
}

impl ObjectType {
    /// Decode a 3-bit pack header type id; `None` for the delta kinds and reserved values.
    pub fn from_pack_type_u8(number: u8) -> Option<ObjectType> {
        match number {
            1 => Some(ObjectType::Commit),
            2 => Some(ObjectType::Tree),
            3 => Some(ObjectType::Blob),
            4 => Some(ObjectType::Tag),
            _ => None,
        }
    }

    /// Name as written in loose object headers.
    pub fn to_bytes(&self) -> &'static [u8] {
        match self {
            ObjectType::Commit => COMMIT_OBJECT_TYPE,
            ObjectType::Tree => TREE_OBJECT_TYPE,
            ObjectType::Blob => BLOB_OBJECT_TYPE,
            ObjectType::Tag => TAG_OBJECT_TYPE,
        }
    }

    /// Parses a string representation of a Git object type and returns an ObjectType value
    pub fn from_string(s: &str) -> Result<ObjectType, GitError> {
        match s {
            "blob" => Ok(ObjectType::Blob),
            "tree" => Ok(ObjectType::Tree),
            "commit" => Ok(ObjectType::Commit),
            "tag" => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(s.to_string())),
        }
    }

    /// Parse a type name from raw header bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectType, GitError> {
        match bytes {
            BLOB_OBJECT_TYPE => Ok(ObjectType::Blob),
            TREE_OBJECT_TYPE => Ok(ObjectType::Tree),
            COMMIT_OBJECT_TYPE => Ok(ObjectType::Commit),
            TAG_OBJECT_TYPE => Ok(ObjectType::Tag),
            _ => Err(GitError::InvalidObjectType(
                String::from_utf8_lossy(bytes).into_owned(),
            )),
        }
    }

    /// Convert an object type to its pack type number.
    pub fn to_u8(&self) -> u8 {
        *self as u8
    }
}

//! In Git, the SHA-1 hash algorithm is used to generate unique identifiers for Git objects.
//! Each object corresponds to one SHA-1 value, which names its loose file and its position
//! in every pack index.
//!
//! Ordering of [`ObjectHash`] is byte order of the raw 20 bytes, which is identical to the
//! lexicographic order of the lowercase 40-hex form; pack indices are sorted by it.

use std::{cmp::Ordering, fmt::Display, io, str::FromStr};

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::{errors::GitError, internal::object::types::ObjectType};

/// Raw SHA-1 length in bytes.
pub const SHA1_SIZE: usize = 20;
/// Length of the hexadecimal form.
pub const SHA1_HEX_LEN: usize = 40;

/// The [`ObjectHash`] struct, encapsulating a `[u8; 20]` array, represents a Git object id.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize,
)]
pub struct ObjectHash(pub [u8; SHA1_SIZE]);

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Parses a full 40-character hexadecimal id; upper-case digits are accepted.
impl FromStr for ObjectHash {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != SHA1_HEX_LEN {
            return Err(GitError::InvalidHashValue(s.to_string()));
        }
        let mut h = [0u8; SHA1_SIZE];
        hex::decode_to_slice(s, &mut h).map_err(|_| GitError::InvalidHashValue(s.to_string()))?;
        Ok(ObjectHash(h))
    }
}

impl ObjectHash {
    /// Calculates the SHA-1 of the given data.
    pub fn new(data: &[u8]) -> ObjectHash {
        let mut bytes = [0u8; SHA1_SIZE];
        bytes.copy_from_slice(Sha1::digest(data).as_ref());
        ObjectHash(bytes)
    }

    /// Id of an object with the given type and payload: SHA-1 of `"<type> <size>\0<data>"`.
    pub fn from_type_and_data(object_type: ObjectType, data: &[u8]) -> ObjectHash {
        let mut hasher = Sha1::new();
        hasher.update(object_type.to_bytes());
        hasher.update(b" ");
        hasher.update(data.len().to_string().as_bytes());
        hasher.update(b"\0");
        hasher.update(data);
        let mut bytes = [0u8; SHA1_SIZE];
        bytes.copy_from_slice(hasher.finalize().as_ref());
        ObjectHash(bytes)
    }

    /// Create ObjectHash from a 20-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<ObjectHash, GitError> {
        let h: [u8; SHA1_SIZE] = bytes.try_into().map_err(|_| {
            GitError::InvalidHashValue(format!("{} raw bytes, expected {SHA1_SIZE}", bytes.len()))
        })?;
        Ok(ObjectHash(h))
    }

    /// Read a raw 20-byte id from a stream.
    pub fn from_stream(data: &mut impl io::Read) -> io::Result<ObjectHash> {
        let mut h = [0u8; SHA1_SIZE];
        data.read_exact(&mut h)?;
        Ok(ObjectHash(h))
    }

    /// First 7 hex characters, for display only.
    pub fn to_short_string(&self) -> String {
        hex::encode(&self.0[..4])[..7].to_string()
    }

    /// Leading byte, used to select a pack index fan-out bucket.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// Compare the leading nibbles of this id against a lowercase hex prefix.
    ///
    /// Returns `Equal` when the id starts with `prefix`. The prefix must already be
    /// validated by [`normalize_hex_prefix`].
    pub fn cmp_hex_prefix(&self, prefix: &str) -> Ordering {
        for (i, c) in prefix.bytes().enumerate() {
            let byte = self.0[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            let expected = hex_value(c);
            match nibble.cmp(&expected) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        Ordering::Equal
    }

    /// Whether the hex form of this id starts with `prefix`.
    pub fn starts_with_hex(&self, prefix: &str) -> bool {
        self.cmp_hex_prefix(prefix) == Ordering::Equal
    }
}

/// Lower-case and validate user supplied id text. Returns `None` for empty text,
/// non-hex characters or text longer than a full id.
pub fn normalize_hex_prefix(text: &str) -> Option<String> {
    let text = text.trim();
    if text.is_empty() || text.len() > SHA1_HEX_LEN {
        return None;
    }
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(text.to_ascii_lowercase())
}

fn hex_value(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => 0xff,
    }
}

//! Tunables for the object database, loadable from JSON.
//!
//! Size-like fields accept either a number of bytes or a string with a `K`, `M` or `G`
//! suffix (`"4K"`). Missing fields take their defaults.

use std::{fs, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::GitError;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct OdbConfig {
    /// Compressed bytes read from a loose object file when only its header is needed.
    #[serde(deserialize_with = "string_or_usize")]
    pub loose_header_peek_size: String,
    /// Buffer size used when reading pack records.
    #[serde(deserialize_with = "string_or_usize")]
    pub pack_read_chunk_size: String,
    /// Longest delta chain followed before giving up with `UnsupportedFormat`.
    pub max_delta_depth: usize,
    /// Recompute the SHA-1 of every payload read from a pack or loose file.
    pub verify_object_ids: bool,
    /// Program spawned for history, staging and repository management commands.
    pub git_executable: String,
}

impl Default for OdbConfig {
    fn default() -> Self {
        Self {
            loose_header_peek_size: "128".to_string(),
            pack_read_chunk_size: "4K".to_string(),
            max_delta_depth: 4096,
            verify_object_ids: false,
            git_executable: "git".to_string(),
        }
    }
}

impl OdbConfig {
    pub fn from_json_str(json: &str) -> Result<Self, GitError> {
        serde_json::from_str(json).map_err(|e| GitError::InvalidConfig(e.to_string()))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn header_peek_bytes(&self) -> Result<usize, GitError> {
        parse_size(&self.loose_header_peek_size)
    }

    pub fn read_chunk_bytes(&self) -> Result<usize, GitError> {
        parse_size(&self.pack_read_chunk_size)
    }
}

/// Parse `"4096"`, `"4K"`, `"1M"` or `"1G"` into a byte count.
pub fn parse_size(text: &str) -> Result<usize, GitError> {
    let text = text.trim();
    let (digits, multiplier) = match text.chars().last() {
        Some('k' | 'K') => (&text[..text.len() - 1], 1usize << 10),
        Some('m' | 'M') => (&text[..text.len() - 1], 1 << 20),
        Some('g' | 'G') => (&text[..text.len() - 1], 1 << 30),
        _ => (text, 1),
    };
    let value: usize = digits
        .trim()
        .parse()
        .map_err(|_| GitError::InvalidConfig(format!("`{text}` is not a size")))?;
    value
        .checked_mul(multiplier)
        .filter(|v| *v > 0)
        .ok_or_else(|| GitError::InvalidConfig(format!("`{text}` is out of range")))
}

fn string_or_usize<'deserialize, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'deserialize>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrUSize {
        String(String),
        USize(usize),
    }

    Ok(match StringOrUSize::deserialize(deserializer)? {
        StringOrUSize::String(v) => v,
        StringOrUSize::USize(v) => v.to_string(),
    })
}

//! Loose objects: one zlib-compressed file per object at `objects/xx/yyyy...`, where `xx`
//! is the first byte of the id in hex and the file name the remaining 38 characters.
//! The inflated file holds `"<type> <size>\0"` followed by the payload.

use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, PoisonError, RwLock},
};

use bytes::Bytes;
use dashmap::DashMap;
use memchr::memchr;
use tracing::{debug, error};

use crate::{
    config::OdbConfig,
    errors::GitError,
    hash::{ObjectHash, SHA1_HEX_LEN},
    internal::{
        object::{GitObject, types::ObjectType},
        storage::ObjectStore,
        zlib::stream::inflate::{inflate, inflate_prefix},
    },
};

/// Longest header a loose object can carry: `"commit "` plus 20 digits and the NUL.
const MAX_HEADER_LEN: usize = 32;

#[derive(Debug)]
pub struct LooseObjectStore {
    objects_dir: PathBuf,
    config: Arc<OdbConfig>,
    ids: RwLock<Option<Arc<Vec<ObjectHash>>>>,
    headers: DashMap<ObjectHash, (ObjectType, usize)>,
    payloads: DashMap<ObjectHash, Bytes>,
    objects: DashMap<ObjectHash, GitObject>,
}

/// Header fields and where the payload starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LooseHeader {
    object_type: ObjectType,
    size: usize,
    len: usize,
}

impl LooseObjectStore {
    pub fn new(objects_dir: impl Into<PathBuf>, config: Arc<OdbConfig>) -> Self {
        LooseObjectStore {
            objects_dir: objects_dir.into(),
            config,
            ids: RwLock::new(None),
            headers: DashMap::new(),
            payloads: DashMap::new(),
            objects: DashMap::new(),
        }
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    fn path_for(&self, id: &ObjectHash) -> PathBuf {
        let hex = id.to_string();
        self.objects_dir.join(&hex[..2]).join(&hex[2..])
    }

    /// Inflated file content, header included. With `max_read`, only that many compressed
    /// bytes are read and whatever they inflate to is returned, possibly cut short.
    pub fn raw_data_for(
        &self,
        id: &ObjectHash,
        max_read: Option<usize>,
    ) -> Result<Vec<u8>, GitError> {
        let path = self.path_for(id);
        let mut file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => GitError::ObjectNotFound(id.to_string()),
            _ => GitError::IOError(e),
        })?;

        match max_read {
            Some(limit) => {
                let mut compressed = Vec::with_capacity(limit);
                file.take(limit as u64).read_to_end(&mut compressed)?;
                inflate_prefix(&compressed, MAX_HEADER_LEN)
                    .map_err(|e| corrupt(id, format!("unreadable header: {e}")))
            }
            None => {
                let mut compressed = Vec::new();
                file.read_to_end(&mut compressed)?;
                inflate(&compressed, compressed.len() * 2).map_err(|e| corrupt(id, e.to_string()))
            }
        }
    }

    /// Type and size, from the caches or a cheap peek at the start of the file.
    fn header_for(&self, id: &ObjectHash) -> Result<(ObjectType, usize), GitError> {
        if let Some(header) = self.headers.get(id) {
            return Ok(*header);
        }
        let peek = self.config.header_peek_bytes()?;
        let raw = self.raw_data_for(id, Some(peek))?;
        let header = match parse_header(id, &raw)? {
            Some(header) => (header.object_type, header.size),
            None => {
                debug!("header of {id} exceeds a {peek} byte peek, reading the whole object");
                self.load(id)?;
                return self
                    .headers
                    .get(id)
                    .map(|header| *header)
                    .ok_or_else(|| GitError::ObjectNotFound(id.to_string()));
            }
        };
        self.headers.insert(*id, header);
        Ok(header)
    }

    /// Read, check and cache the whole object.
    fn load(&self, id: &ObjectHash) -> Result<Bytes, GitError> {
        let raw = self.raw_data_for(id, None)?;
        let header = parse_header(id, &raw)?
            .ok_or_else(|| corrupt(id, "header is not NUL terminated".to_string()))?;
        let payload = &raw[header.len..];
        if payload.len() != header.size {
            error!(
                "loose object {id} declares {} bytes but holds {}",
                header.size,
                payload.len()
            );
            return Err(corrupt(
                id,
                format!("declared size {} but payload is {} bytes", header.size, payload.len()),
            ));
        }
        if self.config.verify_object_ids {
            let actual = ObjectHash::from_type_and_data(header.object_type, payload);
            if actual != *id {
                return Err(corrupt(id, format!("content hashes to {actual}")));
            }
        }
        let payload = Bytes::copy_from_slice(payload);
        self.headers.insert(*id, (header.object_type, header.size));
        self.payloads.insert(*id, payload.clone());
        Ok(payload)
    }

    fn list_ids(&self) -> Result<Vec<ObjectHash>, GitError> {
        let mut ids = Vec::new();
        let dirs = match fs::read_dir(&self.objects_dir) {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };
        for dir in dirs {
            let dir = dir?;
            let dir_name = dir.file_name();
            let Some(prefix) = dir_name.to_str() else {
                continue;
            };
            if prefix.len() != 2
                || !prefix.bytes().all(|b| b.is_ascii_hexdigit())
                || !dir.file_type()?.is_dir()
            {
                continue;
            }
            for file in fs::read_dir(dir.path())? {
                let file_name = file?.file_name();
                let Some(rest) = file_name.to_str() else {
                    continue;
                };
                if rest.len() != SHA1_HEX_LEN - 2 {
                    continue;
                }
                // temporary files and other strays are skipped
                if let Ok(id) = ObjectHash::from_str(&format!("{prefix}{rest}")) {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}

impl ObjectStore for LooseObjectStore {
    fn name(&self) -> String {
        self.objects_dir.display().to_string()
    }

    fn all_ids(&self) -> Result<Arc<Vec<ObjectHash>>, GitError> {
        if let Some(ids) = &*self.ids.read().unwrap_or_else(PoisonError::into_inner) {
            return Ok(ids.clone());
        }
        let ids = Arc::new(self.list_ids()?);
        debug!("listed {} loose objects in {}", ids.len(), self.name());
        *self.ids.write().unwrap_or_else(PoisonError::into_inner) = Some(ids.clone());
        Ok(ids)
    }

    fn object_data_for(&self, id: &ObjectHash) -> Result<Bytes, GitError> {
        if let Some(payload) = self.payloads.get(id) {
            return Ok(payload.clone());
        }
        self.load(id)
    }

    fn object_type_for(&self, id: &ObjectHash) -> Result<ObjectType, GitError> {
        self.header_for(id).map(|(object_type, _)| object_type)
    }

    fn object_size_for(&self, id: &ObjectHash) -> Result<usize, GitError> {
        self.header_for(id).map(|(_, size)| size)
    }

    fn reset(&self) {
        *self.ids.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.headers.clear();
        self.payloads.clear();
        self.objects.clear();
    }

    fn objects(&self) -> &DashMap<ObjectHash, GitObject> {
        &self.objects
    }
}

/// Parse `"<type> <size>\0"`. `Ok(None)` when no NUL is present yet, which for a
/// truncated peek means the header did not fit.
fn parse_header(id: &ObjectHash, raw: &[u8]) -> Result<Option<LooseHeader>, GitError> {
    let Some(nul) = memchr(0, raw) else {
        if raw.len() > MAX_HEADER_LEN {
            return Err(corrupt(id, "header is not NUL terminated".to_string()));
        }
        return Ok(None);
    };
    let header = &raw[..nul];
    let space = memchr(b' ', header)
        .ok_or_else(|| corrupt(id, "header has no size".to_string()))?;
    let object_type = ObjectType::from_bytes(&header[..space])
        .map_err(|_| corrupt(id, "unknown object type".to_string()))?;
    let size = std::str::from_utf8(&header[space + 1..])
        .ok()
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| corrupt(id, "header size is not a number".to_string()))?;
    Ok(Some(LooseHeader {
        object_type,
        size,
        len: nul + 1,
    }))
}

fn corrupt(id: &ObjectHash, msg: String) -> GitError {
    GitError::CorruptObject(format!("loose object {id}: {msg}"))
}

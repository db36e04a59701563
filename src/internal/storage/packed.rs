//! Packed objects: a `.pack` file of zlib-compressed records, addressed through its `.idx`.
//!
//! A record either holds a whole object or a delta against a base record, found by
//! distance (`ofs_delta`) or by id (`ref_delta`). Payloads are rebuilt by walking the base
//! chain down to a whole object and replaying the deltas on the way back up:
//!
//! ```text
//! wanted ──ofs──▶ delta ──ref──▶ delta ──ofs──▶ base
//!   ▲                                            │
//!   └──────── apply, apply, apply ◀──────────────┘
//! ```
//!
//! The index and the pack handle are opened on first use and held, together with the
//! record and payload caches, behind one mutex until [`ObjectStore::reset`].

use std::{
    collections::{HashMap, HashSet},
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use byteorder::{BigEndian, ReadBytesExt};
use bytes::Bytes;
use dashmap::DashMap;
use tracing::{debug, error};

use crate::{
    config::OdbConfig,
    delta::{DeltaHeader, delta_decode, read_delta_header},
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::{GitObject, types::ObjectType},
        pack::{
            PACK_HEADER_SIZE, PACK_MAGIC, PACK_TRAILER_SIZE,
            entry::{PackedRecord, RecordKind},
            pack_index::{IndexVersion, PackIndex},
        },
        storage::ObjectStore,
        zlib::stream::inflate::ReadBoxed,
    },
};

/// Two size varints never take more than this many inflated bytes.
const DELTA_HEADER_PEEK: u64 = 32;
const MAX_PREALLOCATION: usize = 1 << 24;

#[derive(Debug)]
pub struct PackedObjectStore {
    index_path: PathBuf,
    pack_path: PathBuf,
    config: Arc<OdbConfig>,
    state: Mutex<Option<PackState>>,
    objects: DashMap<ObjectHash, GitObject>,
}

/// Everything read from one generation of the pack.
#[derive(Debug)]
struct PackState {
    index: Arc<PackIndex>,
    pack: BufReader<File>,
    pack_len: u64,
    records: HashMap<u64, PackedRecord>,
    /// Final (type, size) per record offset.
    headers: HashMap<u64, (ObjectType, usize)>,
    /// Final payloads per record offset.
    data: HashMap<u64, (ObjectType, Bytes)>,
}

impl PackedObjectStore {
    /// Store over `<name>.idx` and its sibling `<name>.pack`. Nothing is read yet.
    pub fn new(index_path: impl Into<PathBuf>, config: Arc<OdbConfig>) -> Self {
        let index_path = index_path.into();
        let pack_path = index_path.with_extension("pack");
        PackedObjectStore {
            index_path,
            pack_path,
            config,
            state: Mutex::new(None),
            objects: DashMap::new(),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn pack_path(&self) -> &Path {
        &self.pack_path
    }

    /// The parsed index of the current generation.
    pub fn index(&self) -> Result<Arc<PackIndex>, GitError> {
        self.with_state(|state| Ok(state.index.clone()))
    }

    /// Compare the raw bytes of the record for `id` against the CRC32 stored in the index.
    ///
    /// Version 1 indices store no checksums and give `UnsupportedFormat`.
    pub fn check_crc32(&self, id: &ObjectHash) -> Result<bool, GitError> {
        self.with_state(|state| {
            if state.index.version() == IndexVersion::V1 {
                return Err(GitError::UnsupportedFormat(format!(
                    "{} is a version 1 index without checksums",
                    self.index_path.display()
                )));
            }
            let (offset, expected) = state
                .index
                .data_offset_for(id)
                .zip(state.index.crc32_for(id))
                .ok_or_else(|| GitError::ObjectNotFound(id.to_string()))?;
            let data_end = state.pack_len - PACK_TRAILER_SIZE;
            let end = state
                .index
                .record_end(offset, data_end)
                .filter(|end| *end > offset && *end <= data_end)
                .ok_or_else(|| {
                    GitError::CorruptIndex(format!("record {id} at {offset} lies outside the pack"))
                })?;
            let mut raw = vec![0u8; (end - offset) as usize];
            state.pack.seek(SeekFrom::Start(offset))?;
            state.pack.read_exact(&mut raw)?;
            Ok(crc32fast::hash(&raw) == expected)
        })
    }

    /// Run `f` against the open pack, opening it first if this generation has not been read.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut PackState) -> Result<T, GitError>,
    ) -> Result<T, GitError> {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let state = match guard.take() {
            Some(state) => state,
            None => PackState::open(&self.index_path, &self.pack_path, &self.config)?,
        };
        f(guard.insert(state))
    }

    fn offset_for(state: &PackState, id: &ObjectHash) -> Result<u64, GitError> {
        state
            .index
            .data_offset_for(id)
            .ok_or_else(|| GitError::ObjectNotFound(id.to_string()))
    }
}

impl PackState {
    fn open(
        index_path: &Path,
        pack_path: &Path,
        config: &OdbConfig,
    ) -> Result<PackState, GitError> {
        let index = PackIndex::from_file(index_path)?;
        let file = File::open(pack_path)?;
        let pack_len = file.metadata()?.len();
        let mut pack = BufReader::with_capacity(config.read_chunk_bytes()?, file);

        let invalid =
            |msg: String| GitError::InvalidPackHeader(format!("{}: {msg}", pack_path.display()));
        if pack_len < PACK_HEADER_SIZE + PACK_TRAILER_SIZE {
            return Err(invalid(format!("{pack_len} bytes is too short for a pack")));
        }
        let mut magic = [0u8; 4];
        pack.read_exact(&mut magic)?;
        if magic != PACK_MAGIC {
            return Err(invalid(format!("bad signature {magic:?}")));
        }
        let version = pack.read_u32::<BigEndian>()?;
        if version != 2 && version != 3 {
            return Err(invalid(format!("unsupported version {version}")));
        }
        let count = pack.read_u32::<BigEndian>()?;
        if count as usize != index.len() {
            return Err(invalid(format!(
                "pack holds {count} objects but its index lists {}",
                index.len()
            )));
        }
        debug!("opened pack {} with {count} objects", pack_path.display());

        Ok(PackState {
            index: Arc::new(index),
            pack,
            pack_len,
            records: HashMap::new(),
            headers: HashMap::new(),
            data: HashMap::new(),
        })
    }

    fn record_at(&mut self, offset: u64) -> Result<PackedRecord, GitError> {
        if let Some(record) = self.records.get(&offset) {
            return Ok(*record);
        }
        if offset < PACK_HEADER_SIZE || offset >= self.pack_len - PACK_TRAILER_SIZE {
            return Err(GitError::CorruptObject(format!(
                "record offset {offset} lies outside the pack"
            )));
        }
        self.pack.seek(SeekFrom::Start(offset))?;
        let record = PackedRecord::read_header(&mut self.pack, offset)?;
        self.records.insert(offset, record);
        Ok(record)
    }

    /// The inflated payload of a single record, exactly `record.size` bytes.
    fn inflate_record(&mut self, record: &PackedRecord) -> Result<Vec<u8>, GitError> {
        self.pack.seek(SeekFrom::Start(record.data_offset))?;
        let mut reader = ReadBoxed::new(&mut self.pack);
        let mut out = Vec::with_capacity(record.size.min(MAX_PREALLOCATION));
        (&mut reader)
            .take(record.size as u64 + 1)
            .read_to_end(&mut out)
            .map_err(|e| {
                GitError::CorruptObject(format!("record at {}: {e}", record.offset))
            })?;
        if out.len() != record.size || !reader.is_finished() {
            error!(
                "record at {} inflated to {} bytes, header says {}",
                record.offset,
                out.len(),
                record.size
            );
            return Err(GitError::CorruptObject(format!(
                "record at {} inflates to {}{} bytes instead of {}",
                record.offset,
                if reader.is_finished() { "" } else { "at least " },
                out.len(),
                record.size
            )));
        }
        Ok(out)
    }

    /// Sizes at the front of a delta record, read from a short inflated prefix.
    fn delta_header(&mut self, record: &PackedRecord) -> Result<DeltaHeader, GitError> {
        self.pack.seek(SeekFrom::Start(record.data_offset))?;
        let mut prefix = Vec::with_capacity(DELTA_HEADER_PEEK as usize);
        ReadBoxed::new(&mut self.pack)
            .take(DELTA_HEADER_PEEK)
            .read_to_end(&mut prefix)
            .map_err(|e| GitError::CorruptObject(format!("record at {}: {e}", record.offset)))?;
        Ok(read_delta_header(&mut prefix.as_slice())?)
    }

    /// Follow the base chain from `offset` down to a whole record or a cached payload.
    /// Returns the delta records passed on the way, nearest first.
    fn walk_chain(
        &mut self,
        offset: u64,
        max_depth: usize,
    ) -> Result<(Vec<PackedRecord>, ChainEnd), GitError> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = offset;
        loop {
            if !visited.insert(current) {
                return Err(GitError::CorruptDelta(format!(
                    "delta chain starting at {offset} loops back to {current}"
                )));
            }
            if let Some((object_type, data)) = self.data.get(&current) {
                return Ok((chain, ChainEnd::Cached(*object_type, data.clone())));
            }
            let record = self.record_at(current)?;
            let base = match record.kind {
                RecordKind::Base(object_type) => {
                    return Ok((chain, ChainEnd::Base(object_type, record)));
                }
                RecordKind::OffsetDelta { base_offset } => base_offset,
                RecordKind::HashDelta { base_id } => {
                    self.index.data_offset_for(&base_id).ok_or_else(|| {
                        GitError::ObjectNotFound(format!(
                            "{base_id}, base of the delta at {current}"
                        ))
                    })?
                }
            };
            chain.push(record);
            if chain.len() > max_depth {
                return Err(GitError::UnsupportedFormat(format!(
                    "delta chain starting at {offset} is deeper than {max_depth}"
                )));
            }
            current = base;
        }
    }

    /// Final type and payload of the object stored at `offset`.
    fn resolve(&mut self, offset: u64, max_depth: usize) -> Result<(ObjectType, Bytes), GitError> {
        let (chain, end) = self.walk_chain(offset, max_depth)?;
        let (object_type, mut data) = match end {
            ChainEnd::Cached(object_type, data) => (object_type, data),
            ChainEnd::Base(object_type, record) => {
                let data = Bytes::from(self.inflate_record(&record)?);
                self.data.insert(record.offset, (object_type, data.clone()));
                (object_type, data)
            }
        };
        for record in chain.iter().rev() {
            let delta = self.inflate_record(record)?;
            let rebuilt = delta_decode(&mut delta.as_slice(), &data).map_err(|e| {
                error!("failed to apply delta at {}: {e}", record.offset);
                GitError::from(e)
            })?;
            data = Bytes::from(rebuilt);
            self.data.insert(record.offset, (object_type, data.clone()));
        }
        Ok((object_type, data))
    }

    /// Final type and size without rebuilding the payload.
    fn header(&mut self, offset: u64, max_depth: usize) -> Result<(ObjectType, usize), GitError> {
        if let Some(header) = self.headers.get(&offset) {
            return Ok(*header);
        }
        let (chain, end) = self.walk_chain(offset, max_depth)?;
        let header = match (chain.first(), end) {
            (None, ChainEnd::Cached(object_type, data)) => (object_type, data.len()),
            (None, ChainEnd::Base(object_type, record)) => (object_type, record.size),
            (Some(nearest), ChainEnd::Cached(object_type, _) | ChainEnd::Base(object_type, _)) => {
                (object_type, self.delta_header(nearest)?.result_size)
            }
        };
        self.headers.insert(offset, header);
        Ok(header)
    }
}

/// Where a base chain walk stopped.
enum ChainEnd {
    Cached(ObjectType, Bytes),
    Base(ObjectType, PackedRecord),
}

impl ObjectStore for PackedObjectStore {
    fn name(&self) -> String {
        self.pack_path.display().to_string()
    }

    fn all_ids(&self) -> Result<Arc<Vec<ObjectHash>>, GitError> {
        self.with_state(|state| Ok(state.index.ids()))
    }

    fn contains(&self, id: &ObjectHash) -> Result<bool, GitError> {
        self.with_state(|state| Ok(state.index.contains(id)))
    }

    fn object_data_for(&self, id: &ObjectHash) -> Result<Bytes, GitError> {
        let max_depth = self.config.max_delta_depth;
        let (object_type, data) = self.with_state(|state| {
            let offset = Self::offset_for(state, id)?;
            state.resolve(offset, max_depth)
        })?;
        if self.config.verify_object_ids {
            let actual = ObjectHash::from_type_and_data(object_type, &data);
            if actual != *id {
                error!("packed object {id} hashes to {actual}");
                return Err(GitError::CorruptObject(format!(
                    "packed object {id} hashes to {actual}"
                )));
            }
        }
        Ok(data)
    }

    fn object_type_for(&self, id: &ObjectHash) -> Result<ObjectType, GitError> {
        let max_depth = self.config.max_delta_depth;
        self.with_state(|state| {
            let offset = Self::offset_for(state, id)?;
            state.header(offset, max_depth).map(|(object_type, _)| object_type)
        })
    }

    fn object_size_for(&self, id: &ObjectHash) -> Result<usize, GitError> {
        let max_depth = self.config.max_delta_depth;
        self.with_state(|state| {
            let offset = Self::offset_for(state, id)?;
            state.header(offset, max_depth).map(|(_, size)| size)
        })
    }

    fn reset(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.objects.clear();
    }

    fn objects(&self) -> &DashMap<ObjectHash, GitObject> {
        &self.objects
    }
}

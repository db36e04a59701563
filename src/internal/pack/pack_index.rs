//! Reader for pack index (`.idx`) files, versions 1 and 2.
//!
//! Both versions open with a 256-entry fan-out table of big-endian counts; entry `i`
//! is the number of ids whose first byte is `<= i`. Version 1 follows it with
//! `(u32 offset, 20-byte id)` records. Version 2 starts with the `\377tOc` magic and
//! a version word, and stores ids, CRC32s and 31-bit offsets as parallel tables,
//! followed by a table of 64-bit offsets for records beyond 2 GiB.
//!
//! See <https://git-scm.com/docs/pack-format>.

use std::{fs, io::Cursor, path::Path, sync::Arc};

use byteorder::{BigEndian, ReadBytesExt};
use tracing::debug;

use crate::{
    errors::GitError,
    hash::{ObjectHash, SHA1_SIZE},
    utils::read_sha,
};

pub const IDX_MAGIC: [u8; 4] = [0xFF, 0x74, 0x4F, 0x63];
const FANOUT_ENTRIES: usize = 256;
const LARGE_OFFSET_FLAG: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexVersion {
    V1,
    V2,
}

/// Parsed, immutable pack index.
#[derive(Debug)]
pub struct PackIndex {
    version: IndexVersion,
    fanout: [u32; FANOUT_ENTRIES],
    ids: Arc<Vec<ObjectHash>>,
    crc32: Vec<u32>,
    offsets: Vec<u64>,
    /// (offset, position in `ids`), sorted by offset.
    by_offset: Vec<(u64, usize)>,
}

impl PackIndex {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, GitError> {
        let path = path.as_ref();
        let data = fs::read(path)?;
        let index = Self::from_bytes(&data)
            .map_err(|e| match e {
                GitError::CorruptIndex(msg) => {
                    GitError::CorruptIndex(format!("{}: {msg}", path.display()))
                }
                other => other,
            })?;
        debug!(
            "loaded {:?} pack index {} with {} objects",
            index.version,
            path.display(),
            index.len()
        );
        Ok(index)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, GitError> {
        let mut cursor = Cursor::new(data);
        let version = if data.len() >= 8 && data[..4] == IDX_MAGIC {
            cursor.set_position(4);
            match cursor.read_u32::<BigEndian>().map_err(truncated)? {
                2 => IndexVersion::V2,
                v => return Err(GitError::CorruptIndex(format!("unsupported version {v}"))),
            }
        } else {
            IndexVersion::V1
        };

        let mut fanout = [0u32; FANOUT_ENTRIES];
        let mut previous = 0;
        for (i, slot) in fanout.iter_mut().enumerate() {
            let count = cursor.read_u32::<BigEndian>().map_err(truncated)?;
            if count < previous {
                return Err(GitError::CorruptIndex(format!(
                    "fan-out entry {i} ({count}) is smaller than entry {} ({previous})",
                    i.saturating_sub(1)
                )));
            }
            *slot = count;
            previous = count;
        }
        let count = fanout[FANOUT_ENTRIES - 1] as usize;
        check_table_fits(&cursor, count, min_record_size(version))?;

        let mut ids = Vec::with_capacity(count);
        let mut crc32 = Vec::new();
        let mut offsets = Vec::with_capacity(count);
        match version {
            IndexVersion::V1 => {
                for _ in 0..count {
                    offsets.push(u64::from(
                        cursor.read_u32::<BigEndian>().map_err(truncated)?,
                    ));
                    ids.push(read_sha(&mut cursor).map_err(truncated)?);
                }
            }
            IndexVersion::V2 => {
                for _ in 0..count {
                    ids.push(read_sha(&mut cursor).map_err(truncated)?);
                }
                crc32.reserve(count);
                for _ in 0..count {
                    crc32.push(cursor.read_u32::<BigEndian>().map_err(truncated)?);
                }
                let mut raw = Vec::with_capacity(count);
                for _ in 0..count {
                    raw.push(cursor.read_u32::<BigEndian>().map_err(truncated)?);
                }
                let large_count = raw
                    .iter()
                    .filter(|v| **v & LARGE_OFFSET_FLAG != 0)
                    .map(|v| (v & !LARGE_OFFSET_FLAG) as usize + 1)
                    .max()
                    .unwrap_or(0);
                check_large_table(&cursor, large_count)?;
                let mut large = Vec::with_capacity(large_count);
                for _ in 0..large_count {
                    large.push(cursor.read_u64::<BigEndian>().map_err(truncated)?);
                }
                for value in raw {
                    if value & LARGE_OFFSET_FLAG == 0 {
                        offsets.push(u64::from(value));
                    } else {
                        // bounded by `large_count` above
                        offsets.push(large[(value & !LARGE_OFFSET_FLAG) as usize]);
                    }
                }
            }
        }

        validate_ids(&fanout, &ids)?;

        let mut by_offset: Vec<(u64, usize)> =
            offsets.iter().enumerate().map(|(i, o)| (*o, i)).collect();
        by_offset.sort_unstable();

        Ok(PackIndex {
            version,
            fanout,
            ids: Arc::new(ids),
            crc32,
            offsets,
            by_offset,
        })
    }

    pub fn version(&self) -> IndexVersion {
        self.version
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn fanout(&self) -> &[u32; FANOUT_ENTRIES] {
        &self.fanout
    }

    /// All ids in ascending order.
    pub fn ids(&self) -> Arc<Vec<ObjectHash>> {
        self.ids.clone()
    }

    /// Position of `id` in the sorted id table, searching only its fan-out bucket.
    fn position_of(&self, id: &ObjectHash) -> Option<usize> {
        let bucket = id.first_byte() as usize;
        let start = if bucket == 0 {
            0
        } else {
            self.fanout[bucket - 1] as usize
        };
        let end = self.fanout[bucket] as usize;
        self.ids[start..end]
            .binary_search(id)
            .ok()
            .map(|pos| start + pos)
    }

    /// Byte offset of the record for `id` in the paired pack file.
    pub fn data_offset_for(&self, id: &ObjectHash) -> Option<u64> {
        self.position_of(id).map(|pos| self.offsets[pos])
    }

    pub fn contains(&self, id: &ObjectHash) -> bool {
        self.position_of(id).is_some()
    }

    /// CRC32 of the raw record bytes; version 1 indices carry none.
    pub fn crc32_for(&self, id: &ObjectHash) -> Option<u32> {
        if self.version == IndexVersion::V1 {
            return None;
        }
        self.position_of(id).map(|pos| self.crc32[pos])
    }

    /// Id of the record starting at `offset`.
    pub fn id_at_offset(&self, offset: u64) -> Option<ObjectHash> {
        self.by_offset
            .binary_search_by_key(&offset, |(o, _)| *o)
            .ok()
            .map(|i| self.ids[self.by_offset[i].1])
    }

    /// Offset just past the record starting at `offset`: the next record, or `data_end`
    /// (the start of the pack trailer) for the last one.
    pub fn record_end(&self, offset: u64, data_end: u64) -> Option<u64> {
        let i = self
            .by_offset
            .binary_search_by_key(&offset, |(o, _)| *o)
            .ok()?;
        Some(
            self.by_offset
                .get(i + 1)
                .map(|(next, _)| *next)
                .unwrap_or(data_end),
        )
    }
}

fn min_record_size(version: IndexVersion) -> usize {
    match version {
        IndexVersion::V1 => 4 + SHA1_SIZE,
        IndexVersion::V2 => SHA1_SIZE + 4 + 4,
    }
}

/// Reject counts that cannot fit in the remaining bytes before allocating for them.
fn check_table_fits(cursor: &Cursor<&[u8]>, count: usize, record: usize) -> Result<(), GitError> {
    let remaining = cursor.get_ref().len() as u64 - cursor.position();
    match count.checked_mul(record) {
        Some(needed) if needed as u64 <= remaining => Ok(()),
        _ => Err(GitError::CorruptIndex(format!(
            "{count} objects do not fit in {remaining} remaining bytes"
        ))),
    }
}

/// The 64-bit offset table sits between the 31-bit offsets and the two trailing checksums,
/// so every referenced slot has to fit in that gap.
fn check_large_table(cursor: &Cursor<&[u8]>, large_count: usize) -> Result<(), GitError> {
    let remaining = (cursor.get_ref().len() as u64 - cursor.position())
        .saturating_sub(2 * SHA1_SIZE as u64);
    let available = remaining / 8;
    if large_count as u64 > available {
        return Err(GitError::CorruptIndex(format!(
            "large offset slot {} is outside the {available}-entry table",
            large_count - 1
        )));
    }
    Ok(())
}

/// Ids must be strictly ascending and each must sit in the bucket the fan-out assigns it.
fn validate_ids(fanout: &[u32; FANOUT_ENTRIES], ids: &[ObjectHash]) -> Result<(), GitError> {
    for pair in ids.windows(2) {
        if pair[0] >= pair[1] {
            return Err(GitError::CorruptIndex(format!(
                "ids out of order at {}",
                pair[1]
            )));
        }
    }
    let mut expected = [0u32; FANOUT_ENTRIES];
    for id in ids {
        expected[id.first_byte() as usize] += 1;
    }
    let mut running = 0;
    for (i, count) in expected.iter().enumerate() {
        running += count;
        if fanout[i] != running {
            return Err(GitError::CorruptIndex(format!(
                "fan-out entry {i} is {} but {running} ids precede it",
                fanout[i]
            )));
        }
    }
    Ok(())
}

fn truncated(err: std::io::Error) -> GitError {
    GitError::CorruptIndex(format!("truncated table: {err}"))
}

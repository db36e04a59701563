//! Header of a single record inside a `.pack` file.
//!
//! ```text
//! byte 0:   [C][T T T][S S S S]   C = more size bytes, T = type, S = size bits 0..4
//! byte n:   [C][S S S S S S S]    size bits continue at shift 4, 11, 18, ...
//! ofs_delta: offset-style varint, distance back to the base record
//! ref_delta: 20 raw bytes naming the base object
//! ```

use std::io::Read;

use crate::{
    delta::utils::{read_bytes, read_offset_encoding, shift_checked},
    errors::GitError,
    hash::ObjectHash,
    internal::object::types::ObjectType,
    utils::{CountingReader, read_sha},
};

const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

/// What a record stores: a whole object or a patch against some base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Base(ObjectType),
    OffsetDelta { base_offset: u64 },
    HashDelta { base_id: ObjectHash },
}

impl RecordKind {
    pub fn is_delta(&self) -> bool {
        !matches!(self, RecordKind::Base(_))
    }
}

/// Parsed record header. `size` is the inflated length of the record's own payload,
/// which for deltas is the length of the instruction stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRecord {
    pub offset: u64,
    pub kind: RecordKind,
    pub size: usize,
    /// Offset of the zlib stream that follows the header.
    pub data_offset: u64,
}

impl PackedRecord {
    /// Parse the header of the record starting at `offset`; `reader` must be positioned there.
    pub fn read_header(reader: &mut impl Read, offset: u64) -> Result<Self, GitError> {
        let mut reader = CountingReader::new(reader);
        let [first] = read_bytes(&mut reader).map_err(|e| corrupt(offset, e))?;
        let type_bits = (first >> 4) & 0b111;
        let mut size = (first & 0x0f) as usize;
        let mut more = first & 0x80 != 0;
        let mut shift = 4;
        while more {
            let [byte] = read_bytes(&mut reader).map_err(|e| corrupt(offset, e))?;
            size |= shift_checked((byte & 0x7f) as usize, shift).map_err(|e| corrupt(offset, e))?;
            more = byte & 0x80 != 0;
            shift += 7;
        }

        let kind = match type_bits {
            OFS_DELTA => {
                let distance = read_offset_encoding(&mut reader).map_err(|e| {
                    GitError::CorruptDelta(format!("bad base distance at {offset}: {e}"))
                })?;
                if distance == 0 || distance > offset {
                    return Err(GitError::CorruptDelta(format!(
                        "record at {offset} points {distance} bytes back"
                    )));
                }
                RecordKind::OffsetDelta {
                    base_offset: offset - distance,
                }
            }
            REF_DELTA => RecordKind::HashDelta {
                base_id: read_sha(&mut reader).map_err(|e| corrupt(offset, e))?,
            },
            other => RecordKind::Base(ObjectType::from_pack_type_u8(other).ok_or_else(|| {
                GitError::CorruptObject(format!("record at {offset} has type {other}"))
            })?),
        };

        Ok(PackedRecord {
            offset,
            kind,
            size,
            data_offset: offset + reader.bytes_read,
        })
    }
}

fn corrupt(offset: u64, err: std::io::Error) -> GitError {
    GitError::CorruptObject(format!("unreadable record header at {offset}: {err}"))
}

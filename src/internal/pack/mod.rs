//! Pack file readers that follow the [pack format documentation](https://git-scm.com/docs/pack-format):
//! the `.idx` lookup table and the record headers of the paired `.pack`.

pub mod entry;
pub mod pack_index;

/// `PACK` signature at the start of every pack file.
pub const PACK_MAGIC: [u8; 4] = *b"PACK";
/// Pack header: signature, version and object count.
pub const PACK_HEADER_SIZE: u64 = 12;
/// Trailing SHA-1 of the pack contents.
pub const PACK_TRAILER_SIZE: u64 = 20;

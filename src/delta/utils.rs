//! Shared readers for Git delta streams and pack record headers: size-style and
//! offset-style varints plus the partial integers used by copy instructions.

use std::io::{self, Read};

const VAR_INT_ENCODING_BITS: u8 = 7;
const VAR_INT_CONTINUE_FLAG: u8 = 1 << VAR_INT_ENCODING_BITS;

/// Read exactly `N` bytes from the stream into a fixed array.
#[inline]
pub fn read_bytes<R: Read, const N: usize>(stream: &mut R) -> io::Result<[u8; N]> {
    let mut bytes = [0; N];
    stream.read_exact(&mut bytes)?;

    Ok(bytes)
}

/// Read a size-style varint (little-endian 7-bit chunks with msb as continue flag).
pub fn read_size_encoding<R: Read>(stream: &mut R) -> io::Result<usize> {
    let mut value = 0;
    let mut length = 0;

    loop {
        let (byte_value, more_bytes) = read_var_int_byte(stream)?;
        value |= shift_checked(byte_value as usize, length)?;
        if !more_bytes {
            return Ok(value);
        }

        length += u32::from(VAR_INT_ENCODING_BITS);
    }
}

/// Read an offset-style varint as used by `ofs_delta` records: every continued
/// byte pre-increments the accumulated value before shifting it left by 7.
pub fn read_offset_encoding<R: Read>(stream: &mut R) -> io::Result<u64> {
    let (byte_value, mut more_bytes) = read_var_int_byte(stream)?;
    let mut value = u64::from(byte_value);

    while more_bytes {
        let (byte_value, more) = read_var_int_byte(stream)?;
        more_bytes = more;
        value = value
            .checked_add(1)
            .and_then(|v| v.checked_mul(1 << VAR_INT_ENCODING_BITS))
            .ok_or_else(|| overflow("offset varint"))?
            | u64::from(byte_value);
    }

    Ok(value)
}

/// Read a partial integer according to presence bits (used by copy instructions):
/// for each bit set in `present_bytes`, consume one byte and accumulate into `value`, shifting per byte index.
pub fn read_partial_int<R: Read>(
    stream: &mut R,
    bytes: u8,
    present_bytes: &mut u8,
) -> io::Result<usize> {
    let mut value: usize = 0;

    for byte_index in 0..bytes {
        if *present_bytes & 1 != 0 {
            let [byte] = read_bytes(stream)?;
            value |= (byte as usize) << (byte_index * 8);
        }

        *present_bytes >>= 1;
    }

    Ok(value)
}

/// Read one varint byte, returning (7-bit value, has_more flag).
pub fn read_var_int_byte<R: Read>(stream: &mut R) -> io::Result<(u8, bool)> {
    let [byte] = read_bytes(stream)?;
    let value = byte & !VAR_INT_CONTINUE_FLAG;
    let more_bytes = byte & VAR_INT_CONTINUE_FLAG != 0;

    Ok((value, more_bytes))
}

/// `value << shift`, failing instead of silently dropping high bits.
pub(crate) fn shift_checked(value: usize, shift: u32) -> io::Result<usize> {
    if value == 0 {
        return Ok(0);
    }
    if shift >= usize::BITS || (value << shift) >> shift != value {
        return Err(overflow("size varint"));
    }
    Ok(value << shift)
}

fn overflow(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, format!("{what} overflows"))
}

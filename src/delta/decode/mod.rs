//! Decoder for Git delta instructions that rebuilds a target object from a base buffer
//! and the instruction stream stored in `ofs_delta` / `ref_delta` pack records
//! (base size + result size + op codes).

use std::io::{ErrorKind, Read};

use super::{errors::GitDeltaError, utils};

const COPY_INSTRUCTION_FLAG: u8 = 1 << 7; // msb set => copy from base, otherwise inline data
const COPY_OFFSET_BYTES: u8 = 4;
const COPY_SIZE_BYTES: u8 = 3;
const COPY_ZERO_SIZE: usize = 0x10000;
/// Upper bound on the up-front allocation; a lying `result_size` must not abort the process.
const MAX_PREALLOCATION: usize = 1 << 24;

/// Sizes announced at the start of a delta stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaHeader {
    pub base_size: usize,
    pub result_size: usize,
}

/// Read the two leading size varints of a delta stream.
pub fn read_delta_header(stream: &mut impl Read) -> Result<DeltaHeader, GitDeltaError> {
    let base_size = utils::read_size_encoding(stream)
        .map_err(|e| decoder_error(format!("unreadable base size: {e}")))?;
    let result_size = utils::read_size_encoding(stream)
        .map_err(|e| decoder_error(format!("unreadable result size: {e}")))?;
    Ok(DeltaHeader {
        base_size,
        result_size,
    })
}

/// Apply a delta stream to `base_info`, returning the reconstructed target bytes.
///
/// - leading base size (must equal `base_info.len()`), then result size (varint)
/// - sequence of ops: data instructions (msb=0, lower 7 bits = literal length) or copy
///   instructions (msb=1, following bytes encode offset/size).
///
/// The stream is consumed to its end and the output must be exactly `result_size` long.
pub fn delta_decode(stream: &mut impl Read, base_info: &[u8]) -> Result<Vec<u8>, GitDeltaError> {
    let DeltaHeader {
        base_size,
        result_size,
    } = read_delta_header(stream)?;
    if base_info.len() != base_size {
        return Err(decoder_error(format!(
            "base object len {} is not equal to declared {base_size}",
            base_info.len()
        )));
    }

    let mut buffer = Vec::with_capacity(result_size.min(MAX_PREALLOCATION));
    loop {
        let instruction = match utils::read_bytes(stream) {
            Ok([instruction]) => instruction,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(decoder_error(format!("wrong instruction in delta: {err}"))),
        };
        let remaining = result_size - buffer.len();

        if instruction & COPY_INSTRUCTION_FLAG == 0 {
            // Appending 0 bytes doesn't make sense, so git disallows it
            if instruction == 0 {
                return Err(decoder_error("invalid data instruction 0".to_owned()));
            }
            let len = instruction as usize;
            if len > remaining {
                return Err(decoder_error(format!(
                    "insert of {len} bytes overruns result size {result_size}"
                )));
            }
            let start = buffer.len();
            buffer.resize(start + len, 0);
            stream
                .read_exact(&mut buffer[start..])
                .map_err(|e| decoder_error(format!("truncated insert instruction: {e}")))?;
        } else {
            let mut nonzero_bytes = instruction;
            let offset = utils::read_partial_int(stream, COPY_OFFSET_BYTES, &mut nonzero_bytes)
                .map_err(|e| decoder_error(format!("truncated copy offset: {e}")))?;
            let mut size = utils::read_partial_int(stream, COPY_SIZE_BYTES, &mut nonzero_bytes)
                .map_err(|e| decoder_error(format!("truncated copy size: {e}")))?;
            if size == 0 {
                // Copying 0 bytes doesn't make sense, so git assumes a different size
                size = COPY_ZERO_SIZE;
            }
            let end = offset
                .checked_add(size)
                .ok_or_else(|| decoder_error("copy range overflows".to_owned()))?;
            if end > base_size {
                return Err(decoder_error(format!(
                    "copy {offset}..{end} exceeds base size {base_size}"
                )));
            }
            if size > remaining {
                return Err(decoder_error(format!(
                    "copy of {size} bytes overruns result size {result_size}"
                )));
            }
            buffer.extend_from_slice(&base_info[offset..end]);
        }
    }

    if buffer.len() != result_size {
        return Err(decoder_error(format!(
            "delta produced {} bytes, expected {result_size}",
            buffer.len()
        )));
    }
    Ok(buffer)
}

fn decoder_error(msg: String) -> GitDeltaError {
    GitDeltaError::DeltaDecoderError(msg)
}

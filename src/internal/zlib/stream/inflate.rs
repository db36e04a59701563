//! Buffered inflate reader for Git's zlib-compressed objects. It never consumes input past
//! the end of a stream, so pack records can be read back to back from one reader.

use std::{
    io,
    io::{BufRead, Read},
};

use flate2::{Decompress, FlushDecompress, Status};

/// ReadBoxed is to unzip information from a DEFLATE stream,
/// which has [`BufRead`] trait.
/// For a continuous stream of DEFLATE information, the structure
/// does not read too many bytes to affect subsequent information
/// reads
pub struct ReadBoxed<R> {
    /// The reader from which bytes should be decompressed.
    pub inner: R,
    /// The decompressor doing all the work.
    pub decompressor: Box<Decompress>,
    stream_end: bool,
}

impl<R> ReadBoxed<R>
where
    R: BufRead,
{
    pub fn new(inner: R) -> Self {
        ReadBoxed {
            inner,
            decompressor: Box::new(Decompress::new(true)),
            stream_end: false,
        }
    }

    /// Whether the zlib stream reached its end marker.
    pub fn is_finished(&self) -> bool {
        self.stream_end
    }

    /// Compressed bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.decompressor.total_in()
    }
}

impl<R> io::Read for ReadBoxed<R>
where
    R: BufRead,
{
    fn read(&mut self, into: &mut [u8]) -> io::Result<usize> {
        if self.stream_end || into.is_empty() {
            return Ok(0);
        }
        let (o, ended) = read(&mut self.inner, &mut self.decompressor, into)?;
        self.stream_end = ended;
        Ok(o)
    }
}

/// Read bytes from `rd` and decompress them using `state` into `dst`, returning the amount of
/// bytes written and whether the end of the stream was reached.
fn read(
    rd: &mut impl BufRead,
    state: &mut Decompress,
    mut dst: &mut [u8],
) -> io::Result<(usize, bool)> {
    let mut total_written = 0;
    loop {
        let (written, consumed, ret, eof);
        {
            let input = rd.fill_buf()?;
            eof = input.is_empty();
            let before_out = state.total_out();
            let before_in = state.total_in();
            let flush = if eof {
                FlushDecompress::Finish
            } else {
                FlushDecompress::None
            };
            ret = state.decompress(input, dst, flush);
            written = (state.total_out() - before_out) as usize;
            total_written += written;
            dst = &mut dst[written..];
            consumed = (state.total_in() - before_in) as usize;
        }
        rd.consume(consumed);

        match ret {
            Ok(Status::StreamEnd) => return Ok((total_written, true)),
            // Either input or output is depleted even though the stream is not finished yet.
            Ok(Status::Ok | Status::BufError) if eof || dst.is_empty() => {
                return Ok((total_written, false));
            }
            Ok(Status::Ok | Status::BufError) if consumed != 0 || written != 0 => continue,
            Ok(Status::Ok | Status::BufError) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "deflate stream makes no progress",
                ));
            }
            Err(..) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "corrupt deflate stream",
                ));
            }
        }
    }
}

/// Inflate a complete zlib stream. A stream that ends before its end marker is an error.
pub fn inflate(compressed: &[u8], size_hint: usize) -> io::Result<Vec<u8>> {
    let mut reader = ReadBoxed::new(compressed);
    let mut out = Vec::with_capacity(size_hint);
    reader.read_to_end(&mut out)?;
    if !reader.is_finished() {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "truncated deflate stream",
        ));
    }
    Ok(out)
}

/// Inflate at most `max_out` bytes from a possibly truncated stream. Whatever could be
/// produced is returned; the caller decides whether that is enough.
pub fn inflate_prefix(compressed: &[u8], max_out: usize) -> io::Result<Vec<u8>> {
    let reader = ReadBoxed::new(compressed);
    let mut out = Vec::with_capacity(max_out);
    reader.take(max_out as u64).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read, Write};

    use flate2::{Compression, write::ZlibEncoder};

    use super::*;

    /// Helper to build zlib-compressed bytes from input data.
    fn zlib_compress(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn inflate_stops_at_stream_end() {
        let mut data = zlib_compress(b"first");
        let first_len = data.len();
        data.extend_from_slice(b"trailing bytes");

        let mut cursor = io::Cursor::new(data);
        let mut reader = ReadBoxed::new(&mut cursor);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"first");
        assert_eq!(reader.total_in() as usize, first_len);
        assert_eq!(cursor.position() as usize, first_len);
    }

    /// Corrupt deflate stream should surface as InvalidInput.
    #[test]
    fn corrupt_stream_returns_error() {
        let data = b"not a valid zlib stream";
        let mut reader = ReadBoxed::new(io::Cursor::new(data));
        let mut out = [0u8; 16];
        let err = reader.read(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn truncated_stream_is_rejected_by_inflate() {
        let compressed = zlib_compress(&[42u8; 4096]);
        let cut = &compressed[..compressed.len() / 2];
        assert!(inflate(cut, 0).is_err());
        assert_eq!(inflate(&compressed, 4096).unwrap(), vec![42u8; 4096]);
    }

    #[test]
    fn prefix_inflate_tolerates_truncation() {
        let mut body = b"blob 5000\0".to_vec();
        body.extend(std::iter::repeat_n(b'x', 5000));
        let compressed = zlib_compress(&body);
        // drop the adler32 trailer so the stream never reaches its end marker
        let peek = &compressed[..compressed.len() - 4];
        let out = inflate_prefix(peek, 32).unwrap();
        assert!(out.starts_with(b"blob 5000\0"));
        assert_eq!(out.len(), 32);
        assert!(inflate(peek, 0).is_err());
    }
}

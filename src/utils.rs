//! Shared I/O helpers: raw id reads and a reader that tracks how many bytes have been
//! pulled from an underlying stream.

use std::io::{self, Read};

use crate::hash::ObjectHash;

/// Read a raw 20-byte id.
pub fn read_sha(file: &mut impl Read) -> io::Result<ObjectHash> {
    ObjectHash::from_stream(file)
}

/// Counts bytes read from the wrapped reader, so a pack record header parser knows where
/// the compressed payload begins.
pub struct CountingReader<R> {
    pub inner: R,
    pub bytes_read: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bytes_read: 0,
        }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

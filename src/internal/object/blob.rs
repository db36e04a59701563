//! A blob holds the content of a file, verbatim and without a file name.

use std::fmt::Display;

use bytes::Bytes;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{ObjectHeader, ObjectTrait, Population, types::ObjectType},
};

#[derive(Debug)]
pub struct Blob {
    header: ObjectHeader,
    data: Population<Bytes>,
}

impl Blob {
    pub(crate) fn new(header: ObjectHeader) -> Self {
        Blob {
            header,
            data: Population::new(),
        }
    }

    /// File content, loaded on first call.
    pub fn data(&self) -> Result<Bytes, GitError> {
        let data = self.data.get_or_try_init(|| self.header.load_data())?;
        Ok(Bytes::clone(&data))
    }
}

impl Display for Blob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blob {} ({} bytes)", self.header.id, self.header.size)
    }
}

impl ObjectTrait for Blob {
    fn from_bytes(data: &[u8], hash: ObjectHash) -> Result<Self, GitError> {
        Ok(Blob {
            header: ObjectHeader::detached(hash, ObjectType::Blob, data.len()),
            data: Population::populated(Bytes::copy_from_slice(data)),
        })
    }

    fn header(&self) -> &ObjectHeader {
        &self.header
    }

    fn is_populated(&self) -> bool {
        self.data.is_populated()
    }

    fn populate(&self) -> Result<(), GitError> {
        self.data().map(|_| ())
    }
}

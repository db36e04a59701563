//! Internal building blocks (object model, pack index and records, object stores, zlib)
//! that power the repository API.

pub mod object;
pub mod pack;
pub mod storage;
pub mod zlib;

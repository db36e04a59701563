//! Git delta toolkit: applying `ofs_delta` / `ref_delta` instruction streams and the
//! varint readers shared with pack record headers.

pub mod decode;
pub mod errors;
pub mod utils;

pub use decode::{DeltaHeader, delta_decode, read_delta_header};

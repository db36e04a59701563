//! zlib helpers shared by the loose and packed stores.

pub mod stream;

//! Storage tier primitives.
//!
//! Provides:
//! - `byte_io`: blocking size/read/write and zero-copy transfer
//! - `path_store`: directory lifecycle and version discovery

mod byte_io;
mod path_store;

pub use byte_io::*;
pub use path_store::*;

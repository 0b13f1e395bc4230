//! Core on-disk format, block I/O, allocator, formatter, and reader for
//! AUFS images. The two CLI crates, `mkfs-aufs` and `aufsutil`, are thin
//! argument-parsing shells over this library.

pub mod bitmap;
pub mod block_io;
pub mod dir;
pub mod error;
pub mod file;
pub mod format;
pub mod layout;
pub mod mount;

pub use error::{AufsError, Result};

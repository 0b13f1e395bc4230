//! Error kinds shared by the formatter and the reader.

use std::io;

/// Errors produced by the on-disk format, the allocator, the formatter, and
/// the reader.
///
/// Each variant corresponds to one row of the error table in the AUFS
/// specification; callers match on it the way a kernel module would switch
/// on an `errno`.
#[derive(Debug, thiserror::Error)]
pub enum AufsError {
    /// The backing container could not be read from or written to, or a
    /// block number was out of range.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The superblock's magic number did not match `0x13131313`.
    #[error("bad magic number")]
    BadMagic,

    /// The backing device would not honor the filesystem's block size.
    #[error("device does not support block size {0}")]
    BadBlockSize(u32),

    /// An inode's mode carries an unsupported type bit, or an operation was
    /// applied to an inode of the wrong type.
    #[error("bad inode mode")]
    BadMode,

    /// `lookup` found no entry with the requested name.
    #[error("not found")]
    NotFound,

    /// The formatter could not find a large enough contiguous run of free
    /// blocks.
    #[error("no space left on device")]
    NoSpace,

    /// The formatter could not find a free inode.
    #[error("no inodes left")]
    NoInodes,

    /// Copying bytes to/from the caller-supplied buffer failed.
    #[error("fault copying to/from caller buffer")]
    Fault,

    /// An in-memory object could not be allocated.
    #[error("out of memory")]
    NoMemory,
}

pub type Result<T> = std::result::Result<T, AufsError>;

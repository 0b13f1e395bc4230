//! Block-granular access to the backing container.
//!
//! Mirrors the teacher's `disk::get_disk_size` split between regular files
//! and block devices: a plain file is sized with `metadata().len()`, while a
//! block special file needs the `BLKGETSIZE64` ioctl because its `stat`
//! size is usually zero.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::error::{AufsError, Result};

const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

/// A randomly addressable, block-granular backing store.
///
/// Implemented once for plain files/block devices in [`FileBlockDevice`];
/// the formatter and the reader are both generic over this trait so tests
/// can swap in an in-memory device without touching a real file.
pub trait BlockDevice {
    /// Size of one block, in bytes.
    fn block_size(&self) -> u32;

    /// Total number of blocks the device holds.
    fn blocks_count(&self) -> u64;

    /// Reads block `index` into `buf`, which must be exactly
    /// [`BlockDevice::block_size`] bytes long.
    fn read_block(&mut self, index: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes `buf`, which must be exactly [`BlockDevice::block_size`]
    /// bytes long, to block `index`.
    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()>;

    /// Convenience wrapper allocating a fresh buffer.
    fn read_block_vec(&mut self, index: u64) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size() as usize];
        self.read_block(index, &mut buf)?;
        Ok(buf)
    }
}

/// A [`BlockDevice`] backed by a `std::fs::File`, open on either a regular
/// file (a filesystem image) or a block special file (a raw partition).
pub struct FileBlockDevice {
    file: File,
    block_size: u32,
    blocks_count: u64,
}

impl FileBlockDevice {
    /// Opens `path` read-write and adopts `block_size` as the unit of
    /// addressing. Fails with [`AufsError::BadBlockSize`] if the underlying
    /// size is not a whole multiple of `block_size`.
    pub fn open(path: &Path, block_size: u32) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_file(file, block_size)
    }

    /// Opens `path` read-write, then restricts the addressable range to the
    /// first `blocks_count` blocks — letting `mkfs` format a prefix of a
    /// device rather than its whole size, the way `--blocks_count` is
    /// documented to behave. Fails if the device is smaller than that.
    pub fn open_sized(path: &Path, block_size: u32, blocks_count: u64) -> Result<Self> {
        let mut dev = Self::open(path, block_size)?;
        if blocks_count > dev.blocks_count {
            return Err(AufsError::NoSpace);
        }
        dev.blocks_count = blocks_count;
        Ok(dev)
    }

    /// Opens `path` read-only.
    pub fn open_read_only(path: &Path, block_size: u32) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path)?;
        Self::from_file(file, block_size)
    }

    /// Creates (or truncates) `path` to exactly `total_size` bytes and opens
    /// it for block I/O, the way `mkfs.img` sizes a fresh image file before
    /// formatting it.
    pub fn create(path: &Path, block_size: u32, total_size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total_size)?;
        Self::from_file(file, block_size)
    }

    fn from_file(file: File, block_size: u32) -> Result<Self> {
        let size = device_size(&file)?;
        if block_size == 0 || size % block_size as u64 != 0 {
            return Err(AufsError::BadBlockSize(block_size));
        }
        Ok(Self {
            file,
            block_size,
            blocks_count: size / block_size as u64,
        })
    }
}

impl BlockDevice for FileBlockDevice {
    fn block_size(&self) -> u32 {
        self.block_size
    }

    fn blocks_count(&self) -> u64 {
        self.blocks_count
    }

    fn read_block(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        if buf.len() != self.block_size as usize || index >= self.blocks_count {
            return Err(AufsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "block index or buffer size out of range",
            )));
        }
        self.file
            .seek(SeekFrom::Start(index * self.block_size as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        if buf.len() != self.block_size as usize || index >= self.blocks_count {
            return Err(AufsError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "block index or buffer size out of range",
            )));
        }
        self.file
            .seek(SeekFrom::Start(index * self.block_size as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }
}

/// Byte size of the container backing `file`: `metadata().len()` for a
/// regular file, `BLKGETSIZE64` for a block device.
fn device_size(file: &File) -> Result<u64> {
    let meta = file.metadata()?;
    if meta.file_type().is_block_device() {
        let mut size: u64 = 0;
        let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size as *mut u64) };
        if rc != 0 {
            return Err(AufsError::Io(std::io::Error::last_os_error()));
        }
        Ok(size)
    } else {
        Ok(meta.len())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn create_sizes_and_zero_fills_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        let dev = FileBlockDevice::create(&path, 512, 512 * 16).unwrap();
        assert_eq!(dev.block_size(), 512);
        assert_eq!(dev.blocks_count(), 16);
    }

    #[test]
    fn write_then_read_block_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        let mut dev = FileBlockDevice::create(&path, 512, 512 * 4).unwrap();
        let mut data = vec![0u8; 512];
        data[0] = 0xAB;
        data[511] = 0xCD;
        dev.write_block(2, &data).unwrap();
        let back = dev.read_block_vec(2).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn rejects_out_of_range_block() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        let mut dev = FileBlockDevice::create(&path, 512, 512 * 4).unwrap();
        let buf = vec![0u8; 512];
        assert!(dev.write_block(4, &buf).is_err());
    }

    #[test]
    fn rejects_size_not_a_multiple_of_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        {
            let mut f = File::create(&path).unwrap();
            f.write_all(&[0u8; 700]).unwrap();
        }
        assert!(FileBlockDevice::open(&path, 512).is_err());
    }
}

//! Superblock validation and inode lookup: the entry point the reader side
//! uses before it can do anything else.

use crate::block_io::BlockDevice;
use crate::error::{AufsError, Result};
use crate::layout::{InodeRecord, SuperBlock, INODE_RECORD_SIZE, SUPERBLOCK_BLOCK};

/// A validated, read-only handle on an AUFS image.
///
/// Built once via [`Mount::open`], which is the only place the magic number
/// is checked; every other operation trusts the superblock it cached.
pub struct Mount<D: BlockDevice> {
    device: D,
    sb: SuperBlock,
}

impl<D: BlockDevice> Mount<D> {
    /// Reads and validates the superblock, rejecting a bad magic number or a
    /// block size the device cannot actually supply.
    pub fn open(mut device: D) -> Result<Self> {
        let raw = device.read_block_vec(SUPERBLOCK_BLOCK)?;
        let sb = SuperBlock::from_bytes(&raw)?;
        if sb.magic != crate::layout::MAGIC {
            return Err(AufsError::BadMagic);
        }
        if sb.block_size != device.block_size() {
            return Err(AufsError::BadBlockSize(sb.block_size));
        }
        Ok(Self { device, sb })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Fetches the inode record for `ino`.
    ///
    /// `NotFound` covers both an out-of-range inode number and, unlike a
    /// real mounted filesystem, a structurally unused inode: this crate
    /// reads images that were always formatted by its own formatter, so
    /// there is no separate `is_allocated` check to make.
    pub fn inode_get(&mut self, ino: u32) -> Result<InodeRecord> {
        if ino == 0 || ino >= self.sb.inodes_count {
            return Err(AufsError::NotFound);
        }
        let (block, slot) = self.sb.inode_location(ino);
        let buf = self.device.read_block_vec(block)?;
        let offset = slot as usize * INODE_RECORD_SIZE as usize;
        Ok(InodeRecord::from_bytes(
            &buf[offset..offset + INODE_RECORD_SIZE as usize],
        ))
    }

    /// Fetches the root directory's inode record.
    pub fn root_inode(&mut self) -> Result<InodeRecord> {
        let root_ino = self.sb.root_ino;
        self.inode_get(root_ino)
    }
}

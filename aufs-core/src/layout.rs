//! The byte-exact on-disk layout: superblock, inode records, and directory
//! entries.
//!
//! All multi-byte integers are big-endian on disk regardless of host
//! endianness, so every record here is encoded/decoded field by field with
//! `to_be_bytes`/`from_be_bytes` rather than reinterpreted in place the way
//! the teacher's `#[repr(C, packed)]` ext2 structures are — those are native
//! ("disk == host") endian, these are not.

use crate::error::{AufsError, Result};

/// Constant superblock magic number.
pub const MAGIC: u32 = 0x1313_1313;

/// Block index of the superblock.
pub const SUPERBLOCK_BLOCK: u64 = 0;
/// Block index of the block-usage bitmap.
pub const BLOCK_BITMAP_BLOCK: u64 = 1;
/// Block index of the inode-usage bitmap.
pub const INODE_BITMAP_BLOCK: u64 = 2;
/// Block index of the first inode-table block.
pub const INODE_TABLE_START_BLOCK: u64 = 3;

/// Size in bytes of one on-disk inode record.
pub const INODE_RECORD_SIZE: u32 = 32;
/// Size in bytes of one on-disk directory entry.
pub const DIR_ENTRY_SIZE: u32 = 32;
/// Size in bytes of the name field of a directory entry.
pub const DIR_NAME_FIELD_LEN: usize = 28;
/// Longest name (in bytes, excluding the terminating NUL) storable without
/// truncation.
pub const DIR_NAME_MAX_LEN: usize = DIR_NAME_FIELD_LEN - 1;

/// `S_IFDIR`: directory file-type bit.
pub const S_IFDIR: u32 = 0o040000;
/// `S_IFREG`: regular-file file-type bit.
pub const S_IFREG: u32 = 0o100000;
/// Mask isolating the file-type bits of a mode.
pub const S_IFMT: u32 = 0o170000;

/// Significant byte length of the superblock; the rest of block 0 is zero
/// padding.
const SUPERBLOCK_LEN: usize = 24;

/// Number of inodes packed into one inode-table block of size `block_size`.
pub fn inodes_per_block(block_size: u32) -> u32 {
    block_size / INODE_RECORD_SIZE
}

/// Number of directory entries packed into one data block of size
/// `block_size`.
pub fn entries_per_block(block_size: u32) -> u32 {
    block_size / DIR_ENTRY_SIZE
}

/// Ceiling division, used throughout for "how many blocks does N bytes/
/// entries need".
pub fn ceil_div(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

/// The decoded contents of block 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    pub magic: u32,
    pub block_size: u32,
    pub blocks_count: u32,
    pub inodes_count: u32,
    pub start: u32,
    pub root_ino: u32,
}

impl SuperBlock {
    /// Encodes the superblock into a buffer of exactly `block_size` bytes,
    /// zeroing the padding past the 24 significant bytes.
    pub fn to_bytes(&self, block_size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; block_size];
        buf[0..4].copy_from_slice(&self.magic.to_be_bytes());
        buf[4..8].copy_from_slice(&self.block_size.to_be_bytes());
        buf[8..12].copy_from_slice(&self.blocks_count.to_be_bytes());
        buf[12..16].copy_from_slice(&self.inodes_count.to_be_bytes());
        buf[16..20].copy_from_slice(&self.start.to_be_bytes());
        buf[20..24].copy_from_slice(&self.root_ino.to_be_bytes());
        buf
    }

    /// Decodes a superblock from the first 24 bytes of `buf`. Does not
    /// validate the magic number — that is a mount-time policy decision
    /// (spec §4.5), not a layout concern.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < SUPERBLOCK_LEN {
            return Err(AufsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "superblock buffer too small",
            )));
        }
        let u32_at = |off: usize| u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        Ok(Self {
            magic: u32_at(0),
            block_size: u32_at(4),
            blocks_count: u32_at(8),
            inodes_count: u32_at(12),
            start: u32_at(16),
            root_ino: u32_at(20),
        })
    }

    /// Number of inode records packed per inode-table block.
    pub fn inodes_per_block(&self) -> u32 {
        inodes_per_block(self.block_size)
    }

    /// Number of directory entries packed per data block.
    pub fn entries_per_block(&self) -> u32 {
        entries_per_block(self.block_size)
    }

    /// The block index and in-block slot for inode number `ino`.
    pub fn inode_location(&self, ino: u32) -> (u64, u32) {
        let k = self.inodes_per_block();
        (INODE_TABLE_START_BLOCK + (ino / k) as u64, ino % k)
    }
}

/// A fixed 32-byte on-disk inode record (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeRecord {
    pub block: u32,
    pub blocks: u32,
    pub length: u32,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub ctime: u64,
}

impl InodeRecord {
    /// An all-zero, unused record.
    pub const ZERO: InodeRecord = InodeRecord {
        block: 0,
        blocks: 0,
        length: 0,
        uid: 0,
        gid: 0,
        mode: 0,
        ctime: 0,
    };

    pub fn to_bytes(&self) -> [u8; INODE_RECORD_SIZE as usize] {
        let mut buf = [0u8; INODE_RECORD_SIZE as usize];
        buf[0..4].copy_from_slice(&self.block.to_be_bytes());
        buf[4..8].copy_from_slice(&self.blocks.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf[12..16].copy_from_slice(&self.uid.to_be_bytes());
        buf[16..20].copy_from_slice(&self.gid.to_be_bytes());
        buf[20..24].copy_from_slice(&self.mode.to_be_bytes());
        buf[24..32].copy_from_slice(&self.ctime.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let u32_at = |off: usize| u32::from_be_bytes(buf[off..off + 4].try_into().unwrap());
        Self {
            block: u32_at(0),
            blocks: u32_at(4),
            length: u32_at(8),
            uid: u32_at(12),
            gid: u32_at(16),
            mode: u32_at(20),
            ctime: u64::from_be_bytes(buf[24..32].try_into().unwrap()),
        }
    }

    /// The file-type bits of `mode`.
    pub fn file_type(&self) -> u32 {
        self.mode & S_IFMT
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == S_IFDIR
    }

    pub fn is_reg(&self) -> bool {
        self.file_type() == S_IFREG
    }
}

/// A fixed 32-byte on-disk directory entry (spec §3, §6).
#[derive(Debug, Clone)]
pub struct DirEntryRecord {
    pub name: Vec<u8>,
    pub ino: u32,
}

impl DirEntryRecord {
    /// Builds an entry, truncating `name` to [`DIR_NAME_MAX_LEN`] bytes if
    /// needed (spec §4.4: "Names are truncated to 27 bytes plus a
    /// terminating NUL if longer").
    pub fn new(name: &[u8], ino: u32) -> Self {
        let len = name.len().min(DIR_NAME_MAX_LEN);
        Self {
            name: name[..len].to_vec(),
            ino,
        }
    }

    pub fn to_bytes(&self) -> [u8; DIR_ENTRY_SIZE as usize] {
        let mut buf = [0u8; DIR_ENTRY_SIZE as usize];
        let len = self.name.len().min(DIR_NAME_FIELD_LEN);
        buf[0..len].copy_from_slice(&self.name[..len]);
        buf[DIR_NAME_FIELD_LEN..DIR_NAME_FIELD_LEN + 4].copy_from_slice(&self.ino.to_be_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Self {
        let raw = &buf[0..DIR_NAME_FIELD_LEN];
        let len = raw.iter().position(|&b| b == 0).unwrap_or(DIR_NAME_FIELD_LEN);
        let ino = u32::from_be_bytes(
            buf[DIR_NAME_FIELD_LEN..DIR_NAME_FIELD_LEN + 4]
                .try_into()
                .unwrap(),
        );
        Self {
            name: raw[..len].to_vec(),
            ino,
        }
    }

    /// Compares the stored name against `query`, the way spec §4.6 defines
    /// `lookup`'s match rule: a byte-for-byte match over
    /// `min(|query|, 28)` bytes where the stored byte at `|query|` is NUL or
    /// the index is past the field.
    pub fn name_matches(&self, query: &[u8]) -> bool {
        self.name == query
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn superblock_roundtrip() {
        let sb = SuperBlock {
            magic: MAGIC,
            block_size: 4096,
            blocks_count: 1024,
            inodes_count: 128,
            start: 35,
            root_ino: 1,
        };
        let bytes = sb.to_bytes(4096);
        assert_eq!(bytes.len(), 4096);
        assert!(bytes[24..].iter().all(|&b| b == 0));
        let decoded = SuperBlock::from_bytes(&bytes).unwrap();
        assert_eq!(sb, decoded);
    }

    #[test]
    fn superblock_fields_are_big_endian() {
        let sb = SuperBlock {
            magic: MAGIC,
            block_size: 4096,
            blocks_count: 1,
            inodes_count: 1,
            start: 1,
            root_ino: 1,
        };
        let bytes = sb.to_bytes(4096);
        assert_eq!(&bytes[0..4], &MAGIC.to_be_bytes());
        assert_ne!(&bytes[0..4], &MAGIC.to_le_bytes());
    }

    #[test]
    fn inode_record_roundtrip() {
        let rec = InodeRecord {
            block: 42,
            blocks: 3,
            length: 5000,
            uid: 1000,
            gid: 1000,
            mode: S_IFREG | 0o644,
            ctime: 1_700_000_000,
        };
        let bytes = rec.to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(InodeRecord::from_bytes(&bytes), rec);
        assert!(InodeRecord::from_bytes(&bytes).is_reg());
    }

    #[test]
    fn dir_entry_short_name_is_nul_padded() {
        let e = DirEntryRecord::new(b"a", 7);
        let bytes = e.to_bytes();
        assert_eq!(bytes[0], b'a');
        assert!(bytes[1..DIR_NAME_FIELD_LEN].iter().all(|&b| b == 0));
        assert_eq!(&bytes[DIR_NAME_FIELD_LEN..], &7u32.to_be_bytes());
    }

    #[test]
    fn dir_entry_long_name_is_truncated_to_27_plus_nul() {
        let long_name: Vec<u8> = (0..40).map(|i| b'a' + (i % 26)).collect();
        let e = DirEntryRecord::new(&long_name, 9);
        assert_eq!(e.name.len(), DIR_NAME_MAX_LEN);
        let bytes = e.to_bytes();
        let decoded = DirEntryRecord::from_bytes(&bytes);
        assert_eq!(decoded.name, long_name[..DIR_NAME_MAX_LEN]);
    }

    #[test]
    fn inode_location_matches_spec_formula() {
        let sb = SuperBlock {
            magic: MAGIC,
            block_size: 4096,
            blocks_count: 1024,
            inodes_count: 128,
            start: 35,
            root_ino: 1,
        };
        let k = sb.inodes_per_block();
        assert_eq!(k, 128);
        assert_eq!(sb.inode_location(0), (3, 0));
        assert_eq!(sb.inode_location(127), (3, 127));
        assert_eq!(sb.inode_location(128), (4, 0));
    }
}

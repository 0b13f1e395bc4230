//! The formatter: builds an in-memory tree of files and directories, then
//! serializes it to a [`BlockDevice`] in one pass.
//!
//! Named after, and shaped like, the `Formatter` class this crate's
//! on-disk format is modeled on: callers build a tree with `mkfile`/`mkdir`/
//! `add_child`/`write`, then call `format()` once to lay it out on disk.
//! Every file and every directory occupies a single contiguous extent, so
//! the whole tree's size has to be known before any block is allocated —
//! that's why this is a two-phase build-then-format API rather than a
//! streaming one.

use crate::bitmap;
use crate::block_io::BlockDevice;
use crate::error::{AufsError, Result};
use crate::layout::{
    ceil_div, entries_per_block, inodes_per_block, DirEntryRecord, InodeRecord, SuperBlock,
    BLOCK_BITMAP_BLOCK, DIR_ENTRY_SIZE, INODE_BITMAP_BLOCK, INODE_RECORD_SIZE,
    INODE_TABLE_START_BLOCK, MAGIC, S_IFDIR, S_IFREG, SUPERBLOCK_BLOCK,
};

/// Root inode number; inode 0 is never assigned, the way block 0 (the
/// superblock) is never a data block.
pub const ROOT_INO: u32 = 1;

enum Kind {
    Dir(Vec<Entry>),
    File(Vec<u8>),
}

/// One node of the tree a formatter run will lay out on disk.
pub struct Entry {
    name: String,
    uid: u32,
    gid: u32,
    mode: u32,
    ctime: u64,
    kind: Kind,
}

impl Entry {
    /// Builds the root directory entry. Its name is never written to disk.
    pub fn root(uid: u32, gid: u32, mode: u32, ctime: u64) -> Self {
        Entry {
            name: String::new(),
            uid,
            gid,
            mode: (mode & !crate::layout::S_IFMT) | S_IFDIR,
            ctime,
            kind: Kind::Dir(Vec::new()),
        }
    }

    fn new_dir(name: &str, uid: u32, gid: u32, mode: u32, ctime: u64) -> Self {
        Entry {
            name: name.to_string(),
            uid,
            gid,
            mode: (mode & !crate::layout::S_IFMT) | S_IFDIR,
            ctime,
            kind: Kind::Dir(Vec::new()),
        }
    }

    fn new_file(name: &str, uid: u32, gid: u32, mode: u32, ctime: u64) -> Self {
        Entry {
            name: name.to_string(),
            uid,
            gid,
            mode: (mode & !crate::layout::S_IFMT) | S_IFREG,
            ctime,
            kind: Kind::File(Vec::new()),
        }
    }

    /// Appends bytes to a file entry's contents. Fails with
    /// [`AufsError::BadMode`] if called on a directory.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        match &mut self.kind {
            Kind::File(buf) => {
                buf.extend_from_slice(data);
                Ok(())
            }
            Kind::Dir(_) => Err(AufsError::BadMode),
        }
    }

    /// Attaches `child` under this entry, which must be a directory.
    pub fn add_child(&mut self, child: Entry) -> Result<&mut Entry> {
        match &mut self.kind {
            Kind::Dir(children) => {
                children.push(child);
                Ok(children.last_mut().unwrap())
            }
            Kind::File(_) => Err(AufsError::BadMode),
        }
    }

    /// Creates and attaches an empty subdirectory, returning a handle to it
    /// for further `mkdir`/`mkfile`/`write` calls.
    pub fn mkdir(&mut self, name: &str, uid: u32, gid: u32, mode: u32, ctime: u64) -> Result<&mut Entry> {
        self.add_child(Entry::new_dir(name, uid, gid, mode, ctime))
    }

    /// Creates and attaches an empty regular file, returning a handle so its
    /// contents can be filled in with [`Entry::write`].
    pub fn mkfile(&mut self, name: &str, uid: u32, gid: u32, mode: u32, ctime: u64) -> Result<&mut Entry> {
        self.add_child(Entry::new_file(name, uid, gid, mode, ctime))
    }
}

struct Allocated {
    ino: u32,
    block: u32,
    blocks: u32,
    length: u32,
    uid: u32,
    gid: u32,
    mode: u32,
    ctime: u64,
    /// Directory-only: `(name, child ino)` pairs in creation order.
    children: Option<Vec<(String, u32)>>,
    /// File-only: raw contents to copy out during the write pass.
    data: Option<Vec<u8>>,
}

/// The formatter's default inode budget for a device of `blocks_count`
/// blocks of `block_size` bytes each: `((N-3)/(K-1) - 1) * K`, where `K` is
/// the number of inode records that fit in one block. Scales the inode
/// table to roughly one inode per data block, the way a fresh ext2
/// filesystem picks an inodes-per-group ratio without the caller having to
/// compute one by hand.
pub fn default_inodes_count(blocks_count: u64, block_size: u32) -> u32 {
    let k = inodes_per_block(block_size) as u64;
    if k <= 1 {
        return 0;
    }
    let ratio = blocks_count.saturating_sub(3) / (k - 1);
    (ratio.saturating_sub(1) * k) as u32
}

/// Formats `device` from the tree rooted at `root`.
///
/// `device` must already be sized to its final `blocks_count` (see
/// [`crate::block_io::FileBlockDevice::create`]); this function only
/// allocates `inodes_count` inodes and whatever blocks the tree needs out of
/// the space already there.
pub fn format<D: BlockDevice>(device: &mut D, root: Entry, inodes_count: u32) -> Result<()> {
    let block_size = device.block_size();
    let blocks_count = device.blocks_count();

    if (block_size as u64) * 8 < blocks_count {
        return Err(AufsError::NoSpace);
    }
    let inode_table_blocks = ceil_div(inodes_count as u64, inodes_per_block(block_size) as u64);
    if (block_size as u64) * 8 < inodes_count as u64 {
        return Err(AufsError::NoInodes);
    }
    let start = INODE_TABLE_START_BLOCK + inode_table_blocks;
    if start > blocks_count {
        return Err(AufsError::NoSpace);
    }

    let mut block_bitmap = vec![0u8; block_size as usize];
    let mut inode_bitmap = vec![0u8; block_size as usize];
    bitmap::set_bits(&mut block_bitmap, 0, start);

    let mut inode_table = vec![vec![0u8; block_size as usize]; inode_table_blocks as usize];
    let mut next_ino = ROOT_INO;
    let mut allocated = Vec::new();

    assign(
        root,
        block_size,
        blocks_count,
        &mut block_bitmap,
        &mut next_ino,
        inodes_count,
        &mut allocated,
    )?;

    let sb = SuperBlock {
        magic: MAGIC,
        block_size,
        blocks_count: blocks_count as u32,
        inodes_count,
        start: start as u32,
        root_ino: ROOT_INO,
    };

    // Inode 0 is never assigned to an entry; mark it reserved explicitly
    // rather than leaving it clear-and-unallocatable by implication.
    bitmap::set_bits(&mut inode_bitmap, 0, 1);

    for a in &allocated {
        bitmap::set_bits(&mut inode_bitmap, a.ino as u64, 1);
        let (table_block, slot) = sb.inode_location(a.ino);
        let rec = InodeRecord {
            block: a.block,
            blocks: a.blocks,
            length: a.length,
            uid: a.uid,
            gid: a.gid,
            mode: a.mode,
            ctime: a.ctime,
        };
        let table_idx = (table_block - INODE_TABLE_START_BLOCK) as usize;
        let offset = slot as usize * INODE_RECORD_SIZE as usize;
        inode_table[table_idx][offset..offset + INODE_RECORD_SIZE as usize]
            .copy_from_slice(&rec.to_bytes());

        if a.blocks == 0 {
            continue;
        }
        if let Some(children) = &a.children {
            write_directory_contents(device, block_size, a.block, a.blocks, children)?;
        } else if let Some(data) = &a.data {
            write_file_contents(device, block_size, a.block, a.blocks, data)?;
        }
    }

    // Bits beyond the configured block/inode counts address nothing; mark
    // that whole tail range used so it reads as "unavailable", not "free".
    let bits_per_bitmap = block_size as u64 * 8;
    if bits_per_bitmap > blocks_count {
        bitmap::set_bits(&mut block_bitmap, blocks_count, bits_per_bitmap - blocks_count);
    }
    if bits_per_bitmap > inodes_count as u64 {
        bitmap::set_bits(
            &mut inode_bitmap,
            inodes_count as u64,
            bits_per_bitmap - inodes_count as u64,
        );
    }

    device.write_block(SUPERBLOCK_BLOCK, &sb.to_bytes(block_size as usize))?;
    device.write_block(BLOCK_BITMAP_BLOCK, &block_bitmap)?;
    device.write_block(INODE_BITMAP_BLOCK, &inode_bitmap)?;
    for (i, block) in inode_table.into_iter().enumerate() {
        device.write_block(INODE_TABLE_START_BLOCK + i as u64, &block)?;
    }

    Ok(())
}

/// Depth-first: assigns inode numbers, allocates each entry's extent, and
/// recurses into subdirectories before appending to `out` so a directory's
/// children all have inode numbers by the time its own record is built.
fn assign(
    entry: Entry,
    block_size: u32,
    blocks_count: u64,
    block_bitmap: &mut [u8],
    next_ino: &mut u32,
    inodes_count: u32,
    out: &mut Vec<Allocated>,
) -> Result<u32> {
    let ino = *next_ino;
    if ino >= inodes_count {
        return Err(AufsError::NoInodes);
    }
    *next_ino += 1;

    match entry.kind {
        Kind::File(data) => {
            let blocks = ceil_div(data.len() as u64, block_size as u64) as u32;
            let block = if blocks == 0 {
                0
            } else {
                let start = bitmap::find_clear_run(block_bitmap, blocks_count, blocks as u64)
                    .ok_or(AufsError::NoSpace)?;
                bitmap::set_bits(block_bitmap, start, blocks as u64);
                start as u32
            };
            out.push(Allocated {
                ino,
                block,
                blocks,
                length: data.len() as u32,
                uid: entry.uid,
                gid: entry.gid,
                mode: entry.mode,
                ctime: entry.ctime,
                children: None,
                data: Some(data),
            });
            Ok(ino)
        }
        Kind::Dir(children) => {
            let mut named_children = Vec::with_capacity(children.len());
            for child in children {
                let name = child_name(&child);
                let child_ino = assign(
                    child,
                    block_size,
                    blocks_count,
                    block_bitmap,
                    next_ino,
                    inodes_count,
                    out,
                )?;
                named_children.push((name, child_ino));
            }

            let length = named_children.len() as u64 * DIR_ENTRY_SIZE as u64;
            let blocks = ceil_div(length, block_size as u64) as u32;
            let block = if blocks == 0 {
                0
            } else {
                let start = bitmap::find_clear_run(block_bitmap, blocks_count, blocks as u64)
                    .ok_or(AufsError::NoSpace)?;
                bitmap::set_bits(block_bitmap, start, blocks as u64);
                start as u32
            };
            out.push(Allocated {
                ino,
                block,
                blocks,
                length: length as u32,
                uid: entry.uid,
                gid: entry.gid,
                mode: entry.mode,
                ctime: entry.ctime,
                children: Some(named_children),
                data: None,
            });
            Ok(ino)
        }
    }
}

fn child_name(entry: &Entry) -> String {
    entry.name.clone()
}

fn write_directory_contents<D: BlockDevice>(
    device: &mut D,
    block_size: u32,
    block: u32,
    blocks: u32,
    children: &[(String, u32)],
) -> Result<()> {
    let per_block = entries_per_block(block_size) as usize;
    for (i, chunk) in children.chunks(per_block).enumerate() {
        let mut buf = vec![0u8; block_size as usize];
        for (slot, (name, ino)) in chunk.iter().enumerate() {
            let rec = DirEntryRecord::new(name.as_bytes(), *ino);
            let offset = slot * DIR_ENTRY_SIZE as usize;
            buf[offset..offset + DIR_ENTRY_SIZE as usize].copy_from_slice(&rec.to_bytes());
        }
        device.write_block(block as u64 + i as u64, &buf)?;
    }
    let written_blocks = ceil_div(children.len() as u64, per_block as u64);
    for i in written_blocks..blocks as u64 {
        device.write_block(block as u64 + i, &vec![0u8; block_size as usize])?;
    }
    Ok(())
}

fn write_file_contents<D: BlockDevice>(
    device: &mut D,
    block_size: u32,
    block: u32,
    blocks: u32,
    data: &[u8],
) -> Result<()> {
    for i in 0..blocks as u64 {
        let start = i as usize * block_size as usize;
        let end = (start + block_size as usize).min(data.len());
        let mut buf = vec![0u8; block_size as usize];
        if start < data.len() {
            buf[..end - start].copy_from_slice(&data[start..end]);
        }
        device.write_block(block as u64 + i, &buf)?;
    }
    Ok(())
}

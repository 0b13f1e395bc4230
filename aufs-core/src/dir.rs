//! Directory operations: `lookup` and `iterate` over a directory's single
//! extent.
//!
//! Both reject a non-directory inode up front with [`AufsError::BadMode`]
//! instead of falling through to default/zero behavior — the source this
//! format is modeled on let directory operations run against regular-file
//! inodes, which is the kind of bug this crate does not reproduce.

use crate::block_io::BlockDevice;
use crate::error::{AufsError, Result};
use crate::layout::{DirEntryRecord, InodeRecord, DIR_ENTRY_SIZE};
use crate::mount::Mount;

/// Total number of directory entries stored in `inode`'s extent.
///
/// Entry count is `length / DIR_ENTRY_SIZE`, not `length` itself — treating
/// the byte length as an entry count was the other bug this format's
/// ancestor had, and would make `iterate` read far past the extent on any
/// directory bigger than a handful of bytes.
fn entry_count(inode: &InodeRecord) -> u32 {
    inode.length / DIR_ENTRY_SIZE
}

/// Walks `inode`'s entries starting at entry index `cursor`, calling `emit`
/// once per entry in on-disk order.
///
/// `emit` returns `true` to keep going or `false` to stop early. Either way,
/// `iterate` returns the index one past the last entry it emitted — `cursor`
/// unchanged if there was nothing left to read, or a value a caller can pass
/// back in as the next `cursor` to resume a partial listing.
///
/// A single block is read at a time, in entry order, so a caller can stop
/// after the first few entries of a huge directory without this function
/// ever reading the rest of it.
pub fn iterate<D: BlockDevice>(
    mount: &mut Mount<D>,
    inode: &InodeRecord,
    cursor: u64,
    mut emit: impl FnMut(&[u8], u32) -> bool,
) -> Result<u64> {
    if !inode.is_dir() {
        return Err(AufsError::BadMode);
    }
    let total_entries = entry_count(inode) as u64;
    if cursor >= total_entries {
        return Ok(cursor);
    }

    let block_size = mount.superblock().block_size;
    let per_block = (block_size / DIR_ENTRY_SIZE) as u64;
    let mut idx = cursor;
    while idx < total_entries {
        let block_idx = idx / per_block;
        let buf = mount
            .device_mut()
            .read_block_vec(inode.block as u64 + block_idx)?;
        let block_end = ((block_idx + 1) * per_block).min(total_entries);
        while idx < block_end {
            let slot = (idx % per_block) as usize;
            let offset = slot * DIR_ENTRY_SIZE as usize;
            let rec = DirEntryRecord::from_bytes(&buf[offset..offset + DIR_ENTRY_SIZE as usize]);
            idx += 1;
            if !emit(&rec.name, rec.ino) {
                return Ok(idx);
            }
        }
    }
    Ok(idx)
}

/// Collects every entry of `inode`'s extent into a `Vec`, for callers that
/// don't need partial iteration.
pub fn list<D: BlockDevice>(mount: &mut Mount<D>, inode: &InodeRecord) -> Result<Vec<(Vec<u8>, u32)>> {
    let mut out = Vec::new();
    iterate(mount, inode, 0, |name, ino| {
        out.push((name.to_vec(), ino));
        true
    })?;
    Ok(out)
}

/// Finds the inode number of the entry named `name` within `inode`.
///
/// The empty name and any name longer than
/// [`crate::layout::DIR_NAME_MAX_LEN`] bytes can never match a stored entry
/// and are rejected with [`AufsError::NotFound`] immediately, without
/// reading any block.
pub fn lookup<D: BlockDevice>(
    mount: &mut Mount<D>,
    inode: &InodeRecord,
    name: &[u8],
) -> Result<u32> {
    if !inode.is_dir() {
        return Err(AufsError::BadMode);
    }
    if name.is_empty() || name.len() > crate::layout::DIR_NAME_MAX_LEN {
        return Err(AufsError::NotFound);
    }
    let mut found = None;
    iterate(mount, inode, 0, |entry_name, ino| {
        if entry_name == name {
            found = Some(ino);
            false
        } else {
            true
        }
    })?;
    found.ok_or(AufsError::NotFound)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_io::FileBlockDevice;
    use crate::format::{format, Entry};
    use crate::mount::Mount;

    fn sample_image() -> FileBlockDevice {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        let mut device = FileBlockDevice::create(&path, 512, 512 * 64).unwrap();
        let mut root = Entry::root(0, 0, 0o755, 0);
        root.mkfile("a.txt", 0, 0, 0o644, 0).unwrap();
        root.mkdir("sub", 0, 0, 0o755, 0).unwrap();
        format(&mut device, root, 16).unwrap();
        // leak the tempdir so the file stays alive for the device's lifetime
        std::mem::forget(dir);
        device
    }

    #[test]
    fn lookup_finds_existing_entries() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        let ino = lookup(&mut mount, &root, b"a.txt").unwrap();
        let inode = mount.inode_get(ino).unwrap();
        assert!(inode.is_reg());
    }

    #[test]
    fn lookup_missing_name_is_not_found() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        assert!(matches!(
            lookup(&mut mount, &root, b"missing"),
            Err(AufsError::NotFound)
        ));
    }

    #[test]
    fn lookup_empty_name_is_not_found_without_reading() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        assert!(matches!(
            lookup(&mut mount, &root, b""),
            Err(AufsError::NotFound)
        ));
    }

    #[test]
    fn lookup_on_regular_file_is_bad_mode() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        let ino = lookup(&mut mount, &root, b"a.txt").unwrap();
        let file_inode = mount.inode_get(ino).unwrap();
        assert!(matches!(
            lookup(&mut mount, &file_inode, b"anything"),
            Err(AufsError::BadMode)
        ));
    }

    #[test]
    fn list_returns_both_entries() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        let mut names: Vec<Vec<u8>> = list(&mut mount, &root)
            .unwrap()
            .into_iter()
            .map(|(n, _)| n)
            .collect();
        names.sort();
        assert_eq!(names, vec![b"a.txt".to_vec(), b"sub".to_vec()]);
    }

    #[test]
    fn iterate_stops_early_when_emit_returns_false() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        let mut seen = Vec::new();
        let next_cursor = iterate(&mut mount, &root, 0, |name, ino| {
            seen.push((name.to_vec(), ino));
            false
        })
        .unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(next_cursor, 1);
    }

    #[test]
    fn iterate_resumes_from_a_returned_cursor() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();

        let mut first = Vec::new();
        let cursor = iterate(&mut mount, &root, 0, |name, ino| {
            first.push((name.to_vec(), ino));
            false
        })
        .unwrap();

        let mut rest = Vec::new();
        let end_cursor = iterate(&mut mount, &root, cursor, |name, ino| {
            rest.push((name.to_vec(), ino));
            true
        })
        .unwrap();

        let mut all: Vec<Vec<u8>> = first
            .into_iter()
            .chain(rest)
            .map(|(n, _)| n)
            .collect();
        all.sort();
        assert_eq!(all, vec![b"a.txt".to_vec(), b"sub".to_vec()]);
        assert_eq!(end_cursor, 2);
    }

    #[test]
    fn iterate_past_the_end_is_a_no_op() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        let cursor = iterate(&mut mount, &root, 100, |_, _| true).unwrap();
        assert_eq!(cursor, 100);
    }

    #[test]
    fn lookup_name_over_limit_is_not_found_without_reading() {
        let mut mount = Mount::open(sample_image()).unwrap();
        let root = mount.root_inode().unwrap();
        let long = vec![b'x'; 100];
        assert!(matches!(
            lookup(&mut mount, &root, &long),
            Err(AufsError::NotFound)
        ));
    }
}

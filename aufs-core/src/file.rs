//! Regular-file reads over a single extent.

use crate::block_io::BlockDevice;
use crate::error::{AufsError, Result};
use crate::layout::InodeRecord;
use crate::mount::Mount;

/// Copies bytes starting at `offset` into `buf`, never crossing a block
/// boundary: the amount actually copied is
/// `min(buf.len(), remaining in file, remaining in current block)`.
///
/// Returns `Ok(0)` once `offset >= inode.length` — a read entirely past
/// EOF is not an error. A read that starts before EOF but would run past it,
/// or past the end of the block it starts in, is silently short: the
/// return value tells the caller how much it got, the way `std::io::Read`
/// does. Callers that want the whole file call this in a loop, advancing
/// `offset` by the returned count each time.
///
/// Rejects a non-regular-file inode with [`AufsError::BadMode`] before
/// touching any block.
pub fn read<D: BlockDevice>(
    mount: &mut Mount<D>,
    inode: &InodeRecord,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize> {
    if !inode.is_reg() {
        return Err(AufsError::BadMode);
    }
    let length = inode.length as u64;
    if offset >= length {
        return Ok(0);
    }
    let block_size = mount.superblock().block_size as u64;
    let block_idx = offset / block_size;
    let block_off = (offset % block_size) as usize;
    let remaining_in_file = length - offset;
    let remaining_in_block = block_size - block_off as u64;
    let to_read = (buf.len() as u64)
        .min(remaining_in_file)
        .min(remaining_in_block) as usize;

    let block_data = mount
        .device_mut()
        .read_block_vec(inode.block as u64 + block_idx)?;
    buf[..to_read].copy_from_slice(&block_data[block_off..block_off + to_read]);
    Ok(to_read)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::block_io::FileBlockDevice;
    use crate::format::{format, Entry};
    use crate::mount::Mount;

    fn sample_image(contents: &[u8]) -> FileBlockDevice {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image");
        let mut device = FileBlockDevice::create(&path, 128, 128 * 64).unwrap();
        let mut root = Entry::root(0, 0, 0o755, 0);
        root.mkfile("a.txt", 0, 0, 0o644, 0)
            .unwrap()
            .write(contents)
            .unwrap();
        format(&mut device, root, 16).unwrap();
        std::mem::forget(dir);
        device
    }

    #[test]
    fn reads_whole_small_file() {
        let mut mount = Mount::open(sample_image(b"hello, world")).unwrap();
        let root = mount.root_inode().unwrap();
        let ino = crate::dir::lookup(&mut mount, &root, b"a.txt").unwrap();
        let inode = mount.inode_get(ino).unwrap();
        let mut buf = [0u8; 64];
        let n = read(&mut mount, &inode, 0, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello, world");
    }

    #[test]
    fn a_read_never_crosses_a_block_boundary() {
        // B=128 here (see sample_image); a request bigger than one block
        // must come back capped at the block boundary, not spill into the
        // next block in the same call.
        let contents: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();
        let mut mount = Mount::open(sample_image(&contents)).unwrap();
        let root = mount.root_inode().unwrap();
        let ino = crate::dir::lookup(&mut mount, &root, b"a.txt").unwrap();
        let inode = mount.inode_get(ino).unwrap();

        let mut buf = vec![0u8; contents.len()];
        let n = read(&mut mount, &inode, 0, &mut buf).unwrap();
        assert_eq!(n, 128);
        assert_eq!(&buf[..n], &contents[..128]);

        let mut total = n;
        let mut chunk = vec![0u8; contents.len()];
        while total < contents.len() {
            let n = read(&mut mount, &inode, total as u64, &mut chunk).unwrap();
            assert!(n > 0 && n <= 128);
            buf[total..total + n].copy_from_slice(&chunk[..n]);
            total += n;
        }
        assert_eq!(buf, contents);
    }

    #[test]
    fn read_past_eof_returns_zero() {
        let mut mount = Mount::open(sample_image(b"short")).unwrap();
        let root = mount.root_inode().unwrap();
        let ino = crate::dir::lookup(&mut mount, &root, b"a.txt").unwrap();
        let inode = mount.inode_get(ino).unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(read(&mut mount, &inode, 1000, &mut buf).unwrap(), 0);
    }

    #[test]
    fn read_straddling_eof_is_short() {
        let mut mount = Mount::open(sample_image(b"0123456789")).unwrap();
        let root = mount.root_inode().unwrap();
        let ino = crate::dir::lookup(&mut mount, &root, b"a.txt").unwrap();
        let inode = mount.inode_get(ino).unwrap();
        let mut buf = [0u8; 16];
        let n = read(&mut mount, &inode, 5, &mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..n], b"56789");
    }

    #[test]
    fn read_on_directory_is_bad_mode() {
        let mut mount = Mount::open(sample_image(b"x")).unwrap();
        let root = mount.root_inode().unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            read(&mut mount, &root, 0, &mut buf),
            Err(AufsError::BadMode)
        ));
    }
}

//! Copies a host directory tree into a [`Entry`] tree for `mkfs.img`.

use aufs_core::format::Entry;
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

/// Recursively mirrors `src` into `parent`, which must be a directory entry.
pub fn copy_tree(parent: &mut Entry, src: &Path) -> io::Result<()> {
	let mut names: Vec<_> = fs::read_dir(src)?.collect::<io::Result<Vec<_>>>()?;
	names.sort_by_key(|e| e.file_name());

	for dirent in names {
		let meta = dirent.metadata()?;
		let name = dirent.file_name();
		let name = name.to_string_lossy();
		let uid = meta.uid();
		let gid = meta.gid();
		let mode = meta.mode() & 0o7777;
		let ctime = meta.ctime() as u64;

		if meta.is_dir() {
			let child = parent
				.mkdir(&name, uid, gid, mode, ctime)
				.expect("parent is a directory");
			copy_tree(child, &dirent.path())?;
		} else if meta.is_file() {
			let data = fs::read(dirent.path())?;
			parent
				.mkfile(&name, uid, gid, mode, ctime)
				.expect("parent is a directory")
				.write(&data)
				.expect("just-created entry is a file");
		}
		// symlinks, devices, etc. have no counterpart in a single-extent
		// filesystem and are skipped.
	}

	Ok(())
}

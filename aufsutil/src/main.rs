//! Inspects an AUFS image from the host: lists directories, prints file
//! contents, and dumps inode metadata, without mounting anything.

use aufs_core::block_io::{BlockDevice, FileBlockDevice};
use aufs_core::dir;
use aufs_core::file;
use aufs_core::layout::InodeRecord;
use aufs_core::mount::Mount;
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use utils::cli::{error, prog_name};
use utils::util::ByteSize;

struct Args {
	prog: String,
	image: PathBuf,
	command: String,
	path: String,
}

fn parse_args() -> Args {
	let prog = prog_name("aufsutil");
	let mut iter = env::args().skip(1);

	let image = iter
		.next()
		.unwrap_or_else(|| error(&prog, "usage: aufsutil <image> {ls|cat|stat} [path]"));
	let command = iter
		.next()
		.unwrap_or_else(|| error(&prog, "specify a command: ls, cat, or stat"));
	let path = iter.next().unwrap_or_else(|| "/".to_owned());

	Args {
		prog,
		image: PathBuf::from(image),
		command,
		path,
	}
}

/// Walks `path` component by component from the root, looking each one up
/// with [`dir::lookup`].
fn resolve<D: BlockDevice>(
	mount: &mut Mount<D>,
	path: &str,
) -> aufs_core::Result<InodeRecord> {
	let mut inode = mount.root_inode()?;
	for component in path.split('/').filter(|c| !c.is_empty()) {
		let ino = dir::lookup(mount, &inode, component.as_bytes())?;
		inode = mount.inode_get(ino)?;
	}
	Ok(inode)
}

fn mode_kind(mode: u32) -> &'static str {
	if mode & aufs_core::layout::S_IFMT == aufs_core::layout::S_IFDIR {
		"dir"
	} else if mode & aufs_core::layout::S_IFMT == aufs_core::layout::S_IFREG {
		"reg"
	} else {
		"unknown"
	}
}

fn run_ls<D: BlockDevice>(mount: &mut Mount<D>, path: &str) -> aufs_core::Result<()> {
	let inode = resolve(mount, path)?;
	if !inode.is_dir() {
		println!("{}", path.rsplit('/').next().unwrap_or(path));
		return Ok(());
	}
	let mut entries = dir::list(mount, &inode)?;
	entries.sort_by(|a, b| a.0.cmp(&b.0));
	for (name, _ino) in entries {
		println!("{}", String::from_utf8_lossy(&name));
	}
	Ok(())
}

fn run_cat<D: BlockDevice>(mount: &mut Mount<D>, path: &str) -> aufs_core::Result<()> {
	let inode = resolve(mount, path)?;
	let block_size = mount.superblock().block_size as usize;
	let mut offset = 0u64;
	let mut buf = vec![0u8; block_size];
	let stdout = io::stdout();
	let mut out = stdout.lock();
	loop {
		let n = file::read(mount, &inode, offset, &mut buf)?;
		if n == 0 {
			break;
		}
		out.write_all(&buf[..n]).expect("stdout write failed");
		offset += n as u64;
	}
	Ok(())
}

fn run_stat<D: BlockDevice>(mount: &mut Mount<D>, path: &str) -> aufs_core::Result<()> {
	let inode = resolve(mount, path)?;
	println!("type:   {}", mode_kind(inode.mode));
	println!("mode:   {:o}", inode.mode & 0o7777);
	println!("length: {} ({})", inode.length, ByteSize(inode.length as u64));
	println!("blocks: {}", inode.blocks);
	println!("block:  {}", inode.block);
	println!("uid:    {}", inode.uid);
	println!("gid:    {}", inode.gid);
	println!("ctime:  {}", inode.ctime);
	Ok(())
}

fn main() {
	let args = parse_args();

	let device = FileBlockDevice::open_read_only(&args.image, default_block_size(&args.image))
		.unwrap_or_else(|e| error(&args.prog, format!("{}: {}", args.image.display(), e)));
	let mut mount = Mount::open(device).unwrap_or_else(|e| error(&args.prog, format!("{}: {}", args.image.display(), e)));

	let result = match args.command.as_str() {
		"ls" => run_ls(&mut mount, &args.path),
		"cat" => run_cat(&mut mount, &args.path),
		"stat" => run_stat(&mut mount, &args.path),
		other => error(&args.prog, format!("unknown command `{other}` (expected ls, cat, or stat)")),
	};

	if let Err(e) = result {
		error(&args.prog, e);
	}
}

/// The superblock carries its own block size, but opening the device to
/// read it at all requires one first: every probe here starts at 512 bytes,
/// the smallest block size any AUFS image can legally use, and widens once
/// the real superblock is known to disagree.
fn default_block_size(path: &std::path::Path) -> u32 {
	const PROBE_SIZE: u32 = 512;
	if let Ok(dev) = FileBlockDevice::open_read_only(path, PROBE_SIZE) {
		let mut dev = dev;
		if let Ok(buf) = dev.read_block_vec(0) {
			if let Ok(sb) = aufs_core::layout::SuperBlock::from_bytes(&buf) {
				if sb.magic == aufs_core::layout::MAGIC && sb.block_size > 0 {
					return sb.block_size;
				}
			}
		}
	}
	PROBE_SIZE
}

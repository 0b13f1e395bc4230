//! Formats an AUFS filesystem.
//!
//! Built as two binaries sharing this file: `mkfs`, which formats an
//! existing block device or image file in place, and `mkfs.img`, which
//! creates a fresh image file, sized to hold either an empty root directory
//! or a copy of a host directory tree. Which one runs is decided the way
//! the filesystem-specific `mkfs.<type>` helpers decide it: by the suffix
//! on `argv[0]`, not by a flag.

mod walk;

use aufs_core::block_io::{BlockDevice, FileBlockDevice};
use aufs_core::format::{default_inodes_count, format, Entry};
use std::env;
use std::path::PathBuf;
use utils::cli::{error, prog_name, prog_suffix};
use utils::util::get_timestamp;

const DEFAULT_BLOCK_BITS: u32 = 12; // 4096-byte blocks
const DEFAULT_BLOCKS_COUNT: u32 = 2048; // 8 MiB default image

/// Command-line arguments common to both binaries.
#[derive(Default)]
struct Args {
	prog: String,
	help: bool,
	block_bits: Option<u32>,
	blocks_count: Option<u32>,
	path: Option<PathBuf>,
	source_directory: Option<PathBuf>,
}

fn parse_args() -> Args {
	let mut args = Args {
		prog: prog_name("mkfs"),
		..Default::default()
	};
	let mut iter = env::args().skip(1);

	while let Some(arg) = iter.next() {
		match arg.as_str() {
			"-h" | "--help" => args.help = true,

			"--block_bits" | "-bb" => {
				let v = iter.next().unwrap_or_else(|| error(&args.prog, "--block_bits requires a value"));
				args.block_bits = Some(v.parse().unwrap_or_else(|_| error(&args.prog, "invalid --block_bits value")));
			}

			"--blocks_count" | "--bc" => {
				let v = iter.next().unwrap_or_else(|| error(&args.prog, "--blocks_count requires a value"));
				args.blocks_count = Some(v.parse().unwrap_or_else(|_| error(&args.prog, "invalid --blocks_count value")));
			}

			_ if args.path.is_none() => args.path = Some(PathBuf::from(arg)),
			_ if args.source_directory.is_none() => args.source_directory = Some(PathBuf::from(arg)),

			_ => error(&args.prog, format!("unexpected argument `{arg}`")),
		}
	}

	args
}

fn main() {
	let args = parse_args();
	if args.help {
		println!("usage: {} <device> [--block_bits N | -bb N] [--blocks_count N | --bc N]", args.prog);
		println!("       {}.img <image> [<source_directory>] [--block_bits N] [--blocks_count N]", args.prog);
		return;
	}

	let is_image_mode = prog_suffix(&args.prog) == Some("img");

	let path = args.path.clone().unwrap_or_else(|| error(&args.prog, "specify a device or image path"));
	let block_bits = args.block_bits.unwrap_or(DEFAULT_BLOCK_BITS);
	let block_size: u32 = 1u32 << block_bits;
	let blocks_count = args.blocks_count.unwrap_or(DEFAULT_BLOCKS_COUNT) as u64;

	let mut device = if is_image_mode {
		FileBlockDevice::create(&path, block_size, block_size as u64 * blocks_count)
			.unwrap_or_else(|e| error(&args.prog, format!("{}: {}", path.display(), e)))
	} else {
		if args.source_directory.is_some() {
			error(&args.prog, "a source directory is only valid with mkfs.img");
		}
		match args.blocks_count {
			Some(_) => FileBlockDevice::open_sized(&path, block_size, blocks_count),
			None => FileBlockDevice::open(&path, block_size),
		}
		.unwrap_or_else(|e| error(&args.prog, format!("{}: {}", path.display(), e)))
	};

	let ctime = get_timestamp().as_secs();
	let mut root = Entry::root(0, 0, 0o755, ctime);

	if let Some(src) = &args.source_directory {
		walk::copy_tree(&mut root, src)
			.unwrap_or_else(|e| error(&args.prog, format!("{}: {}", src.display(), e)));
	}

	let inodes_count = default_inodes_count(device.blocks_count(), device.block_size());

	format(&mut device, root, inodes_count)
		.unwrap_or_else(|e| error(&args.prog, format!("failed to format {}: {}", path.display(), e)));
}

//! Small helpers shared by the command-line front ends: printing an
//! `argv[0]`-prefixed error and exiting, and recovering a dotted suffix from
//! the program name the way `mkfs`/`mkfs.img` dispatch on it.

use std::env;
use std::process::exit;

/// Prints `<prog>: <msg>` to stderr and exits with status 1.
///
/// Every command-line front end funnels its fallible setup through this so
/// error output stays consistent between `mkfs`, `mkfs.img` and `aufsutil`.
pub fn error(prog: &str, msg: impl std::fmt::Display) -> ! {
	eprintln!("{}: {}", prog, msg);
	exit(1);
}

/// Returns the program name argv[0] was invoked as, falling back to
/// `default` if unavailable.
pub fn prog_name(default: &str) -> String {
	env::args().next().unwrap_or_else(|| default.to_owned())
}

/// If `prog` contains a `.`, returns the text after the last one — the way
/// `mkfs.img` is told apart from plain `mkfs` by the suffix on its own
/// binary name rather than by a command-line flag.
pub fn prog_suffix(prog: &str) -> Option<&str> {
	if prog.contains('.') {
		prog.rsplit('.').next()
	} else {
		None
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn suffix_of_plain_name_is_none() {
		assert_eq!(prog_suffix("mkfs"), None);
	}

	#[test]
	fn suffix_of_dotted_name_is_last_component() {
		assert_eq!(prog_suffix("mkfs.img"), Some("img"));
		assert_eq!(prog_suffix("/usr/sbin/mkfs.img"), Some("img"));
	}
}

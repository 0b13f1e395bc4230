//! This module implements features common to the `mkfs-aufs` and `aufsutil`
//! commands.

pub mod cli;
pub mod prompt;
pub mod util;

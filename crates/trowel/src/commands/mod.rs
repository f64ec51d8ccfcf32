//! CLI subcommands.

pub mod build;
pub mod init;
pub mod start;
pub mod watch;

//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod download;
pub mod init;
pub mod ls;
pub mod watch;

//! CLI command handlers
//!
//! Each subcommand is implemented in its own module.

pub mod boxes;
pub mod cardset;
pub mod helpers;
pub mod init;
pub mod list;
pub mod stats;
pub mod study;
pub mod worker;

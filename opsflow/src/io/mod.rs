//! I/O helpers for pipeline runs: files, child processes and the oracle.

pub mod artifacts;
pub mod catalog;
pub mod config;
pub mod oracle;
pub mod process;
pub mod prompt;

//! I/O adapters for the build steps.

pub mod command;
pub mod config;
pub mod logs;
pub mod process;
pub mod properties;
pub mod transfer;
pub mod worker;

//! Deterministic, pure logic shared by the build steps.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod cache;
pub mod invocation;
pub mod render;
pub mod results;
pub mod retention;
pub mod types;
